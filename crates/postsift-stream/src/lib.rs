//! postsift stream
//!
//! Consumes the Bluesky firehose and drives events through classification:
//!
//! - [`source`]: the event source seam and a channel-fed source
//! - [`jetstream`]: Jetstream message parsing, line/relay/replay sources
//! - [`filter`]: acceptance predicate with content-id de-duplication
//! - [`collector`]: live classify-and-report mode and bounded collection
//! - [`sink`]: report destinations
//! - [`driver`]: lifecycle ownership and reconnect-with-backoff

pub mod collector;
pub mod driver;
pub mod filter;
pub mod jetstream;
pub mod sink;
pub mod source;

pub use collector::{CollectorState, CollectorStats, ReportConfig, StreamCollector};
pub use driver::{BackoffConfig, PipelineDriver};
pub use filter::{EventFilter, FilterConfig, Verdict};
pub use jetstream::{
    parse_message, CommandConnector, CommandSource, FileConnector, LineSource, RelayCommand,
};
pub use sink::{JsonLinesSink, LogSink, ReportSink};
pub use source::{ChannelSource, EventSource, SourceConnector};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::collector::{ReportConfig, StreamCollector};
    pub use crate::driver::{BackoffConfig, PipelineDriver};
    pub use crate::filter::{EventFilter, FilterConfig};
    pub use crate::sink::ReportSink;
    pub use crate::source::{EventSource, SourceConnector};
}
