//! postsift classifiers
//!
//! Async classification over external line-protocol classifier processes
//! such as `fasttext predict-prob <model> - 1`.
//!
//! - [`Classifier`] is the seam the stream pipeline depends on
//! - [`ScoringChannel`] turns one persistent subprocess into a typed,
//!   concurrency-safe `classify` call with strict FIFO correlation
//! - [`protocol`] parses the `<label> <confidence>` response lines

pub mod channel;
pub mod classifier;
pub mod config;
pub mod protocol;

pub use channel::ScoringChannel;
pub use classifier::{ClassificationResult, Classifier};
pub use config::ClassifierCommand;
pub use protocol::parse_prediction;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::channel::ScoringChannel;
    pub use crate::classifier::{ClassificationResult, Classifier};
    pub use crate::config::ClassifierCommand;
}
