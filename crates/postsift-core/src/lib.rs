//! postsift core
//!
//! Types and utilities shared across postsift components:
//! - The firehose event model and labeled dataset samples
//! - Report records emitted by the live pipeline
//! - Error types and result handling
//! - Text normalization applied before classification

pub mod error;
pub mod normalize;
pub mod types;

pub use error::{Error, Result};
pub use normalize::normalize;
pub use types::{Event, Report, Sample};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::normalize::normalize;
    pub use crate::types::{Event, Report, Sample};
}
