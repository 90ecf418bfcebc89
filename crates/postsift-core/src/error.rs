//! Error types for postsift

/// Result type alias using postsift's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for postsift operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The event source terminated abnormally
    #[error("source error: {0}")]
    Source(String),

    /// A classifier output line did not match `<label> <confidence>`
    #[error("protocol parse error: {reason} (line: {line:?})")]
    Parse {
        /// The offending output line
        line: String,
        /// Why it was rejected
        reason: String,
    },

    /// The classifier subprocess went away with requests in flight
    #[error("classifier process exited: {0}")]
    SubprocessExit(String),

    /// The scoring channel was closed before the request completed
    #[error("scoring channel closed")]
    Closed,

    /// Bounded collection ended before reaching its target
    #[error("collection incomplete: {collected}/{target} events before failure: {cause}")]
    CollectionIncomplete {
        collected: usize,
        target: usize,
        cause: Box<Error>,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP errors while fetching feeds
    #[error("http error: {0}")]
    Http(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new source error
    pub fn source_error(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a new protocol parse error
    pub fn parse(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Create a new subprocess exit error
    pub fn subprocess_exit(msg: impl Into<String>) -> Self {
        Self::SubprocessExit(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this error came from the event source
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Whether this error only affects a single classification request
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}
