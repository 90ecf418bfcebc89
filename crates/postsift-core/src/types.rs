//! Core types for postsift

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A single post creation event from the firehose
///
/// Field names follow the camelCase shape used by the dataset feeds, so the
/// same type round-trips through `train.json` and the feed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Author identifier (DID)
    pub author: String,

    /// Raw post text
    pub text: String,

    /// Creation timestamp as provided by the source
    pub created_at: String,

    /// Stable resource identifier (`at://` URI)
    pub uri: String,

    /// Content identifier, unique per record version
    pub cid: String,

    /// Whether the post is a reply
    #[serde(default)]
    pub is_reply: bool,
}

impl Event {
    /// Create an event with the given author and text
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            created_at: String::new(),
            uri: String::new(),
            cid: String::new(),
            is_reply: false,
        }
    }

    /// Set the content identifier
    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = cid.into();
        self
    }

    /// Set the creation timestamp
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }

    /// Mark the event as a reply
    pub fn reply(mut self) -> Self {
        self.is_reply = true;
        self
    }

    /// Build the `at://` URI for a post record
    pub fn post_uri(did: &str, rkey: &str) -> String {
        format!("at://{}/app.bsky.feed.post/{}", did, rkey)
    }
}

/// A labeled dataset entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub post: Event,
    pub label: String,
}

impl Sample {
    pub fn new(post: Event, label: impl Into<String>) -> Self {
        Self {
            post,
            label: label.into(),
        }
    }
}

/// Record emitted for each event that matched the target label
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub created_at: String,
    pub author: String,
    pub text: String,

    /// Wall-clock time from normalization to classification result
    #[serde(serialize_with = "two_places")]
    pub latency_ms: f64,

    #[serde(serialize_with = "three_places")]
    pub confidence: f32,
}

impl Report {
    pub fn new(event: &Event, latency_ms: f64, confidence: f32) -> Self {
        Self {
            created_at: event.created_at.clone(),
            author: event.author.clone(),
            text: event.text.clone(),
            latency_ms,
            confidence,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({:.2}ms, {:.3}): {}",
            self.created_at, self.author, self.latency_ms, self.confidence, self.text
        )
    }
}

fn two_places<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.2}", value))
}

fn three_places<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.3}", value))
}
