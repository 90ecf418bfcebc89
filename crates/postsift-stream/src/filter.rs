//! Acceptance filter applied to every delivered event
//!
//! Combines shape checks (non-empty text, reply skipping, excluded
//! substrings) with de-duplication of recently seen content identifiers,
//! which Jetstream can redeliver around reconnects.

use postsift_core::Event;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Reject events whose text is empty or whitespace
    #[serde(default = "default_true")]
    pub require_text: bool,

    /// Reject replies
    #[serde(default)]
    pub skip_replies: bool,

    /// Reject events whose raw text contains any of these substrings
    #[serde(default = "default_exclude")]
    pub exclude_substrings: Vec<String>,

    /// Number of recent content identifiers remembered for de-duplication
    /// (0 disables)
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

impl FilterConfig {
    /// A configuration that accepts every event
    pub fn accept_all() -> Self {
        Self {
            require_text: false,
            skip_replies: false,
            exclude_substrings: Vec::new(),
            dedup_window: 0,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            require_text: true,
            skip_replies: false,
            exclude_substrings: default_exclude(),
            dedup_window: default_dedup_window(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_exclude() -> Vec<String> {
    vec!["github.com".to_string()]
}

fn default_dedup_window() -> usize {
    10_000
}

/// Outcome of filtering one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    EmptyText,
    Reply,
    Excluded,
    Duplicate,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }

    /// Stable name for metrics labels
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::EmptyText => "empty_text",
            Self::Reply => "reply",
            Self::Excluded => "excluded",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Stateful event filter
#[derive(Debug)]
pub struct EventFilter {
    config: FilterConfig,
    recent: RecentIds,
}

impl EventFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            recent: RecentIds::new(config.dedup_window),
            config,
        }
    }

    pub fn accept_all() -> Self {
        Self::new(FilterConfig::accept_all())
    }

    /// Classify an event against the filter, recording it for de-duplication
    /// when accepted
    pub fn check(&mut self, event: &Event) -> Verdict {
        if self.config.require_text && event.text.trim().is_empty() {
            return Verdict::EmptyText;
        }
        if self.config.skip_replies && event.is_reply {
            return Verdict::Reply;
        }
        if self
            .config
            .exclude_substrings
            .iter()
            .any(|needle| event.text.contains(needle.as_str()))
        {
            return Verdict::Excluded;
        }
        if !event.cid.is_empty() && !self.recent.insert(&event.cid) {
            return Verdict::Duplicate;
        }
        Verdict::Accepted
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

/// Bounded set of recently seen identifiers, evicting oldest first
#[derive(Debug)]
struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            seen: HashSet::with_capacity(capacity.min(1024)),
        }
    }

    /// Returns false if the id was already present
    fn insert(&mut self, id: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }
}
