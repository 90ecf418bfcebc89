//! Classifier trait and common types

use async_trait::async_trait;
use postsift_core::Result;

/// Trait for all classifiers
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the given text
    async fn classify(&self, text: &str) -> Result<ClassificationResult>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Release any resources held by the classifier
    ///
    /// Requests still in flight fail once this returns.
    async fn close(&self) {}
}

/// Result of classification: the top label and its confidence
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Classification label, e.g. `__label__programming`
    pub label: String,

    /// Confidence score (0.0-1.0)
    pub confidence: f32,
}

impl ClassificationResult {
    /// Create a new classification result
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Check if this result is the given label with confidence strictly above `threshold`
    pub fn matches(&self, label: &str, threshold: f32) -> bool {
        self.label == label && self.confidence > threshold
    }
}
