//! Pipeline driver: owns source and classifier lifecycles
//!
//! Live mode reconnects the event source with exponential backoff after
//! source errors. The classifier is closed on every exit path, so the
//! subprocess never outlives the pipeline.

use crate::collector::StreamCollector;
use crate::sink::ReportSink;
use crate::source::SourceConnector;
use postsift_classifiers::Classifier;
use postsift_core::{Error, Result, Sample};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Reconnect policy for live mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first reconnect
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor per consecutive failure
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Consecutive failed connections tolerated before giving up (0 = never reconnect)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl BackoffConfig {
    /// Never reconnect
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before reconnect attempt `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    5
}

pub struct PipelineDriver {
    connector: Arc<dyn SourceConnector>,
    collector: StreamCollector,
    backoff: BackoffConfig,
    reconnects: u64,
}

impl PipelineDriver {
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        collector: StreamCollector,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            connector,
            collector,
            backoff,
            reconnects: 0,
        }
    }

    pub fn collector(&self) -> &StreamCollector {
        &self.collector
    }

    /// Number of reconnects performed so far
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Run accept → classify → report until the source ends, reconnects are
    /// exhausted, or a non-source error occurs. Closes `classifier` before
    /// returning.
    pub async fn run_live(
        &mut self,
        classifier: Arc<dyn Classifier>,
        sink: &mut dyn ReportSink,
    ) -> Result<()> {
        let result = self.live_loop(classifier.as_ref(), sink).await;
        if let Err(e) = &result {
            error!(source = %self.connector.describe(), error = %e, "Pipeline stopped");
        }
        classifier.close().await;
        result
    }

    async fn live_loop(
        &mut self,
        classifier: &dyn Classifier,
        sink: &mut dyn ReportSink,
    ) -> Result<()> {
        let mut attempt = 0u32;

        loop {
            let mut source = match self.connector.connect().await {
                Ok(source) => source,
                Err(e) if e.is_source() => {
                    attempt += 1;
                    self.wait_before_retry(attempt, e).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let received_before = self.collector.stats().received;
            let result = self.collector.run_live(source.as_mut(), classifier, sink).await;
            source.close().await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_source() => {
                    if self.collector.stats().received > received_before {
                        attempt = 0;
                    }
                    attempt += 1;
                    self.wait_before_retry(attempt, e).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleep before the next connection, or hand back the error once the
    /// reconnect budget is spent
    async fn wait_before_retry(&mut self, attempt: u32, cause: Error) -> Result<()> {
        if attempt > self.backoff.max_attempts {
            error!(attempts = attempt - 1, error = %cause, "Giving up on firehose");
            return Err(cause);
        }

        let delay = self.backoff.delay_for_attempt(attempt);
        warn!(
            attempt,
            max_attempts = self.backoff.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %cause,
            "Firehose interrupted, reconnecting"
        );
        metrics::counter!("postsift_source_reconnects_total").increment(1);
        self.reconnects += 1;

        tokio::time::sleep(delay).await;
        Ok(())
    }

    /// Connect once and collect `target` accepted events labeled `label`
    ///
    /// No reconnects: a source failure fails the whole collection.
    pub async fn collect(&mut self, target: usize, label: &str) -> Result<Vec<Sample>> {
        info!(source = %self.connector.describe(), target, label, "Collecting events");
        let mut source = self.connector.connect().await?;
        self.collector.collect(source.as_mut(), target, label).await
    }
}
