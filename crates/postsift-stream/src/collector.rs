//! Stream collector: live classification and bounded dataset collection
//!
//! Events are examined strictly in delivery order. In live mode each
//! accepted event makes one full classifier round trip before the next event
//! is read, which matches the single-outstanding-request discipline of the
//! scoring channel.

use crate::filter::EventFilter;
use crate::sink::ReportSink;
use crate::source::EventSource;
use postsift_classifiers::Classifier;
use postsift_core::{normalize, Error, Report, Result, Sample};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Log collection progress every this many samples
const PROGRESS_INTERVAL: usize = 100;

/// Which predictions are reported in live mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Label that qualifies an event, e.g. `__label__programming`
    #[serde(default = "default_target_label")]
    pub target_label: String,

    /// Confidence must be strictly above this
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            target_label: default_target_label(),
            threshold: default_threshold(),
        }
    }
}

fn default_target_label() -> String {
    "__label__programming".to_string()
}

fn default_threshold() -> f32 {
    0.5
}

/// What the collector is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    AwaitingEvent,
    AwaitingClassification,
    Sealed,
}

/// Running totals across all sources a collector has consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub received: u64,
    pub accepted: u64,
    pub classified: u64,
    pub reported: u64,
}

pub struct StreamCollector {
    filter: EventFilter,
    report: ReportConfig,
    state: CollectorState,
    stats: CollectorStats,
}

impl StreamCollector {
    pub fn new(filter: EventFilter, report: ReportConfig) -> Self {
        Self {
            filter,
            report,
            state: CollectorState::AwaitingEvent,
            stats: CollectorStats::default(),
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    pub fn report_config(&self) -> &ReportConfig {
        &self.report
    }

    /// Classify accepted events until the source ends or fails
    ///
    /// Returns `Ok(())` when the source ends cleanly. Source errors and
    /// classifier failures other than a malformed response are returned to
    /// the caller; the source is left for the caller to close.
    pub async fn run_live(
        &mut self,
        source: &mut dyn EventSource,
        classifier: &dyn Classifier,
        sink: &mut dyn ReportSink,
    ) -> Result<()> {
        loop {
            self.state = CollectorState::AwaitingEvent;
            let Some(event) = source.next_event().await? else {
                info!(stats = ?self.stats, "Event source ended");
                return Ok(());
            };
            self.stats.received += 1;

            let verdict = self.filter.check(&event);
            metrics::counter!("postsift_events_total", "outcome" => verdict.as_str()).increment(1);
            if !verdict.is_accepted() {
                continue;
            }
            self.stats.accepted += 1;

            let start = Instant::now();
            let text = normalize(&event.text);
            if text.is_empty() {
                debug!(uri = %event.uri, "Nothing left to classify after normalization");
                continue;
            }

            self.state = CollectorState::AwaitingClassification;
            let prediction = match classifier.classify(&text).await {
                Ok(prediction) => prediction,
                Err(e) if e.is_parse() => {
                    warn!(uri = %event.uri, error = %e, "Skipping event after malformed prediction");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let elapsed = start.elapsed();
            self.stats.classified += 1;
            metrics::histogram!("postsift_classify_latency_us").record(elapsed.as_micros() as f64);

            if prediction.matches(&self.report.target_label, self.report.threshold) {
                let report = Report::new(
                    &event,
                    elapsed.as_secs_f64() * 1000.0,
                    prediction.confidence,
                );
                sink.emit(&report).await?;
                self.stats.reported += 1;
                metrics::counter!("postsift_reports_total").increment(1);
            }
        }
    }

    /// Gather exactly `target` accepted events, labeled with `label`
    ///
    /// The source is closed as soon as the target is reached. If it fails or
    /// ends first, the partial buffer is discarded and
    /// `Error::CollectionIncomplete` is returned.
    pub async fn collect(
        &mut self,
        source: &mut dyn EventSource,
        target: usize,
        label: &str,
    ) -> Result<Vec<Sample>> {
        let mut buffer = Vec::with_capacity(target);

        while buffer.len() < target {
            self.state = CollectorState::AwaitingEvent;
            let event = match source.next_event().await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    source.close().await;
                    return Err(incomplete(
                        buffer.len(),
                        target,
                        Error::source_error("source ended"),
                    ));
                }
                Err(e) => {
                    warn!(collected = buffer.len(), target, error = %e, "Collection interrupted");
                    source.close().await;
                    return Err(incomplete(buffer.len(), target, e));
                }
            };
            self.stats.received += 1;

            let verdict = self.filter.check(&event);
            metrics::counter!("postsift_events_total", "outcome" => verdict.as_str()).increment(1);
            if !verdict.is_accepted() {
                continue;
            }
            self.stats.accepted += 1;

            buffer.push(Sample::new(event, label));
            if buffer.len() % PROGRESS_INTERVAL == 0 {
                info!("{}/{}", buffer.len(), target);
            }
        }

        source.close().await;
        self.state = CollectorState::Sealed;
        info!(collected = buffer.len(), label, "Collection complete");
        Ok(buffer)
    }
}

fn incomplete(collected: usize, target: usize, cause: Error) -> Error {
    Error::CollectionIncomplete {
        collected,
        target,
        cause: Box::new(cause),
    }
}
