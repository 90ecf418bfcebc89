//! Destinations for report records

use async_trait::async_trait;
use postsift_core::{Error, Report, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::info;

/// Receives one record per qualifying event
#[async_trait]
pub trait ReportSink: Send {
    async fn emit(&mut self, report: &Report) -> Result<()>;
}

/// Writes each report as one JSON object per line
///
/// Every line is flushed before `emit` returns, so a consumer tailing the
/// output sees reports as they happen.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ReportSink for JsonLinesSink<W> {
    async fn emit(&mut self, report: &Report) -> Result<()> {
        let mut line = serde_json::to_vec(report)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Emits reports through `tracing`
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn emit(&mut self, report: &Report) -> Result<()> {
        info!(
            created = %report.created_at,
            author = %report.author,
            latency_ms = %format!("{:.2}", report.latency_ms),
            confidence = %format!("{:.3}", report.confidence),
            "{}",
            report.text
        );
        Ok(())
    }
}

#[async_trait]
impl ReportSink for mpsc::UnboundedSender<Report> {
    async fn emit(&mut self, report: &Report) -> Result<()> {
        self.send(report.clone()).map_err(|_| Error::Closed)
    }
}
