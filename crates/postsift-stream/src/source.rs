//! Event source abstraction
//!
//! The pipeline only needs something that yields events in order, can fail
//! terminally, and can be told to stop. Reconnecting is the caller's job:
//! a source that returned an error is finished, and a fresh one is obtained
//! from its [`SourceConnector`].

use async_trait::async_trait;
use postsift_core::{Error, Event, Result};
use tokio::sync::mpsc;

/// A stream of firehose events
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event
    ///
    /// Returns `Ok(None)` when the source ended cleanly and `Err(Error::Source)`
    /// when it terminated abnormally. Neither yields further events.
    async fn next_event(&mut self) -> Result<Option<Event>>;

    /// Stop consuming and release the underlying connection
    async fn close(&mut self);
}

/// Opens fresh event sources, once per (re)connection
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Open a new source
    async fn connect(&self) -> Result<Box<dyn EventSource>>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Source fed by an in-process channel
///
/// Lets another task (for example a websocket client) push events or a
/// terminal error into the pipeline. Dropping every sender ends the source.
pub struct ChannelSource {
    receiver: mpsc::Receiver<Result<Event>>,
    finished: bool,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn new(capacity: usize) -> (mpsc::Sender<Result<Event>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                receiver: rx,
                finished: false,
            },
        )
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<Event>> {
        if self.finished {
            return Ok(None);
        }
        match self.receiver.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(e)) => {
                self.finished = true;
                self.receiver.close();
                Err(match e {
                    Error::Source(_) => e,
                    other => Error::source_error(other.to_string()),
                })
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        self.finished = true;
        self.receiver.close();
    }
}
