//! Jetstream firehose adapter
//!
//! Parses Bluesky Jetstream JSON messages, one per line:
//! ```text
//! {"did":"did:plc:abc","time_us":1732100000000000,"kind":"commit","commit":{"rev":"3lb","operation":"create","collection":"app.bsky.feed.post","rkey":"3lbxyz","record":{"$type":"app.bsky.feed.post","createdAt":"2024-11-20T10:00:00.000Z","text":"hello"},"cid":"bafyrei..."}}
//! ```
//!
//! Only post creations become [`Event`]s; identity/account messages, deletes,
//! updates and other collections are skipped.

use crate::source::{EventSource, SourceConnector};
use async_trait::async_trait;
use futures::StreamExt;
use postsift_core::{Error, Event, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

/// Collection name of Bluesky posts
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Public Jetstream endpoint subscribed to posts only
pub const DEFAULT_JETSTREAM_URL: &str =
    "wss://jetstream2.us-east.bsky.network/subscribe?wantedCollections=app.bsky.feed.post";

const MAX_MESSAGE_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct JetstreamMessage {
    did: String,
    kind: String,
    commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
struct Commit {
    operation: String,
    collection: String,
    rkey: String,
    cid: Option<String>,
    record: Option<PostRecord>,
}

#[derive(Debug, Deserialize)]
struct PostRecord {
    #[serde(default)]
    text: String,
    #[serde(rename = "createdAt", default)]
    created_at: String,
    reply: Option<serde_json::Value>,
}

/// Parse one Jetstream message
///
/// Returns `Ok(None)` for well-formed messages that are not post creations.
pub fn parse_message(line: &str) -> Result<Option<Event>> {
    let message: JetstreamMessage = serde_json::from_str(line)?;

    if message.kind != "commit" {
        return Ok(None);
    }
    let Some(commit) = message.commit else {
        return Ok(None);
    };
    if commit.operation != "create" || commit.collection != POST_COLLECTION {
        return Ok(None);
    }
    let Some(record) = commit.record else {
        return Ok(None);
    };

    Ok(Some(Event {
        uri: Event::post_uri(&message.did, &commit.rkey),
        author: message.did,
        text: record.text,
        created_at: record.created_at,
        cid: commit.cid.unwrap_or_default(),
        is_reply: record.reply.is_some(),
    }))
}

/// Source reading newline-delimited Jetstream messages from any reader
///
/// End of input is a clean end. Malformed messages are logged and skipped.
pub struct LineSource<R> {
    lines: FramedRead<R, LinesCodec>,
    closed: bool,
}

impl<R> LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_LENGTH)),
            closed: false,
        }
    }

    /// Next post event, or `None` at end of input
    async fn next_post(&mut self) -> Result<Option<Event>> {
        if self.closed {
            return Ok(None);
        }
        while let Some(line) = self.lines.next().await {
            let line = line.map_err(|e| Error::source_error(format!("read failed: {}", e)))?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_message(&line) {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Skipping malformed Jetstream message"),
            }
        }
        self.closed = true;
        Ok(None)
    }
}

#[async_trait]
impl<R> EventSource for LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<Option<Event>> {
        self.next_post().await
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// External command that relays the firehose to its stdout, one message per line
///
/// For example `websocat <jetstream url>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCommand {
    #[serde(default = "default_relay_program")]
    pub program: String,

    #[serde(default = "default_relay_args")]
    pub args: Vec<String>,
}

impl RelayCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Printable form for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for RelayCommand {
    fn default() -> Self {
        Self {
            program: default_relay_program(),
            args: default_relay_args(),
        }
    }
}

fn default_relay_program() -> String {
    "websocat".to_string()
}

fn default_relay_args() -> Vec<String> {
    vec![DEFAULT_JETSTREAM_URL.to_string()]
}

/// Source backed by a relay subprocess
///
/// The firehose never ends on its own, so relay EOF is a source error.
pub struct CommandSource {
    child: Option<Child>,
    lines: LineSource<ChildStdout>,
}

impl CommandSource {
    pub fn spawn(command: &RelayCommand) -> Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::source_error("relay stdout unavailable"))?;

        Ok(Self {
            child: Some(child),
            lines: LineSource::new(stdout),
        })
    }
}

#[async_trait]
impl EventSource for CommandSource {
    async fn next_event(&mut self) -> Result<Option<Event>> {
        match self.lines.next_post().await? {
            Some(event) => Ok(Some(event)),
            None => {
                let status = match self.child.as_mut() {
                    Some(child) => child.wait().await.map(|s| s.to_string()),
                    None => return Ok(None),
                };
                self.child = None;
                Err(Error::source_error(match status {
                    Ok(status) => format!("relay exited ({})", status),
                    Err(e) => format!("relay exited: {}", e),
                }))
            }
        }
    }

    async fn close(&mut self) {
        self.lines.close().await;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Relay already stopped");
            }
        }
    }
}

/// Connects by spawning a fresh relay process
pub struct CommandConnector {
    command: RelayCommand,
}

impl CommandConnector {
    pub fn new(command: RelayCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl SourceConnector for CommandConnector {
    async fn connect(&self) -> Result<Box<dyn EventSource>> {
        info!(relay = %self.command.display(), "Connecting to firehose");
        Ok(Box::new(CommandSource::spawn(&self.command)?))
    }

    fn describe(&self) -> String {
        self.command.display()
    }
}

/// Replays a recorded Jetstream capture from disk
pub struct FileConnector {
    path: PathBuf,
}

impl FileConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SourceConnector for FileConnector {
    async fn connect(&self) -> Result<Box<dyn EventSource>> {
        info!(path = %self.path.display(), "Replaying firehose capture");
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(LineSource::new(file)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
