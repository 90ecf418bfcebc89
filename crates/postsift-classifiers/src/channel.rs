//! Scoring channel backed by one long-lived classifier process
//!
//! The process reads one line of text and answers with one prediction line,
//! with no request identifiers. A single actor task owns the process I/O and
//! the FIFO of pending requests; callers only talk to it over a channel.
//!
//! ```text
//! classify() --mpsc--> actor --stdin--> classifier
//!     ^                  |  <--stdout--     |
//!     +----oneshot-------+   (FIFO match)
//! ```
//!
//! Only the head of the queue is ever written to the process. The next text
//! goes out after the head's response line has been consumed, so the N-th
//! output line always answers the N-th submitted request. A line that cannot
//! be decoded still consumes its slot and fails only that request.
//!
//! While a request is being written the actor keeps accepting commands, so a
//! `close()` is never stuck behind a process that stopped reading its stdin.

use crate::protocol::{request_line, Frame, ResponseCodec};
use crate::{ClassificationResult, Classifier, ClassifierCommand};
use async_trait::async_trait;
use futures::StreamExt;
use postsift_core::{Error, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

/// Longest response line accepted from the classifier
const MAX_LINE_LENGTH: usize = 64 * 1024;

type Reply = oneshot::Sender<Result<ClassificationResult>>;

enum Op {
    Classify { text: String, reply: Reply },
    Close { done: oneshot::Sender<()> },
}

/// Whether the actor keeps running after handling an input
enum Flow {
    Continue,
    Stop(Option<oneshot::Sender<()>>),
}

/// Async, concurrency-safe scoring API over a line-protocol classifier
pub struct ScoringChannel {
    name: String,
    commands: mpsc::UnboundedSender<Op>,
}

impl ScoringChannel {
    /// Spawn the classifier process and start the channel
    pub fn spawn(command: &ClassifierCommand) -> Result<Self> {
        info!(command = %command.display(), "Starting classifier process");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(program = %command.program, error = %e, "Failed to spawn classifier");
                Error::Io(e)
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::subprocess_exit("classifier stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::subprocess_exit("classifier stdout unavailable"))?;

        if let Some(stderr) = child.stderr.take() {
            let program = command.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(program = %program, "classifier stderr: {}", line);
                }
            });
        }

        Ok(Self::start(command.program.clone(), stdin, stdout, Some(child)))
    }

    /// Run the channel over arbitrary I/O instead of a spawned process
    ///
    /// `writer` receives request lines, `reader` yields response lines.
    /// Must be called from within a tokio runtime.
    pub fn from_io<W, R>(name: impl Into<String>, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::start(name.into(), writer, reader, None)
    }

    fn start<W, R>(name: String, writer: W, reader: R, child: Option<Child>) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = Actor {
            name: name.clone(),
            writer,
            lines: FramedRead::new(reader, ResponseCodec::new(MAX_LINE_LENGTH)),
            pending: VecDeque::new(),
            child,
            commands: rx,
            exited: None,
        };
        tokio::spawn(actor.run());

        Self { name, commands: tx }
    }

    /// Submit text and wait for its prediction
    ///
    /// Never fails to enqueue while the channel is open. Fails with
    /// `Error::Parse` if the matching response line is malformed,
    /// `Error::SubprocessExit` if the process dies first, and `Error::Closed`
    /// after `close()`.
    pub async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Op::Classify {
                text: text.to_string(),
                reply,
            })
            .map_err(|_| Error::Closed)?;

        rx.await.map_err(|_| Error::Closed)?
    }

    /// Terminate the process immediately
    ///
    /// Pending requests fail with `Error::Closed`; nothing is drained.
    pub async fn close(&self) {
        let (done, rx) = oneshot::channel();
        if self.commands.send(Op::Close { done }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Whether the actor has shut down
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

#[async_trait]
impl Classifier for ScoringChannel {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        ScoringChannel::classify(self, text).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn close(&self) {
        ScoringChannel::close(self).await
    }
}

struct Pending {
    text: String,
    reply: Reply,
}

struct Actor<W, R> {
    name: String,
    writer: W,
    lines: FramedRead<R, ResponseCodec>,
    pending: VecDeque<Pending>,
    child: Option<Child>,
    commands: mpsc::UnboundedReceiver<Op>,
    /// Set once the process is gone; later requests fail with this reason
    exited: Option<String>,
}

impl<W, R> Actor<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn run(mut self) {
        loop {
            let flow = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Op::Classify { text, reply }) => self.submit(text, reply).await,
                    Some(Op::Close { done }) => Flow::Stop(Some(done)),
                    None => Flow::Stop(None),
                },
                frame = self.lines.next(), if self.exited.is_none() => match frame {
                    Some(Ok(frame)) => self.on_frame(frame).await,
                    Some(Err(e)) => {
                        self.on_exit(format!("read failed: {}", e));
                        Flow::Continue
                    }
                    None => {
                        self.on_exit("stdout closed".to_string());
                        Flow::Continue
                    }
                },
            };

            if let Flow::Stop(done) = flow {
                self.shutdown().await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
                return;
            }
        }
    }

    async fn submit(&mut self, text: String, reply: Reply) -> Flow {
        if let Some(reason) = &self.exited {
            let _ = reply.send(Err(Error::subprocess_exit(reason.clone())));
            return Flow::Continue;
        }

        let idle = self.pending.is_empty();
        self.pending.push_back(Pending { text, reply });
        if idle {
            self.write_head().await
        } else {
            Flow::Continue
        }
    }

    async fn on_frame(&mut self, frame: Frame) -> Flow {
        let Some(head) = self.pending.pop_front() else {
            warn!(classifier = %self.name, frame = ?frame, "Unsolicited classifier output, ignoring");
            return Flow::Continue;
        };

        let result = frame.into_prediction();
        match &result {
            Ok(prediction) => debug!(
                classifier = %self.name,
                label = %prediction.label,
                confidence = prediction.confidence,
                "Prediction"
            ),
            Err(e) => {
                warn!(classifier = %self.name, error = %e, "Malformed classifier output");
                metrics::counter!("postsift_classifier_errors_total", "kind" => "parse").increment(1);
            }
        }
        // The caller may have stopped waiting; the slot is consumed either way.
        let _ = head.reply.send(result);

        self.write_head().await
    }

    /// Write the head of the queue, skipping requests whose callers gave up
    /// before their text was sent.
    ///
    /// Commands arriving meanwhile are queued; a close aborts the write.
    async fn write_head(&mut self) -> Flow {
        while self
            .pending
            .front()
            .is_some_and(|head| head.reply.is_closed())
        {
            self.pending.pop_front();
        }

        let Some(head) = self.pending.front() else {
            return Flow::Continue;
        };
        let line = request_line(&head.text);

        let written = {
            let writer = &mut self.writer;
            let write = async move {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
                Ok::<_, std::io::Error>(())
            };
            tokio::pin!(write);

            loop {
                tokio::select! {
                    result = &mut write => break result,
                    command = self.commands.recv() => match command {
                        Some(Op::Classify { text, reply }) => {
                            self.pending.push_back(Pending { text, reply });
                        }
                        Some(Op::Close { done }) => return Flow::Stop(Some(done)),
                        None => return Flow::Stop(None),
                    },
                }
            }
        };

        if let Err(e) = written {
            self.on_exit(format!("write failed: {}", e));
        }
        Flow::Continue
    }

    fn on_exit(&mut self, reason: String) {
        let reason = match self.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(Some(status))) => {
                self.child = None;
                format!("{} ({})", reason, status)
            }
            Some(_) => {
                // Still running but unusable; reaped in shutdown.
                if let Some(Err(e)) = self.child.as_mut().map(|child| child.start_kill()) {
                    warn!(classifier = %self.name, error = %e, "Failed to kill classifier process");
                }
                reason
            }
            None => reason,
        };

        error!(
            classifier = %self.name,
            pending = self.pending.len(),
            reason = %reason,
            "Classifier process exited"
        );
        metrics::counter!("postsift_classifier_errors_total", "kind" => "exit").increment(1);

        for pending in self.pending.drain(..) {
            let _ = pending
                .reply
                .send(Err(Error::subprocess_exit(reason.clone())));
        }
        self.exited = Some(reason);
    }

    async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(classifier = %self.name, error = %e, "Failed to kill classifier process");
            }
        }

        for pending in self.pending.drain(..) {
            let _ = pending.reply.send(Err(Error::Closed));
        }

        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Op::Classify { reply, .. } => {
                    let _ = reply.send(Err(Error::Closed));
                }
                Op::Close { done } => {
                    let _ = done.send(());
                }
            }
        }

        info!(classifier = %self.name, "Scoring channel closed");
    }
}
