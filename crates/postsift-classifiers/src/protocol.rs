//! Line protocol spoken by interactive classifier processes
//!
//! One request line in, one response line out, in order:
//! ```text
//! > rust 1.80 stabilizes LazyLock
//! < __label__programming 0.97312
//! ```
//! There are no request identifiers; ordering is the only correlation.
//!
//! [`ResponseCodec`] frames the output stream without ever failing on bad
//! content: a line that is not UTF-8 or exceeds the length limit still
//! occupies exactly one response slot.

use crate::ClassificationResult;
use bytes::{Buf, BytesMut};
use postsift_core::{Error, Result};
use std::io;
use tokio_util::codec::Decoder;

/// Slack allowed above 1.0 before a confidence is rejected.
///
/// fastText's `predict-prob` can print values like `1.00001` for saturated
/// predictions; those are clamped rather than failed.
const CONFIDENCE_SLACK: f32 = 1e-4;

/// Parse one output line of the form `<label> <confidence>`
pub fn parse_prediction(line: &str) -> Result<ClassificationResult> {
    let mut tokens = line.split_whitespace();

    let label = tokens
        .next()
        .ok_or_else(|| Error::parse(line, "empty line"))?;
    let raw = tokens
        .next()
        .ok_or_else(|| Error::parse(line, "missing confidence"))?;
    if tokens.next().is_some() {
        return Err(Error::parse(line, "expected exactly two tokens"));
    }

    let confidence: f32 = raw
        .parse()
        .map_err(|e| Error::parse(line, format!("invalid confidence {:?}: {}", raw, e)))?;
    if !confidence.is_finite() || confidence < 0.0 || confidence > 1.0 + CONFIDENCE_SLACK {
        return Err(Error::parse(
            line,
            format!("confidence {} outside [0, 1]", confidence),
        ));
    }

    Ok(ClassificationResult::new(label, confidence.min(1.0)))
}

/// Make text safe to send as a single request line
///
/// Embedded line breaks would be read as extra requests by the subprocess and
/// skew every later response, so they are collapsed to spaces.
pub fn request_line(text: &str) -> String {
    let mut line: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    line.push('\n');
    line
}

/// Number of bytes of an unusable line kept for error messages
const PREVIEW_LENGTH: usize = 64;

/// One response line as framed off the classifier's stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete UTF-8 line without its terminator
    Line(String),
    /// A complete line that cannot be parsed as text
    Invalid { preview: String, reason: String },
}

impl Frame {
    /// Interpret the frame as a prediction
    pub fn into_prediction(self) -> Result<ClassificationResult> {
        match self {
            Frame::Line(line) => parse_prediction(&line),
            Frame::Invalid { preview, reason } => Err(Error::parse(preview, reason)),
        }
    }
}

/// Newline framing that reports undecodable or over-long lines as
/// [`Frame::Invalid`] instead of erroring the stream
#[derive(Debug, Clone)]
pub struct ResponseCodec {
    max_length: usize,
    next_index: usize,
    discarding: Option<String>,
}

impl ResponseCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: None,
        }
    }

    fn frame(line: &[u8]) -> Frame {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match std::str::from_utf8(line) {
            Ok(text) => Frame::Line(text.to_string()),
            Err(e) => Frame::Invalid {
                preview: preview(line),
                reason: format!("invalid UTF-8: {}", e),
            },
        }
    }

    fn too_long(&self, preview: String) -> Frame {
        Frame::Invalid {
            preview,
            reason: format!("line longer than {} bytes", self.max_length),
        }
    }
}

fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(PREVIEW_LENGTH)]).into_owned()
}

impl Decoder for ResponseCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        loop {
            let read_to = self.max_length.saturating_add(1).min(buf.len());
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding.is_some(), newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.next_index = 0;
                    let preview = self.discarding.take().unwrap_or_default();
                    return Ok(Some(self.too_long(preview)));
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = buf.split_to(end + 1);
                    return Ok(Some(Self::frame(&line[..end])));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.discarding = Some(preview(&buf[..read_to]));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if let Some(preview) = self.discarding.take() {
            buf.clear();
            return Ok(Some(self.too_long(preview)));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        Ok(Some(Self::frame(&line)))
    }
}
