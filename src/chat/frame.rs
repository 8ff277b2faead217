//! # Frame Decoder
//!
//! Turns the raw reply body into discrete [`StreamFrame`]s.
//!
//! The body is newline-delimited. Lines of interest look like:
//!
//! ```text
//! data: {"text":"Hel"}
//! data: {"text":"lo"}
//! data: {"done":true}
//! ```
//!
//! Network reads split the body at arbitrary byte offsets (inside a record,
//! inside the `data:` marker, inside a multi-byte character). The decoder
//! keeps the trailing incomplete line between calls and only ever decodes
//! complete lines, so feeding a body in any number of pieces yields the same
//! frames as feeding it whole.

use log::{debug, warn};
use serde::Deserialize;

/// Prefix marking a record line.
const RECORD_MARKER: &str = "data:";

/// One decoded unit of a streaming reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Incremental reply text.
    Text(String),
    /// The reply finished successfully.
    Done,
    /// The service reported a failure. Terminal.
    Error(String),
}

impl StreamFrame {
    /// `Done` and `Error` end a reply.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Done | StreamFrame::Error(_))
    }
}

/// Payload of a single `data:` record.
#[derive(Deserialize, Debug, Default)]
struct RecordPayload {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Incremental line reassembler + record parser.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes after the last newline seen so far.
    pending: Vec<u8>,
    /// Set once a terminal frame has been produced.
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `Done` or `Error` has been emitted. Further input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feeds one network read and returns every frame it completes.
    pub fn push(&mut self, piece: &[u8]) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        if self.finished {
            if !piece.is_empty() {
                debug!("Ignoring {} bytes after terminal frame", piece.len());
            }
            return frames;
        }

        self.pending.extend_from_slice(piece);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]).into_owned();
            start = end + 1;

            if let Some(frame) = decode_line(&line) {
                let terminal = frame.is_terminal();
                frames.push(frame);
                if terminal {
                    self.finished = true;
                    break;
                }
            }
        }

        if self.finished {
            self.pending.clear();
        } else {
            self.pending.drain(..start);
        }
        frames
    }

    /// Signals end of body. A final line without a trailing newline is
    /// decoded as a complete line.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        if self.finished || self.pending.is_empty() {
            self.pending.clear();
            return Vec::new();
        }

        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();

        match decode_line(&line) {
            Some(frame) => {
                self.finished = frame.is_terminal();
                vec![frame]
            }
            None => Vec::new(),
        }
    }
}

/// Decodes one complete line. Non-record lines, blank lines and malformed
/// payloads yield `None`.
fn decode_line(line: &str) -> Option<StreamFrame> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let data = line.strip_prefix(RECORD_MARKER)?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data.trim().is_empty() {
        return None;
    }

    let payload: RecordPayload = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(e) => {
            warn!("Skipping malformed record ({e}): {data}");
            return None;
        }
    };

    if let Some(message) = payload.error {
        return Some(StreamFrame::Error(message));
    }
    if payload.done {
        return Some(StreamFrame::Done);
    }
    match payload.text {
        Some(text) if !text.is_empty() => Some(StreamFrame::Text(text)),
        _ => None,
    }
}
