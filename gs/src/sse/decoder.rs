//! Incremental SSE decoder
//!
//! Chunks arrive with no regard for frame boundaries: a split may fall inside
//! a field name, a JSON payload, a `\r\n\r\n` terminator or a multi-byte UTF-8
//! character. The decoder keeps two pieces of state across calls: the bytes of
//! an incomplete trailing UTF-8 sequence, and the text not yet terminated by a
//! blank line.

use tracing::debug;

use super::event::{DecodedEvent, decode};
use super::frame::{Frame, parse_frame};

const LF_BOUNDARY: &str = "\n\n";
const CRLF_BOUNDARY: &str = "\r\n\r\n";

/// Stateful decoder for one response body
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Decoded text awaiting a blank-line boundary
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        debug!(chunk_len = chunk.len(), buffered = self.buffer.len(), "feed: called");
        self.pending.extend_from_slice(chunk);
        self.decode_pending();
        self.drain_frames()
    }

    /// Flush at end of transport
    ///
    /// Incomplete UTF-8 bytes are decoded lossily, complete blocks still in the
    /// buffer are framed, and an unterminated tail is discarded.
    pub fn finish(&mut self) -> Vec<Frame> {
        debug!(buffered = self.buffer.len(), pending = self.pending.len(), "finish: called");
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.buffer.push_str(&tail);
            self.pending.clear();
        }

        let frames = self.drain_frames();
        if !self.buffer.is_empty() {
            debug!(
                discarded = self.buffer.len(),
                "finish: discarding unterminated tail"
            );
            self.buffer.clear();
        }
        frames
    }

    /// [`feed`](Self::feed) followed by [`decode`] on each frame
    pub fn feed_events(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        self.feed(chunk).iter().filter_map(decode).collect()
    }

    /// [`finish`](Self::finish) followed by [`decode`] on each frame
    pub fn finish_events(&mut self) -> Vec<DecodedEvent> {
        self.finish().iter().filter_map(decode).collect()
    }

    /// Bytes of text currently held back waiting for a boundary
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }

    fn decode_pending(&mut self) {
        loop {
            let (valid, bad) = match std::str::from_utf8(&self.pending) {
                Ok(_) => (self.pending.len(), None),
                Err(e) => (e.valid_up_to(), e.error_len()),
            };
            if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                self.buffer.push_str(text);
            }
            match bad {
                Some(bad) => {
                    debug!(offset = valid, bad, "decode_pending: invalid UTF-8, substituting");
                    self.buffer.push(char::REPLACEMENT_CHARACTER);
                    self.pending.drain(..valid + bad);
                }
                // Everything decoded, or an incomplete sequence waits for more bytes
                None => {
                    self.pending.drain(..valid);
                    return;
                }
            }
        }
    }

    fn drain_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some((end, sep_len)) = find_boundary(&self.buffer) {
            if let Some(frame) = parse_frame(&self.buffer[..end]) {
                frames.push(frame);
            }
            self.buffer.drain(..end + sep_len);
        }
        frames
    }
}

/// Earliest blank-line boundary as (block end, separator length)
fn find_boundary(text: &str) -> Option<(usize, usize)> {
    let lf = text.find(LF_BOUNDARY).map(|i| (i, LF_BOUNDARY.len()));
    let crlf = text.find(CRLF_BOUNDARY).map(|i| (i, CRLF_BOUNDARY.len()));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
