//! Streaming JSON framing for the ingestion socket.
//!
//! Bytes are appended as they arrive and complete top-level JSON values are split off
//! with `serde_json`'s streaming deserializer. An object may span several reads and a
//! single read may carry several objects.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use thiserror::Error;

/// A chunk of buffered input that could not be turned into a JSON value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid JSON, discarded {discarded} bytes: {reason}")]
    Syntax { discarded: usize, reason: String },

    #[error("Incomplete message exceeded {limit} bytes, discarded {discarded} bytes")]
    Oversized { limit: usize, discarded: usize },
}

/// Incremental splitter of a byte stream into JSON values.
#[derive(Debug)]
pub struct JsonFramer {
    buf: BytesMut,
    max_message_size: usize,
    /// Prefix of `buf` already known to hold an incomplete object or array.
    incomplete_len: usize,
}

impl JsonFramer {
    /// Create a framer that gives up on any single value larger than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_message_size.min(64 * 1024)),
            max_message_size,
            incomplete_len: 0,
        }
    }

    /// Append received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held while waiting for the rest of a value.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete value, `None` when more input is needed.
    pub fn next_frame(&mut self) -> Option<Result<Value, FrameError>> {
        if self.incomplete_len > 0 {
            // A container cannot complete before a closing bracket arrives.
            let fresh = &self.buf[self.incomplete_len..];
            if !fresh.iter().any(|&b| b == b'}' || b == b']') {
                self.incomplete_len = self.buf.len();
                return self.wait_for_more();
            }
        }

        let skip = self
            .buf
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buf.len());
        self.advance(skip);
        if self.buf.is_empty() {
            return None;
        }

        let (next, consumed) = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            let next = stream.next();
            (next, stream.byte_offset())
        };

        match next {
            // A number ending the buffer may still have digits in flight.
            Some(Ok(Value::Number(_))) if consumed == self.buf.len() => self.wait_for_more(),
            Some(Ok(value)) => {
                self.advance(consumed);
                Some(Ok(value))
            }
            Some(Err(e)) if e.is_eof() => {
                if matches!(self.buf[0], b'{' | b'[') {
                    self.incomplete_len = self.buf.len();
                }
                self.wait_for_more()
            }
            Some(Err(e)) => {
                let discarded = self.resync();
                Some(Err(FrameError::Syntax {
                    discarded,
                    reason: e.to_string(),
                }))
            }
            None => None,
        }
    }

    /// `None` while the pending value fits, otherwise discard it.
    fn wait_for_more(&mut self) -> Option<Result<Value, FrameError>> {
        if self.buf.len() <= self.max_message_size {
            return None;
        }
        let discarded = self.buf.len();
        self.advance(discarded);
        Some(Err(FrameError::Oversized {
            limit: self.max_message_size,
            discarded,
        }))
    }

    fn advance(&mut self, count: usize) {
        if count > 0 {
            self.buf.advance(count);
            self.incomplete_len = 0;
        }
    }

    /// Drop bytes up to the next `{` after the current position.
    fn resync(&mut self) -> usize {
        let discarded = self.buf[1..]
            .iter()
            .position(|&b| b == b'{')
            .map(|pos| pos + 1)
            .unwrap_or(self.buf.len());
        self.advance(discarded);
        discarded
    }
}
