// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-delimited JSON decoding for subprocess event streams.
//!
//! The agent CLIs emit one JSON object per stdout line. Pipes hand us
//! arbitrary byte chunks, so the decoder buffers until a newline and
//! keeps any trailing partial line for the next feed. Malformed lines
//! are counted and skipped; a bad line must never kill the turn.

use serde_json::Value;

/// Incremental decoder over a subprocess stdout pipe.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
    decode_errors: u64,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes; returns every completed event object.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush at EOF: decode a trailing line that never got its newline.
    pub fn finish(&mut self) -> Option<Value> {
        if self.buffer.is_empty() {
            return None;
        }
        let line: Vec<u8> = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    /// Count of malformed lines seen so far.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<Value> {
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) if value.is_object() => Some(value),
            Ok(value) => {
                self.count_error(&format!("non-object event: {}", value));
                None
            }
            Err(e) => {
                self.count_error(&e.to_string());
                None
            }
        }
    }

    /// First malformed line warns; the rest go to debug so a broken
    /// stream does not flood the log.
    fn count_error(&mut self, detail: &str) {
        self.decode_errors += 1;
        if self.decode_errors == 1 {
            tracing::warn!(detail, "malformed event line, skipping");
        } else {
            tracing::debug!(detail, count = self.decode_errors, "malformed event line, skipping");
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
