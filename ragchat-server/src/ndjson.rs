//! Incremental newline-delimited JSON decoding.
//!
//! Upstream chunks arrive at arbitrary byte boundaries: a JSON object, or even
//! a multi-byte character, may be split across two reads. [`LineDecoder`]
//! keeps the unterminated tail between pushes so callers only ever see whole
//! lines.

use serde::de::DeserializeOwned;
use tracing::warn;

#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, blank lines dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        complete.split(|b| *b == b'\n').filter_map(decode_line).collect()
    }

    /// Flush the final line if the stream ended without a newline.
    pub fn finish(self) -> Option<String> {
        decode_line(&self.pending)
    }

    /// Bytes held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(line: &[u8]) -> Option<String> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.trim(),
        Err(e) => {
            warn!(error = %e, line_len = line.len(), "skipping stream line that is not UTF-8");
            return None;
        }
    };
    (!line.is_empty()).then(|| line.to_string())
}

/// Parse one line as a JSON object of type `T`; malformed lines are logged and skipped.
pub fn parse_line<T: DeserializeOwned>(line: &str) -> Option<T> {
    match serde_json::from_str(line) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, line_len = line.len(), "skipping malformed stream line");
            None
        }
    }
}
