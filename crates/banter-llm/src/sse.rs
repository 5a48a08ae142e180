//! Incremental SSE line parsing for provider byte streams.
//!
//! Buffers arbitrary chunk boundaries, splits on newlines, and extracts
//! `data: ` payloads. Comments, empty lines, and non-data fields are
//! skipped. The `[DONE]` marker is returned verbatim so the caller
//! decides how to end its stream.

use bytes::BytesMut;

/// Stateful line buffer for an SSE byte stream.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: BytesMut,
}

impl SseLineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Feed a chunk and return every complete `data:` payload it closed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(newline_pos + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            let Ok(line) = std::str::from_utf8(&line) else {
                continue; // skip invalid UTF-8 lines
            };
            if let Some(data) = extract_sse_data(line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Drain any trailing unterminated line as a final payload.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        let line = std::str::from_utf8(&rest).ok()?;
        extract_sse_data(line.trim_end())
    }
}

/// Extract the data payload from one SSE line.
///
/// Returns `None` for comments, empty lines, and non-data fields.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();
    if data.is_empty() {
        return None;
    }
    Some(data.to_string())
}
