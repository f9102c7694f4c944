use serde_json::Value;
use tracing::{debug, warn};

use crate::events::{decode_chunk, AgentChunk};

/// Sentinels some servers append after the final event.
const DONE_SENTINELS: [&str; 3] = ["[DONE]", "[DONE_GEN]", "[DONE_STEP]"];

/// One decoded SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Chunk(AgentChunk),
    /// The server reported an error inside the stream.
    Failed(String),
}

/// Incremental parser for SSE text streams.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence cut by the network chunk boundary.
    partial: Vec<u8>,
    malformed: usize,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.push_bytes(bytes);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut frames = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(frame) = self.decode_frame(&frame) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<SseFrame> {
        let mut parser = Self::default();
        let mut frames = parser.feed(input.as_bytes());
        frames.extend(parser.finish());
        frames
    }

    /// Decode whatever complete frame remains once the byte stream has ended.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if !self.partial.is_empty() {
            let partial = std::mem::take(&mut self.partial);
            self.buffer.push_str(&String::from_utf8_lossy(&partial));
        }
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return Vec::new();
        }
        self.decode_frame(rest.trim_end()).into_iter().collect()
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.partial.is_empty() && self.buffer.trim().is_empty()
    }

    /// Number of frames skipped because they could not be decoded.
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    /// Appends decoded text, holding back an incomplete trailing character
    /// until the next feed completes it.
    fn push_bytes(&mut self, bytes: &[u8]) {
        let mut pending = std::mem::take(&mut self.partial);
        pending.extend_from_slice(bytes);

        match std::str::from_utf8(&pending) {
            Ok(text) => self.buffer.push_str(text),
            Err(error) if error.error_len().is_none() => {
                let (complete, tail) = pending.split_at(error.valid_up_to());
                self.buffer.push_str(&String::from_utf8_lossy(complete));
                self.partial = tail.to_vec();
            }
            Err(_) => self.buffer.push_str(&String::from_utf8_lossy(&pending)),
        }
    }

    fn decode_frame(&mut self, frame: &str) -> Option<SseFrame> {
        let (event, payload) = split_frame(frame);
        let payload = payload?;
        if payload.is_empty() || DONE_SENTINELS.contains(&payload.as_str()) {
            return None;
        }

        let value = match serde_json::from_str::<Value>(&payload) {
            Ok(value) => value,
            Err(error) => {
                self.malformed += 1;
                warn!(%error, payload = %truncate(&payload), "skipping unparseable SSE frame");
                return None;
            }
        };

        if event.as_deref() == Some("error") || is_error_payload(&value) {
            return Some(SseFrame::Failed(error_message(&value)));
        }

        match decode_chunk(&value) {
            Ok(chunk) => {
                debug!(category = %chunk.category(), "decoded stream chunk");
                Some(SseFrame::Chunk(chunk))
            }
            Err(error) => {
                self.malformed += 1;
                warn!(reason = %error.reason, "skipping malformed chunk");
                None
            }
        }
    }
}

fn split_frame(frame: &str) -> (Option<String>, Option<String>) {
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_owned());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        }
    }

    let data = if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    };
    (event, data)
}

fn is_error_payload(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.contains_key("error")
        && !object.contains_key("message_type")
        && !object.contains_key("type")
}

fn error_message(value: &Value) -> String {
    let error = value.get("error").unwrap_or(value);
    error
        .get("message")
        .or_else(|| error.get("detail"))
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| value.to_string())
}

fn truncate(payload: &str) -> &str {
    match payload.char_indices().nth(120) {
        Some((index, _)) => &payload[..index],
        None => payload,
    }
}
