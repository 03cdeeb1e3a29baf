// Chunked message reassembly
//
// The wireless link caps a single write at a couple hundred bytes, so long
// commands arrive as envelopes {"k":n,"t":total,"d":"..."} with 1-based k.
// Fragments must arrive strictly in order; anything else is a protocol
// error that resets the buffer and tells the peer. Buffers that are not
// envelopes pass through as complete commands.

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

use crate::config;

pub struct ChunkAssembler {
    capacity: usize,
    buffer: String,
    expected_total: u64,
    last_received: u64,
    responses: UnboundedSender<String>,
}

impl ChunkAssembler {
    pub fn new(responses: UnboundedSender<String>) -> Self {
        Self::with_capacity(config::CHUNK_BUFFER_SIZE, responses)
    }

    pub fn with_capacity(capacity: usize, responses: UnboundedSender<String>) -> Self {
        Self {
            capacity,
            buffer: String::new(),
            expected_total: 0,
            last_received: 0,
            responses,
        }
    }

    /// Drop any partially assembled message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_total = 0;
        self.last_received = 0;
    }

    /// True if appending `additional` bytes would exceed capacity.
    fn would_overflow(&self, additional: usize) -> bool {
        self.buffer.len() + additional > self.capacity
    }

    fn respond(&self, text: String) {
        self.responses.send(text).ok();
    }

    /// Handle one inbound buffer. Returns the complete command payload when
    /// one is available: either the buffer itself (unframed) or the
    /// concatenation of a finished fragment sequence.
    pub fn on_bytes(&mut self, data: &[u8]) -> Option<String> {
        let parsed: Value = match serde_json::from_slice(data) {
            Ok(v) => v,
            Err(e) => {
                warn!("Invalid JSON: {}", e);
                return None;
            }
        };

        let fields = (
            parsed.get("k").and_then(Value::as_u64),
            parsed.get("t").and_then(Value::as_u64),
            parsed.get("d").and_then(Value::as_str),
        );
        let (Some(index), Some(total), Some(payload)) = fields else {
            // Not an envelope: the whole buffer is one command
            return Some(String::from_utf8_lossy(data).into_owned());
        };

        debug!("Chunk {}/{} ({} bytes)", index, total, payload.len());

        // First fragment starts a fresh message
        if index == 1 {
            self.reset();
            self.expected_total = total;
        }

        if index != self.last_received + 1 || total != self.expected_total {
            warn!("Chunk sequence error, resetting");
            self.reset();
            self.respond(json!({"err": "chunk_seq"}).to_string());
            return None;
        }

        if self.would_overflow(payload.len()) {
            error!("Chunk buffer overflow");
            self.reset();
            self.respond(json!({"err": "overflow"}).to_string());
            return None;
        }

        self.buffer.push_str(payload);
        self.last_received = index;
        self.respond(json!({"ack": index}).to_string());

        if self.last_received == self.expected_total {
            debug!("All chunks received, total {} bytes", self.buffer.len());
            let complete = std::mem::take(&mut self.buffer);
            self.reset();
            return Some(complete);
        }

        None
    }
}

/// Split an outbound payload into notify-sized envelopes. Payloads that
/// already fit go out bare, mirroring the inbound side.
pub fn split_into_envelopes(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    // Envelope framing plus index/total digits take bytes out of each write
    let overhead = 24;
    let chunk_len = limit.saturating_sub(overhead).max(1);
    let parts = split_utf8(text, chunk_len);
    let total = parts.len();

    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let escaped = Value::String((*part).to_string());
            format!("{{\"k\":{},\"t\":{},\"d\":{}}}", i + 1, total, escaped)
        })
        .collect()
}

/// Split a str into at-most-`max_bytes` pieces on char boundaries.
fn split_utf8(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = max_bytes.min(rest.len());
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // max_bytes is smaller than one character; take it whole
            end = rest
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(end);
        parts.push(head);
        rest = tail;
    }
    parts
}
