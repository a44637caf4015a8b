//! Bounded per-session buffer of inbound messages

use orchestrator::traits::Inbound;
use serde_json::{Value, json};
use shared::Frame;
use std::collections::VecDeque;

use crate::types::{MessageKind, MessageRecord};

/// Records kept per session before the oldest are dropped
pub const DEFAULT_CAPACITY: usize = 1000;

impl MessageRecord {
    /// Classify one inbound message received at `timestamp`
    pub fn from_inbound(inbound: &Inbound, timestamp: f64) -> Self {
        let (kind, data) = match inbound {
            Inbound::Frame(Frame::Transcription(t)) => (
                MessageKind::Transcription,
                json!({ "text": t.text, "user_id": t.user_id, "timestamp": t.timestamp }),
            ),
            Inbound::Frame(Frame::Audio(a)) => (
                MessageKind::Audio,
                json!({ "size_bytes": a.audio.len(), "sample_rate": a.sample_rate }),
            ),
            Inbound::Frame(Frame::Message(m)) => match serde_json::from_str::<Value>(&m.data) {
                Ok(value) => (MessageKind::Rtvi, value),
                Err(_) => (MessageKind::Message, json!({ "raw": m.data })),
            },
            Inbound::Frame(Frame::Text(t)) => (MessageKind::Text, json!({ "text": t.text })),
            Inbound::Unrecognized(bytes) => (MessageKind::Raw, json!({ "size_bytes": bytes.len() })),
            Inbound::Json(value) => (MessageKind::Json, value.clone()),
            Inbound::InvalidText(text) => (MessageKind::Raw, json!({ "text": text })),
        };
        Self { timestamp, kind, data }
    }
}

#[derive(Debug)]
pub struct MessageBuffer {
    records: VecDeque<MessageRecord>,
    capacity: usize,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, record: MessageRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// The last `limit` records newer than `since`, oldest first
    pub fn query(&self, limit: usize, since: Option<f64>) -> Vec<MessageRecord> {
        let matching: Vec<&MessageRecord> = self
            .records
            .iter()
            .filter(|r| since.is_none_or(|since| r.timestamp > since))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
