//! Connection events

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, ErrorPhase};

/// Structured event emitted by a connection to its registered sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Handshake completed; `connect_time` is the latency in seconds
    Connected {
        connection_id: ConnectionId,
        connect_time: f64,
    },
    Error {
        connection_id: ConnectionId,
        error: String,
        phase: ErrorPhase,
    },
    Transcription {
        connection_id: ConnectionId,
        text: String,
    },
    BotAudio {
        connection_id: ConnectionId,
        size: usize,
    },
    RtviMessage {
        connection_id: ConnectionId,
        #[serde(rename = "type")]
        message_type: String,
    },
}

impl ConnectionEvent {
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            ConnectionEvent::Connected { connection_id, .. }
            | ConnectionEvent::Error { connection_id, .. }
            | ConnectionEvent::Transcription { connection_id, .. }
            | ConnectionEvent::BotAudio { connection_id, .. }
            | ConnectionEvent::RtviMessage { connection_id, .. } => *connection_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected { .. } => "connected",
            ConnectionEvent::Error { .. } => "error",
            ConnectionEvent::Transcription { .. } => "transcription",
            ConnectionEvent::BotAudio { .. } => "bot_audio",
            ConnectionEvent::RtviMessage { .. } => "rtvi_message",
        }
    }
}

/// An event stamped with seconds since the collector started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub timestamp: f64,
    #[serde(flatten)]
    pub event: ConnectionEvent,
}
