//! Connection lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    WebSocketOpen,
    AwaitingPipelineReady,
    ClientReadySent,
    Ready,
    Streaming,
    Disconnecting,
    Closed,
    Error,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Disconnecting) => self != Disconnecting,
            (Disconnecting, Closed) => true,
            (Disconnecting, _) => false,
            (Error, Unconnected) | (Error, Closed) => true,
            (Error, _) => false,
            (_, Error) => true,
            (Unconnected, Connecting)
            | (Connecting, WebSocketOpen)
            | (WebSocketOpen, AwaitingPipelineReady)
            | (AwaitingPipelineReady, ClientReadySent)
            | (ClientReadySent, Ready)
            | (Ready, Streaming) => true,
            (Unconnected, Closed) => true,
            _ => false,
        }
    }

    /// States in which audio and text may be sent
    pub fn is_ready(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Streaming)
    }

    /// States between the bootstrap request and bot-ready
    pub fn is_handshaking(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::WebSocketOpen
                | ConnectionState::AwaitingPipelineReady
                | ConnectionState::ClientReadySent
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::WebSocketOpen => "websocket_open",
            ConnectionState::AwaitingPipelineReady => "awaiting_pipeline_ready",
            ConnectionState::ClientReadySent => "client_ready_sent",
            ConnectionState::Ready => "ready",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
