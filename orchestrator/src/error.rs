//! Orchestrator-specific error types

use shared::SharedError;
use thiserror::Error;

/// Failure establishing a connection, before it reaches `Ready`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandshakeError {
    #[error("Bootstrap request failed: {message}")]
    BootstrapRequest { message: String },

    #[error("Bootstrap returned HTTP {status}: {body}")]
    BootstrapStatus { status: u16, body: String },

    #[error("Bootstrap response has no streaming transport URL")]
    MissingTransportUrl,

    #[error("Transport open failed: {message}")]
    TransportOpen { message: String },

    #[error("Bot reported error: {message}")]
    BotError { message: String },

    #[error("Handshake timed out during {phase}")]
    Timeout { phase: String },

    #[error("Transport failure during handshake: {message}")]
    Transport { message: String },

    #[error("Transport closed before bot-ready")]
    TransportClosed,

    #[error("Handshake cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Stream error: {message}")]
    Stream { message: String },

    #[error("Requested {requested} concurrent connections, maximum is {max}")]
    CapacityExceeded { requested: usize, max: usize },

    #[error("Invalid load pattern: {reason}")]
    InvalidPattern { reason: String },

    #[error("Audio source error: {message}")]
    Audio { message: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream { message: message.into() }
    }

    pub fn invalid_pattern(reason: impl Into<String>) -> Self {
        Self::InvalidPattern { reason: reason.into() }
    }

    pub fn audio(message: impl Into<String>) -> Self {
        Self::Audio { message: message.into() }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
