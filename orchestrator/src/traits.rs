//! Trait definitions with mockall annotations for testing
//!
//! Every piece of I/O a connection performs goes through one of these seams:
//! the bootstrap HTTP call, the streaming transport, time, and the event
//! sink. The real implementations live in `services`; tests swap in mocks or
//! the in-process loopback bot.

use shared::{ConnectionEvent, ConnectionId, Frame};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{HandshakeError, OrchestratorResult};

/// One message on the streaming transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Binary(Vec<u8>),
    Text(String),
}

/// Transport limits and keep-alive settings applied at open time
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    pub max_message_size: usize,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

impl TransportOptions {
    pub fn from_settings(settings: &shared::Settings) -> Self {
        Self {
            max_message_size: settings.websocket_max_size,
            ping_interval: settings.ping_interval(),
            ping_timeout: settings.ping_timeout(),
        }
    }
}

/// Bootstrap HTTP exchange that yields the streaming transport URL
#[mockall::automock]
#[async_trait::async_trait]
pub trait Bootstrapper: Send + Sync {
    /// POST `{"rtvi_client_version": ...}` to `connect_url`
    ///
    /// # Returns
    /// The `ws_url` from a 200 response
    async fn bootstrap(&self, connect_url: &str, client_version: &str) -> Result<String, HandshakeError>;
}

/// Opens streaming transports
#[mockall::automock]
#[async_trait::async_trait]
pub trait TransportConnector: Send + Sync {
    async fn open(&self, url: &str, options: &TransportOptions) -> Result<Box<dyn Transport>, HandshakeError>;
}

/// Bidirectional message transport for one connection.
///
/// `send` and `recv` may be called concurrently from different tasks;
/// implementations serialize writes internally.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: WireMessage) -> OrchestratorResult<()>;

    /// Next inbound message; `None` once the peer has closed
    async fn recv(&self) -> Option<OrchestratorResult<WireMessage>>;

    async fn close(&self) -> OrchestratorResult<()>;
}

/// Time source for sleeps and latency measurement
#[mockall::automock]
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Receiver of structured connection events
#[mockall::automock]
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ConnectionEvent);
}

/// Decoded inbound message as seen by an observer
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(Frame),
    /// Well-formed binary with no known frame variant
    Unrecognized(Vec<u8>),
    /// Text message that parsed as JSON
    Json(serde_json::Value),
    /// Text message that did not parse as JSON
    InvalidText(String),
}

/// Optional tap on every inbound message after the handshake
#[mockall::automock]
pub trait InboundObserver: Send + Sync {
    fn observe(&self, connection_id: ConnectionId, inbound: &Inbound);
}

/// Restartable source of fixed-size PCM chunks
#[mockall::automock]
pub trait AudioSource: Send {
    fn next_chunk(&mut self) -> Option<Vec<u8>>;

    /// Rewind to the first chunk
    fn restart(&mut self);
}

/// Produces an independent audio source per connection
pub trait AudioSourceFactory: Send + Sync {
    fn open(&self) -> Box<dyn AudioSource>;
}
