//! WebSocket transport over tokio-tungstenite

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use shared::{ProcessId, process_debug, process_warn};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tokio_util::sync::CancellationToken;

use crate::error::{HandshakeError, OrchestratorError, OrchestratorResult};
use crate::traits::{Transport, TransportConnector, TransportOptions, WireMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Opens real websocket transports
#[derive(Debug, Default, Clone)]
pub struct RealTransportConnector;

impl RealTransportConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportConnector for RealTransportConnector {
    async fn open(&self, url: &str, options: &TransportOptions) -> Result<Box<dyn Transport>, HandshakeError> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(options.max_message_size);
        config.max_frame_size = Some(options.max_message_size);

        let (stream, _response) = connect_async_with_config(url, Some(config), false)
            .await
            .map_err(|e| HandshakeError::TransportOpen { message: e.to_string() })?;

        Ok(Box::new(WsTransport::new(stream, options)))
    }
}

/// One open websocket; writes go through a single sink lock.
///
/// A keep-alive task pings every `ping_interval` and marks the transport dead
/// if no pong is seen within `ping_timeout`. Pongs are observed by `recv`.
pub struct WsTransport {
    sink: Arc<Mutex<WsSink>>,
    stream: Mutex<SplitStream<WsStream>>,
    last_pong: Arc<StdMutex<Instant>>,
    dead: CancellationToken,
    stop: CancellationToken,
}

impl WsTransport {
    fn new(stream: WsStream, options: &TransportOptions) -> Self {
        let (sink, stream) = stream.split();
        let transport = Self {
            sink: Arc::new(Mutex::new(sink)),
            stream: Mutex::new(stream),
            last_pong: Arc::new(StdMutex::new(Instant::now())),
            dead: CancellationToken::new(),
            stop: CancellationToken::new(),
        };

        if !options.ping_interval.is_zero() {
            tokio::spawn(keepalive(
                transport.sink.clone(),
                transport.last_pong.clone(),
                options.ping_interval,
                options.ping_timeout,
                transport.dead.clone(),
                transport.stop.clone(),
            ));
        }
        transport
    }
}

async fn keepalive(
    sink: Arc<Mutex<WsSink>>,
    last_pong: Arc<StdMutex<Instant>>,
    interval: Duration,
    timeout: Duration,
    dead: CancellationToken,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let sent_at = Instant::now();
        if sink.lock().await.send(Message::Ping(Vec::new())).await.is_err() {
            break;
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(timeout) => {}
        }

        let pong = *last_pong.lock().unwrap_or_else(PoisonError::into_inner);
        if pong < sent_at {
            process_warn!(ProcessId::current(), "no pong within {:.1}s", timeout.as_secs_f64());
            dead.cancel();
            break;
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, message: WireMessage) -> OrchestratorResult<()> {
        let message = match message {
            WireMessage::Binary(bytes) => Message::Binary(bytes),
            WireMessage::Text(text) => Message::Text(text),
        };
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| OrchestratorError::stream(e.to_string()))
    }

    async fn recv(&self) -> Option<OrchestratorResult<WireMessage>> {
        let mut stream = self.stream.lock().await;
        loop {
            let next = tokio::select! {
                _ = self.dead.cancelled() => {
                    return Some(Err(OrchestratorError::stream("keep-alive ping timed out")));
                }
                next = stream.next() => next,
            };

            match next? {
                Ok(Message::Binary(bytes)) => return Some(Ok(WireMessage::Binary(bytes))),
                Ok(Message::Text(text)) => return Some(Ok(WireMessage::Text(text))),
                Ok(Message::Pong(_)) => {
                    *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
                }
                // Pings are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    process_debug!(ProcessId::current(), "close frame received: {:?}", frame);
                    return None;
                }
                Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
                | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => return None,
                Err(e) => return Some(Err(OrchestratorError::stream(e.to_string()))),
            }
        }
    }

    async fn close(&self) -> OrchestratorResult<()> {
        self.stop.cancel();
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| OrchestratorError::stream(e.to_string()))
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
