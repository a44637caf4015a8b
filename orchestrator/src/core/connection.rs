//! One simulated client session against the voice bot
//!
//! A [`Connection`] drives the two-phase handshake (bootstrap POST, then
//! client-ready / bot-ready over the streaming transport), streams audio and
//! text once ready, runs a concurrent receive loop, and tears down exactly
//! once. Network faults never escape as errors: they are recorded on the
//! connection with the phase they happened in and surfaced as `false`.

use shared::{
    ClientAbout, ConnectionEvent, ConnectionId, ConnectionMetrics, Decoded, ErrorPhase, ErrorRecord, Frame,
    ProcessId, RtviEnvelope, Settings, decode_frame, process_debug, process_warn,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::ConnectionState;
use crate::error::HandshakeError;
use crate::traits::{
    AudioSource, Bootstrapper, Clock, EventSink, Inbound, InboundObserver, Transport, TransportConnector,
    TransportOptions, WireMessage,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collaborators shared by every connection in a run
#[derive(Clone)]
pub struct ConnectionDeps {
    pub settings: Arc<Settings>,
    pub bootstrapper: Arc<dyn Bootstrapper>,
    pub connector: Arc<dyn TransportConnector>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn EventSink>,
}

/// Why a call to [`Connection::stream_audio`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The requested duration elapsed
    DurationElapsed,
    /// The source ran out and looping was not requested
    Exhausted,
    SendFailed,
    PeerClosed,
    Cancelled,
    /// The connection was not in `Ready` or `Streaming`
    NotReady,
}

/// State and counters visible to the receive task and to probes
struct ConnectionShared {
    id: ConnectionId,
    state: Mutex<ConnectionState>,
    frame_id: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_received: AtomicU64,
    connect_time: Mutex<Option<f64>>,
    errors: Mutex<Vec<ErrorRecord>>,
    peer_closed: AtomicBool,
    sink: Arc<dyn EventSink>,
}

impl ConnectionShared {
    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Apply `next` if legal from the current state
    fn transition(&self, next: ConnectionState) -> bool {
        let mut state = lock(&self.state);
        if !state.can_transition_to(next) {
            return false;
        }
        process_debug!(
            ProcessId::current(),
            connection_id = %self.id,
            "state {} -> {}",
            *state,
            next
        );
        *state = next;
        true
    }

    fn record_error(&self, phase: ErrorPhase, error: impl Into<String>) {
        let error = error.into();
        process_warn!(
            ProcessId::current(),
            connection_id = %self.id,
            phase = %phase,
            "⚠️ {} error: {}",
            phase,
            error
        );

        lock(&self.errors).push(ErrorRecord::now(phase, error.clone()));
        self.sink.emit(ConnectionEvent::Error {
            connection_id: self.id,
            error,
            phase,
        });
    }

    fn snapshot(&self) -> ConnectionMetrics {
        ConnectionMetrics {
            connection_id: self.id,
            connect_time: *lock(&self.connect_time),
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            bytes_sent: self.bytes_sent.load(Ordering::SeqCst),
            frames_received: self.frames_received.load(Ordering::SeqCst),
            errors: lock(&self.errors).clone(),
        }
    }
}

/// Read-only view of a connection, safe to hold after the connection moved
/// into its task
#[derive(Clone)]
pub struct ConnectionProbe {
    shared: Arc<ConnectionShared>,
}

impl ConnectionProbe {
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn frame_id(&self) -> u64 {
        self.shared.frame_id.load(Ordering::SeqCst)
    }

    pub fn is_peer_closed(&self) -> bool {
        self.shared.peer_closed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ConnectionMetrics {
        self.shared.snapshot()
    }
}

struct ReceiveTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Connection {
    id: ConnectionId,
    host: String,
    deps: ConnectionDeps,
    shared: Arc<ConnectionShared>,
    cancel: CancellationToken,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    receiver: Mutex<Option<ReceiveTask>>,
    send_lock: tokio::sync::Mutex<()>,
}

impl Connection {
    pub fn new(id: ConnectionId, host: impl Into<String>, deps: ConnectionDeps) -> Self {
        Self::with_cancellation(id, host, deps, &CancellationToken::new())
    }

    /// Create a connection that is cancelled together with `parent`
    pub fn with_cancellation(
        id: ConnectionId,
        host: impl Into<String>,
        deps: ConnectionDeps,
        parent: &CancellationToken,
    ) -> Self {
        let shared = Arc::new(ConnectionShared {
            id,
            state: Mutex::new(ConnectionState::Unconnected),
            frame_id: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            connect_time: Mutex::new(None),
            errors: Mutex::new(Vec::new()),
            peer_closed: AtomicBool::new(false),
            sink: deps.sink.clone(),
        });

        Self {
            id,
            host: host.into(),
            deps,
            shared,
            cancel: parent.child_token(),
            transport: Mutex::new(None),
            receiver: Mutex::new(None),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn frame_id(&self) -> u64 {
        self.shared.frame_id.load(Ordering::SeqCst)
    }

    pub fn probe(&self) -> ConnectionProbe {
        ConnectionProbe {
            shared: self.shared.clone(),
        }
    }

    pub fn snapshot(&self) -> ConnectionMetrics {
        self.shared.snapshot()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.transport).clone()
    }

    /// One handshake attempt: `Unconnected` to `Ready`, or `Error`
    pub async fn connect(&self) -> bool {
        if !self.shared.transition(ConnectionState::Connecting) {
            process_warn!(
                ProcessId::current(),
                connection_id = %self.id,
                "connect ignored in state {}",
                self.state()
            );
            return false;
        }

        let clock = self.deps.clock.clone();
        let started = clock.now();
        let timeout = self.deps.settings.connection_timeout();

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HandshakeError::Cancelled),
            result = self.handshake() => result,
            _ = clock.sleep(timeout) => Err(HandshakeError::Timeout {
                phase: self.state().to_string(),
            }),
        };

        match result {
            Ok(()) => {
                let connect_time = clock.now().saturating_duration_since(started).as_secs_f64();
                *lock(&self.shared.connect_time) = Some(connect_time);
                self.shared.transition(ConnectionState::Ready);

                process_debug!(
                    ProcessId::current(),
                    connection_id = %self.id,
                    "✅ connected in {:.3}s",
                    connect_time
                );
                self.deps.sink.emit(ConnectionEvent::Connected {
                    connection_id: self.id,
                    connect_time,
                });
                true
            }
            Err(e) => {
                self.shared.record_error(ErrorPhase::Connect, e.to_string());
                self.release_transport().await;
                self.shared.transition(ConnectionState::Error);
                false
            }
        }
    }

    async fn handshake(&self) -> Result<(), HandshakeError> {
        let settings = &self.deps.settings;

        let connect_url = settings.connect_url(&self.host);
        process_debug!(ProcessId::current(), connection_id = %self.id, "POST {}", connect_url);
        let ws_url = self
            .deps
            .bootstrapper
            .bootstrap(&connect_url, &settings.rtvi_client_version)
            .await?;

        process_debug!(ProcessId::current(), connection_id = %self.id, "opening transport {}", ws_url);
        let options = TransportOptions::from_settings(settings);
        let transport: Arc<dyn Transport> = Arc::from(self.deps.connector.open(&ws_url, &options).await?);
        *lock(&self.transport) = Some(transport.clone());
        self.shared.transition(ConnectionState::WebSocketOpen);

        // The remote pipeline gives no signal; wait a fixed delay before client-ready
        self.shared.transition(ConnectionState::AwaitingPipelineReady);
        self.deps.clock.sleep(settings.pipeline_init_delay()).await;

        let client_ready =
            RtviEnvelope::client_ready(&settings.rtvi_client_version, &ClientAbout::default()).into_frame();
        transport
            .send(WireMessage::Binary(client_ready.encode()))
            .await
            .map_err(|e| HandshakeError::Transport { message: e.to_string() })?;
        self.shared.frame_id.fetch_add(1, Ordering::SeqCst);
        self.shared.transition(ConnectionState::ClientReadySent);

        loop {
            let bytes = match transport.recv().await {
                None => return Err(HandshakeError::TransportClosed),
                Some(Err(e)) => return Err(HandshakeError::Transport { message: e.to_string() }),
                Some(Ok(WireMessage::Binary(bytes))) => bytes,
                Some(Ok(WireMessage::Text(_))) => continue,
            };

            let Ok(Decoded::Frame(Frame::Message(message))) = decode_frame(&bytes) else {
                continue;
            };
            let Ok(envelope) = RtviEnvelope::parse(&message.data) else {
                continue;
            };

            if envelope.is_bot_ready() {
                return Ok(());
            }
            if envelope.is_error() {
                return Err(HandshakeError::BotError {
                    message: envelope.error_message(),
                });
            }
        }
    }

    /// Return a failed connection to `Unconnected` for another attempt.
    /// Counters and `frame_id` are kept.
    pub fn reset(&self) -> bool {
        if self.shared.transition(ConnectionState::Unconnected) {
            self.shared.peer_closed.store(false, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Enter `Streaming` and start the receive loop. Idempotent while streaming.
    pub fn start_streaming(&self, observer: Option<Arc<dyn InboundObserver>>) -> bool {
        match self.state() {
            ConnectionState::Streaming => return true,
            ConnectionState::Ready => {}
            _ => return false,
        }
        let Some(transport) = self.current_transport() else {
            return false;
        };
        if !self.shared.transition(ConnectionState::Streaming) {
            return false;
        }

        let token = self.cancel.child_token();
        let handle = tokio::spawn(receive_loop(self.shared.clone(), transport, observer, token.clone()));
        *lock(&self.receiver) = Some(ReceiveTask { token, handle });
        true
    }

    async fn send_frame(&self, phase: ErrorPhase, build: impl FnOnce(u64) -> Frame) -> Option<u64> {
        let state = self.state();
        if !state.is_ready() {
            if phase == ErrorPhase::SendText {
                self.shared
                    .record_error(phase, format!("connection not ready (state {state})"));
            }
            return None;
        }
        let transport = self.current_transport()?;

        // Reserve the id and send under one lock so ids leave in order
        let _guard = self.send_lock.lock().await;
        let id = self.shared.frame_id.fetch_add(1, Ordering::SeqCst);
        let bytes = build(id).encode();
        let size = bytes.len() as u64;

        match transport.send(WireMessage::Binary(bytes)).await {
            Ok(()) => {
                self.shared.frames_sent.fetch_add(1, Ordering::SeqCst);
                self.shared.bytes_sent.fetch_add(size, Ordering::SeqCst);
                Some(id)
            }
            Err(e) => {
                self.shared.record_error(phase, e.to_string());
                self.shared.transition(ConnectionState::Error);
                None
            }
        }
    }

    /// Send one audio frame carrying `chunk`; returns the frame id it used
    pub async fn send_audio_frame(&self, chunk: Vec<u8>) -> Option<u64> {
        let sample_rate = self.deps.settings.sample_rate;
        let channels = self.deps.settings.channels;
        self.send_frame(ErrorPhase::SendAudio, |id| Frame::audio(id, chunk, sample_rate, channels))
            .await
    }

    /// Send a send-text envelope and return the frame id it used.
    ///
    /// Records an error unless `Ready`/`Streaming`.
    pub async fn send_text(&self, text: &str) -> Option<u64> {
        self.send_frame(ErrorPhase::SendText, |_| RtviEnvelope::send_text(text).into_frame())
            .await
    }

    /// Stream chunks from `source` paced at the chunk interval.
    ///
    /// With a duration the source loops until the duration elapses; without
    /// one, streaming stops when the source is exhausted.
    pub async fn stream_audio(&self, source: &mut dyn AudioSource, duration: Option<Duration>) -> StreamOutcome {
        if !self.start_streaming(None) {
            return StreamOutcome::NotReady;
        }

        let clock = self.deps.clock.clone();
        let interval = self.deps.settings.chunk_interval();
        let started = clock.now();
        let mut sent_since_restart = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return StreamOutcome::Cancelled;
            }
            if let Some(limit) = duration {
                if clock.now().saturating_duration_since(started) >= limit {
                    return StreamOutcome::DurationElapsed;
                }
            }
            if self.shared.peer_closed.load(Ordering::SeqCst) {
                return StreamOutcome::PeerClosed;
            }

            let chunk = match source.next_chunk() {
                Some(chunk) => chunk,
                // An empty source would spin forever if restarted
                None if duration.is_some() && sent_since_restart > 0 => {
                    source.restart();
                    sent_since_restart = 0;
                    continue;
                }
                None => return StreamOutcome::Exhausted,
            };

            if self.send_audio_frame(chunk).await.is_none() {
                return StreamOutcome::SendFailed;
            }
            sent_since_restart += 1;

            tokio::select! {
                _ = self.cancel.cancelled() => return StreamOutcome::Cancelled,
                _ = clock.sleep(interval) => {}
            }
        }
    }

    /// Cancel everything this connection runs
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Tear down within the disconnect timeout. Idempotent; errors are swallowed.
    pub async fn disconnect(&self) {
        if !self.shared.transition(ConnectionState::Disconnecting) {
            return;
        }
        let timeout = self.deps.settings.disconnect_timeout();

        let receiver = lock(&self.receiver).take();
        if let Some(task) = receiver {
            task.token.cancel();
            let mut handle = task.handle;
            if within(self.deps.clock.as_ref(), timeout, &mut handle).await.is_none() {
                handle.abort();
            }
        }

        self.release_transport().await;
        self.shared.transition(ConnectionState::Closed);
        process_debug!(ProcessId::current(), connection_id = %self.id, "disconnected");
    }

    async fn release_transport(&self) {
        let transport = lock(&self.transport).take();
        if let Some(transport) = transport {
            let timeout = self.deps.settings.disconnect_timeout();
            if let Some(Err(e)) = within(self.deps.clock.as_ref(), timeout, transport.close()).await {
                process_debug!(ProcessId::current(), connection_id = %self.id, "close failed: {}", e);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Stop the receive task if the owner never disconnected
        self.cancel.cancel();
    }
}

/// Run `fut` until it finishes or `limit` elapses on `clock`
async fn within<F: Future>(clock: &dyn Clock, limit: Duration, fut: F) -> Option<F::Output> {
    tokio::select! {
        output = fut => Some(output),
        _ = clock.sleep(limit) => None,
    }
}

async fn receive_loop(
    shared: Arc<ConnectionShared>,
    transport: Arc<dyn Transport>,
    observer: Option<Arc<dyn InboundObserver>>,
    token: CancellationToken,
) {
    let id = shared.id;
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = transport.recv() => next,
        };

        let inbound = match next {
            None => {
                shared.peer_closed.store(true, Ordering::SeqCst);
                process_debug!(ProcessId::current(), connection_id = %id, "transport closed by peer");
                break;
            }
            Some(Err(e)) => {
                shared.record_error(ErrorPhase::Receive, e.to_string());
                shared.peer_closed.store(true, Ordering::SeqCst);
                break;
            }
            Some(Ok(WireMessage::Binary(bytes))) => match decode_frame(&bytes) {
                Ok(Decoded::Frame(frame)) => {
                    shared.frames_received.fetch_add(1, Ordering::SeqCst);
                    emit_frame_event(&shared, &frame);
                    Inbound::Frame(frame)
                }
                Ok(Decoded::Unrecognized(raw)) => {
                    shared.frames_received.fetch_add(1, Ordering::SeqCst);
                    Inbound::Unrecognized(raw)
                }
                Err(e) => {
                    shared.record_error(ErrorPhase::Decode, e.to_string());
                    continue;
                }
            },
            Some(Ok(WireMessage::Text(text))) => match serde_json::from_str(&text) {
                Ok(value) => Inbound::Json(value),
                Err(_) => Inbound::InvalidText(text),
            },
        };

        if let Some(observer) = &observer {
            observer.observe(id, &inbound);
        }
    }
}

fn emit_frame_event(shared: &ConnectionShared, frame: &Frame) {
    let connection_id = shared.id;
    let event = match frame {
        Frame::Transcription(t) => ConnectionEvent::Transcription {
            connection_id,
            text: t.text.clone(),
        },
        Frame::Audio(a) => ConnectionEvent::BotAudio {
            connection_id,
            size: a.audio.len(),
        },
        Frame::Message(m) => match RtviEnvelope::parse(&m.data) {
            Ok(envelope) => ConnectionEvent::RtviMessage {
                connection_id,
                message_type: envelope.message_type,
            },
            Err(_) => return,
        },
        Frame::Text(_) => return,
    };
    shared.sink.emit(event);
}
