//! One interactive testing session wrapping an orchestrator connection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator::error::HandshakeError;
use orchestrator::traits::{Bootstrapper, Inbound, InboundObserver};
use orchestrator::{AudioClip, Connection, ConnectionDeps, ConnectionState};
use shared::{ConnectionId, ProcessId, process_debug, process_info, unix_time_secs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::message_buffer::MessageBuffer;
use crate::error::{WebServerError, WebServerResult};
use crate::types::{
    AudioSendResponse, FinalMetrics, MessageRecord, MessagesResponse, SessionId, SessionInfo, SessionStatusResponse,
};

/// Messages returned by a query without an explicit limit
pub const DEFAULT_QUERY_LIMIT: usize = 100;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remembers the transport URL handed out by the wrapped bootstrapper
struct UrlRecorder {
    inner: Arc<dyn Bootstrapper>,
    ws_url: Mutex<Option<String>>,
}

#[async_trait]
impl Bootstrapper for UrlRecorder {
    async fn bootstrap(&self, connect_url: &str, client_version: &str) -> Result<String, HandshakeError> {
        let ws_url = self.inner.bootstrap(connect_url, client_version).await?;
        *lock(&self.ws_url) = Some(ws_url.clone());
        Ok(ws_url)
    }
}

#[derive(Debug, Clone, Copy)]
struct Activity {
    at: Instant,
    wall: DateTime<Utc>,
}

impl Activity {
    fn now() -> Self {
        Self {
            at: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Shared between the session and its receive-loop observer
struct SessionLog {
    buffer: Mutex<MessageBuffer>,
    activity: Mutex<Activity>,
}

impl SessionLog {
    fn touch(&self) {
        *lock(&self.activity) = Activity::now();
    }
}

impl InboundObserver for SessionLog {
    fn observe(&self, _connection_id: ConnectionId, inbound: &Inbound) {
        let record = MessageRecord::from_inbound(inbound, unix_time_secs());
        lock(&self.buffer).push(record);
        self.touch();
    }
}

pub struct Session {
    id: SessionId,
    bot_host: String,
    connection: Connection,
    created_at: DateTime<Utc>,
    started: Instant,
    log: Arc<SessionLog>,
    recorder: Arc<UrlRecorder>,
    sample_rate: u32,
    chunk_duration_ms: u64,
    send_lock: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(id: SessionId, connection_id: ConnectionId, bot_host: impl Into<String>, deps: ConnectionDeps) -> Self {
        let recorder = Arc::new(UrlRecorder {
            inner: deps.bootstrapper.clone(),
            ws_url: Mutex::new(None),
        });
        let sample_rate = deps.settings.sample_rate;
        let chunk_duration_ms = deps.settings.chunk_duration_ms;
        let deps = ConnectionDeps {
            bootstrapper: recorder.clone(),
            ..deps
        };
        let bot_host = bot_host.into();

        Self {
            id,
            connection: Connection::new(connection_id, bot_host.clone(), deps),
            bot_host,
            created_at: Utc::now(),
            started: Instant::now(),
            log: Arc::new(SessionLog {
                buffer: Mutex::new(MessageBuffer::default()),
                activity: Mutex::new(Activity::now()),
            }),
            recorder,
            sample_rate,
            chunk_duration_ms,
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run the handshake once and start buffering inbound messages
    pub async fn open(&self) -> WebServerResult<()> {
        if !self.connection.connect().await {
            let message = self
                .connection
                .snapshot()
                .errors
                .last()
                .map(|e| e.error.clone())
                .unwrap_or_else(|| "handshake failed".to_string());
            self.connection.disconnect().await;
            return Err(WebServerError::ConnectFailed { message });
        }

        self.connection.start_streaming(Some(self.log.clone()));
        self.log.touch();
        process_info!(
            ProcessId::current(),
            session_id = %self.id,
            "🔗 session connected to {}",
            self.bot_host
        );
        Ok(())
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn bot_host(&self) -> &str {
        &self.bot_host
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ws_url(&self) -> String {
        lock(&self.recorder.ws_url).clone().unwrap_or_default()
    }

    /// Public status label derived from the connection state
    pub fn status(&self) -> &'static str {
        let probe = self.connection.probe();
        match probe.state() {
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
            state if state.is_ready() && probe.is_peer_closed() => "disconnected",
            state if state.is_ready() => "connected",
            ConnectionState::Disconnecting => "closing",
            _ => "connecting",
        }
    }

    fn require_connected(&self) -> WebServerResult<()> {
        match self.status() {
            "connected" => Ok(()),
            status => Err(WebServerError::NotConnected {
                session_id: self.id.to_string(),
                status: status.to_string(),
            }),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time since the last send or inbound message
    pub fn idle_for(&self) -> Duration {
        lock(&self.log.activity).at.elapsed()
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    /// Send a text message; returns the id of the frame that carried it
    pub async fn send_text(&self, text: &str) -> WebServerResult<u64> {
        self.require_connected()?;
        let _guard = self.send_lock.lock().await;
        let frame_id = self
            .connection
            .send_text(text)
            .await
            .ok_or_else(|| WebServerError::SendFailed {
                message: format!("text send failed on session {}", self.id),
            })?;
        self.log.touch();
        Ok(frame_id)
    }

    /// Stream an uploaded clip paced at the chunk interval
    pub async fn send_audio(&self, bytes: &[u8]) -> WebServerResult<AudioSendResponse> {
        self.require_connected()?;
        let clip = AudioClip::from_upload(bytes, self.sample_rate, self.chunk_duration_ms)?;

        let _guard = self.send_lock.lock().await;
        let before = self.connection.snapshot();
        let mut cursor = clip.cursor();
        let outcome = self.connection.stream_audio(&mut cursor, None).await;
        let after = self.connection.snapshot();
        self.log.touch();

        let frames_sent = after.frames_sent - before.frames_sent;
        process_debug!(
            ProcessId::current(),
            session_id = %self.id,
            "audio upload sent {} frames ({:?})",
            frames_sent,
            outcome
        );
        Ok(AudioSendResponse {
            frames_sent,
            duration_ms: frames_sent * clip.chunk_duration_ms(),
            bytes_sent: after.bytes_sent - before.bytes_sent,
        })
    }

    pub fn messages(&self, limit: Option<usize>, since: Option<f64>) -> MessagesResponse {
        let buffer = lock(&self.log.buffer);
        MessagesResponse {
            session_id: self.id.clone(),
            messages: buffer.query(limit.unwrap_or(DEFAULT_QUERY_LIMIT), since),
            total_messages: buffer.len(),
        }
    }

    pub fn status_report(&self) -> SessionStatusResponse {
        let snapshot = self.connection.snapshot();
        SessionStatusResponse {
            session_id: self.id.clone(),
            status: self.status().to_string(),
            uptime_seconds: self.uptime().as_secs_f64(),
            frames_sent: snapshot.frames_sent,
            frames_received: snapshot.frames_received,
            bytes_sent: snapshot.bytes_sent,
            last_activity: lock(&self.log.activity).wall,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            status: self.status().to_string(),
            created_at: self.created_at,
            uptime_seconds: self.uptime().as_secs_f64(),
        }
    }

    /// Disconnect and report lifetime totals. Safe to call more than once.
    pub async fn close(&self) -> FinalMetrics {
        self.connection.disconnect().await;
        let snapshot = self.connection.snapshot();
        FinalMetrics {
            total_frames_sent: snapshot.frames_sent,
            total_frames_received: snapshot.frames_received,
            total_errors: snapshot.errors.len(),
            duration_seconds: self.uptime().as_secs_f64(),
        }
    }
}
