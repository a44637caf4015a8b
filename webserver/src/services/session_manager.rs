//! Session registry for the testing API
//!
//! Creates sessions against the configured bot, looks them up by id, closes
//! them, and sweeps the ones that have gone idle.

use orchestrator::services::{RealBootstrapper, RealTransportConnector, TokioClock};
use orchestrator::traits::{Bootstrapper, EventSink, TransportConnector};
use orchestrator::{ConnectionDeps, LoopbackBot};
use shared::{ConnectionEvent, ConnectionId, ProcessId, Settings, process_debug, process_info, process_warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::session::Session;
use crate::error::{WebServerError, WebServerResult};
use crate::types::{FinalMetrics, SessionId, SessionInfo};

/// Writes connection events to the log; sessions keep no aggregate metrics
struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: ConnectionEvent) {
        process_debug!(
            ProcessId::current(),
            connection_id = %event.connection_id(),
            "event {}",
            event.name()
        );
    }
}

pub struct SessionManager {
    settings: Arc<Settings>,
    bootstrapper: Arc<dyn Bootstrapper>,
    connector: Arc<dyn TransportConnector>,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    // Guards the capacity check and slot reservation, never a handshake
    create_lock: Mutex<()>,
    // Sessions still handshaking; they count against `max_sessions`
    pending: Arc<AtomicUsize>,
    next_connection_id: AtomicU64,
}

/// A reserved session slot, released on drop
struct PendingSlot(Arc<AtomicUsize>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionManager {
    pub fn new(
        settings: Arc<Settings>,
        bootstrapper: Arc<dyn Bootstrapper>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        Self {
            settings,
            bootstrapper,
            connector,
            sessions: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
            pending: Arc::new(AtomicUsize::new(0)),
            next_connection_id: AtomicU64::new(0),
        }
    }

    /// reqwest bootstrap and websocket transport
    pub fn real(settings: Arc<Settings>) -> WebServerResult<Self> {
        let bootstrapper = RealBootstrapper::new(settings.connection_timeout())?;
        Ok(Self::new(
            settings,
            Arc::new(bootstrapper),
            Arc::new(RealTransportConnector::new()),
        ))
    }

    /// Sessions answered by an in-process bot
    pub fn loopback(settings: Arc<Settings>, bot: LoopbackBot) -> Self {
        Self::new(settings, Arc::new(bot.clone()), Arc::new(bot))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn deps(&self) -> ConnectionDeps {
        ConnectionDeps {
            settings: self.settings.clone(),
            bootstrapper: self.bootstrapper.clone(),
            connector: self.connector.clone(),
            clock: Arc::new(TokioClock),
            sink: Arc::new(LogSink),
        }
    }

    async fn reserve_slot(&self) -> WebServerResult<PendingSlot> {
        let _guard = self.create_lock.lock().await;

        let max = self.settings.max_sessions;
        let pending = self.pending.load(Ordering::SeqCst);
        if self.sessions.read().await.len() + pending >= max {
            process_warn!(ProcessId::current(), "session limit of {} reached", max);
            return Err(WebServerError::CapacityExceeded { max });
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        Ok(PendingSlot(self.pending.clone()))
    }

    /// Connect a new session to `bot_host`, or the configured host
    ///
    /// Handshakes run concurrently; a slot is held for each one in flight.
    pub async fn create_session(&self, bot_host: Option<String>) -> WebServerResult<Arc<Session>> {
        let slot = self.reserve_slot().await?;

        let host = bot_host
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| self.settings.host.clone());
        let connection_id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::SeqCst));
        let session = Arc::new(Session::new(SessionId::new(), connection_id, host, self.deps()));

        session.open().await?;
        self.sessions
            .write()
            .await
            .insert(session.id().clone(), session.clone());
        drop(slot);
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> WebServerResult<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(&SessionId(id.to_string()))
            .cloned()
            .ok_or_else(|| WebServerError::not_found(id))
    }

    /// Remove and disconnect a session
    pub async fn close(&self, id: &str) -> WebServerResult<FinalMetrics> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&SessionId(id.to_string()))
            .ok_or_else(|| WebServerError::not_found(id))?;
        let metrics = session.close().await;
        process_info!(ProcessId::current(), session_id = %id, "🔚 session closed");
        Ok(metrics)
    }

    /// Sessions in creation order
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.connection_id());
        sessions.iter().map(|s| s.info()).collect()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Handshakes still in flight
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Close every session idle for longer than `timeout`
    pub async fn cleanup_inactive(&self, timeout: Duration) -> Vec<SessionId> {
        let stale: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.is_idle(timeout))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let mut removed = Vec::with_capacity(stale.len());
        for session in stale {
            session.close().await;
            process_info!(
                ProcessId::current(),
                session_id = %session.id(),
                "🧹 closed idle session after {:.0}s",
                session.idle_for().as_secs_f64()
            );
            removed.push(session.id().clone());
        }
        removed
    }

    /// Close everything, used on shutdown
    pub async fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.close().await;
        }
        sessions.len()
    }

    /// Sweep idle sessions every `interval` until `shutdown` fires
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        let timeout = manager.settings.session_timeout();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let removed = manager.cleanup_inactive(timeout).await;
                if !removed.is_empty() {
                    process_debug!(ProcessId::current(), "swept {} idle sessions", removed.len());
                }
            }
        })
    }
}
