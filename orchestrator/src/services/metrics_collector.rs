//! Metrics collector service
//!
//! A single task owns the [`MetricsState`]; connections and the orchestrator
//! talk to it by message passing through a cloneable handle.

use shared::{ConnectionEvent, ConnectionMetrics, ProcessId, RecordedEvent, TestReport, process_debug};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::core::metrics::{LiveCounters, MetricsState};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{Clock, EventSink};

enum Command {
    Attempted,
    Event { at: Instant, event: ConnectionEvent },
    Fold(ConnectionMetrics),
    MarkComplete { at: Instant },
    Report(oneshot::Sender<TestReport>),
    Live(oneshot::Sender<LiveCounters>),
    Events(oneshot::Sender<Vec<RecordedEvent>>),
}

/// Handle to the collector task
#[derive(Clone)]
pub struct MetricsCollector {
    tx: mpsc::UnboundedSender<Command>,
    clock: Arc<dyn Clock>,
}

impl MetricsCollector {
    /// Spawn the collector; elapsed time is measured from now
    pub fn start(clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let started = clock.now();
        tokio::spawn(run(rx, clock.clone(), started));
        Self { tx, clock }
    }

    fn send(&self, command: Command) {
        // The task lives as long as any handle does
        let _ = self.tx.send(command);
    }

    pub fn connection_attempted(&self) {
        self.send(Command::Attempted);
    }

    pub fn record_event(&self, event: ConnectionEvent) {
        self.send(Command::Event {
            at: self.clock.now(),
            event,
        });
    }

    /// Fold a finished connection's snapshot; call exactly once per connection
    pub fn update_from_connection(&self, snapshot: ConnectionMetrics) {
        self.send(Command::Fold(snapshot));
    }

    /// Freeze the report end time; later reports use it instead of now
    pub fn mark_complete(&self) {
        self.send(Command::MarkComplete { at: self.clock.now() });
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> OrchestratorResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply));
        rx.await
            .map_err(|_| OrchestratorError::stream("metrics collector stopped"))
    }

    pub async fn generate_report(&self) -> OrchestratorResult<TestReport> {
        self.ask(Command::Report).await
    }

    pub async fn live(&self) -> OrchestratorResult<LiveCounters> {
        self.ask(Command::Live).await
    }

    pub async fn events(&self) -> OrchestratorResult<Vec<RecordedEvent>> {
        self.ask(Command::Events).await
    }
}

impl EventSink for MetricsCollector {
    fn emit(&self, event: ConnectionEvent) {
        self.record_event(event);
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>, clock: Arc<dyn Clock>, started: Instant) {
    let mut state = MetricsState::new();
    let mut completed_at: Option<Instant> = None;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Attempted => state.connection_attempted(),
            Command::Event { at, event } => {
                process_debug!(
                    ProcessId::current(),
                    connection_id = %event.connection_id(),
                    "event {}",
                    event.name()
                );
                let timestamp = at.saturating_duration_since(started).as_secs_f64();
                state.record_event(timestamp, event);
            }
            Command::Fold(snapshot) => state.update_from_connection(snapshot),
            Command::MarkComplete { at } => {
                completed_at.get_or_insert(at);
            }
            Command::Report(reply) => {
                let end = completed_at.unwrap_or_else(|| clock.now());
                let _ = reply.send(state.report(end.saturating_duration_since(started)));
            }
            Command::Live(reply) => {
                let _ = reply.send(state.live());
            }
            Command::Events(reply) => {
                let _ = reply.send(state.events().to_vec());
            }
        }
    }
}
