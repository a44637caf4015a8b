//! Load orchestrator
//!
//! Realizes a [`LoadPattern`] as concurrent connection lifecycles. Each
//! lifecycle runs in its own task, goes through the retry wrapper, streams,
//! disconnects, and is folded into the metrics collector exactly once by a
//! drop guard, so aborted tasks are still accounted for. No single
//! connection's fault escapes the orchestrator's wait.

use shared::{ConnectionId, ProcessId, Settings, TestReport, process_info, process_warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::connection::{Connection, ConnectionDeps, ConnectionProbe, StreamOutcome};
use crate::core::patterns::{LoadPattern, Progress};
use crate::core::retry::{RetryPolicy, connect_with_retry};
use crate::error::OrchestratorResult;
use crate::services::{
    LoopbackBot, MetricsCollector, RealBootstrapper, RealTransportConnector, TokioClock,
};
use crate::traits::{AudioSourceFactory, Bootstrapper, Clock, TransportConnector};

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

type Registry = Arc<Mutex<HashMap<ConnectionId, ConnectionProbe>>>;

/// I/O collaborators a run is built from
#[derive(Clone)]
pub struct Collaborators {
    pub bootstrapper: Arc<dyn Bootstrapper>,
    pub connector: Arc<dyn TransportConnector>,
    pub clock: Arc<dyn Clock>,
    pub audio: Arc<dyn AudioSourceFactory>,
}

impl Collaborators {
    /// reqwest bootstrap, websocket transport, tokio time
    pub fn real(settings: &Settings, audio: Arc<dyn AudioSourceFactory>) -> OrchestratorResult<Self> {
        Ok(Self {
            bootstrapper: Arc::new(RealBootstrapper::new(settings.connection_timeout())?),
            connector: Arc::new(RealTransportConnector::new()),
            clock: Arc::new(TokioClock),
            audio,
        })
    }

    /// Everything answered by an in-process bot
    pub fn loopback(bot: LoopbackBot, audio: Arc<dyn AudioSourceFactory>) -> Self {
        Self {
            bootstrapper: Arc::new(bot.clone()),
            connector: Arc::new(bot),
            clock: Arc::new(TokioClock),
            audio,
        }
    }
}

/// How each spawned connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Handshake succeeded and streaming ran to its end
    Completed,
    /// Handshake never succeeded
    Failed,
    /// Stopped by an abort before finishing
    Cancelled,
}

/// Per-run outcome counts; every spawned connection lands in exactly one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    fn tally(&mut self, result: Result<ConnectionOutcome, JoinError>) {
        match result {
            Ok(ConnectionOutcome::Completed) => self.completed += 1,
            Ok(ConnectionOutcome::Failed) => self.failed += 1,
            Ok(ConnectionOutcome::Cancelled) => self.cancelled += 1,
            Err(e) if e.is_cancelled() => self.cancelled += 1,
            Err(e) => {
                process_warn!(ProcessId::current(), "connection task panicked: {}", e);
                self.failed += 1;
            }
        }
    }
}

/// Shared by every lifecycle task of a run
struct RunContext {
    deps: ConnectionDeps,
    host: String,
    policy: RetryPolicy,
    audio: Arc<dyn AudioSourceFactory>,
    metrics: MetricsCollector,
    registry: Registry,
    abort: CancellationToken,
}

pub struct LoadOrchestrator {
    context: Arc<RunContext>,
    next_id: AtomicU64,
    progress: Option<ProgressCallback>,
}

impl LoadOrchestrator {
    pub fn new(settings: Arc<Settings>, host: impl Into<String>, collaborators: Collaborators) -> Self {
        let metrics = MetricsCollector::start(collaborators.clock.clone());
        let deps = ConnectionDeps {
            settings: settings.clone(),
            bootstrapper: collaborators.bootstrapper,
            connector: collaborators.connector,
            clock: collaborators.clock,
            sink: Arc::new(metrics.clone()),
        };

        Self {
            context: Arc::new(RunContext {
                deps,
                host: host.into(),
                policy: RetryPolicy::from_settings(&settings),
                audio: collaborators.audio,
                metrics,
                registry: Arc::new(Mutex::new(HashMap::new())),
                abort: CancellationToken::new(),
            }),
            next_id: AtomicU64::new(0),
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Cancelling this token aborts the current run; the report is still produced
    pub fn abort_token(&self) -> CancellationToken {
        self.context.abort.clone()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.context.metrics
    }

    /// Connections spawned and not yet finalized
    pub fn active_connections(&self) -> usize {
        self.context.registry.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Probes of the active connections, ordered by id
    pub fn active_probes(&self) -> Vec<ConnectionProbe> {
        let registry = self.context.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let mut probes: Vec<ConnectionProbe> = registry.values().cloned().collect();
        probes.sort_by_key(|p| p.id());
        probes
    }

    fn report_progress(&self, progress: Progress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    fn settings(&self) -> &Settings {
        &self.context.deps.settings
    }

    fn clock(&self) -> &dyn Clock {
        self.context.deps.clock.as_ref()
    }

    /// Run `pattern` to completion and freeze the collector's end time
    pub async fn run(&self, pattern: &LoadPattern) -> OrchestratorResult<RunSummary> {
        pattern.validate(self.settings().max_connections)?;
        process_info!(ProcessId::current(), "🚀 Starting {} load against {}", pattern.name(), self.context.host);

        let summary = match pattern {
            LoadPattern::Sustained { connections, duration } => self.sustained(*connections, *duration).await,
            LoadPattern::Spike { connections, duration } => {
                process_info!(ProcessId::current(), "⚡ Spike: {} connections at once", connections);
                self.sustained(*connections, *duration).await
            }
            LoadPattern::Ramp {
                interval,
                batch_duration,
                ..
            } => {
                self.ramp(&pattern.batch_sizes(), *interval, batch_duration.unwrap_or(*interval))
                    .await
            }
        };

        self.context.metrics.mark_complete();
        process_info!(
            ProcessId::current(),
            "✅ Run finished: {} completed, {} failed, {} cancelled",
            summary.completed,
            summary.failed,
            summary.cancelled
        );
        Ok(summary)
    }

    pub async fn run_sustained(&self, connections: usize, duration: Duration) -> OrchestratorResult<RunSummary> {
        self.run(&LoadPattern::Sustained { connections, duration }).await
    }

    pub async fn run_ramp(
        &self,
        start: usize,
        end: usize,
        step: usize,
        interval: Duration,
        batch_duration: Option<Duration>,
    ) -> OrchestratorResult<RunSummary> {
        self.run(&LoadPattern::Ramp {
            start,
            end,
            step,
            interval,
            batch_duration,
        })
        .await
    }

    pub async fn run_spike(&self, connections: usize, duration: Duration) -> OrchestratorResult<RunSummary> {
        self.run(&LoadPattern::Spike { connections, duration }).await
    }

    pub async fn report(&self) -> OrchestratorResult<TestReport> {
        self.context.metrics.generate_report().await
    }

    fn spawn_batch(
        &self,
        tasks: &mut JoinSet<ConnectionOutcome>,
        count: usize,
        stream_for: Duration,
        run_token: &CancellationToken,
    ) {
        for _ in 0..count {
            let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            tasks.spawn(lifecycle(self.context.clone(), id, stream_for, run_token.clone()));
        }
    }

    async fn sustained(&self, connections: usize, duration: Duration) -> RunSummary {
        let run_token = self.context.abort.child_token();
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();

        self.spawn_batch(&mut tasks, connections, duration, &run_token);

        let clock = self.clock();
        let started = clock.now();
        let tick = self.settings().progress_interval();

        while !tasks.is_empty() {
            let elapsed = clock.now().saturating_duration_since(started);
            if elapsed >= duration {
                break;
            }
            self.report_progress(Progress::Elapsed {
                elapsed,
                total: duration,
            });

            let wait = if tick.is_zero() { duration - elapsed } else { tick.min(duration - elapsed) };
            tokio::select! {
                _ = self.context.abort.cancelled() => break,
                Some(result) = tasks.join_next() => summary.tally(result),
                _ = clock.sleep(wait) => {}
            }
        }
        self.report_progress(Progress::Elapsed {
            elapsed: clock.now().saturating_duration_since(started).min(duration),
            total: duration,
        });

        run_token.cancel();
        self.drain(tasks, &mut summary).await;
        summary
    }

    async fn ramp(&self, batches: &[usize], interval: Duration, stream_for: Duration) -> RunSummary {
        let run_token = self.context.abort.child_token();
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();
        let total = batches.len();

        for (index, &size) in batches.iter().enumerate() {
            if self.context.abort.is_cancelled() {
                break;
            }
            self.report_progress(Progress::Step {
                current: index + 1,
                total,
            });
            process_info!(ProcessId::current(), "📈 Step {}/{}: spawning {} connections", index + 1, total, size);
            self.spawn_batch(&mut tasks, size, stream_for, &run_token);

            if index + 1 < total {
                tokio::select! {
                    _ = self.context.abort.cancelled() => break,
                    _ = self.clock().sleep(interval) => {}
                }
            }
        }

        process_info!(ProcessId::current(), "⏳ Waiting for {} connections to complete", tasks.len());
        loop {
            tokio::select! {
                biased;
                _ = self.context.abort.cancelled() => break,
                result = tasks.join_next() => match result {
                    Some(result) => summary.tally(result),
                    None => break,
                },
            }
        }

        run_token.cancel();
        self.drain(tasks, &mut summary).await;
        summary
    }

    /// Wait up to the shutdown grace for cancelled tasks, then abort the rest
    async fn drain(&self, mut tasks: JoinSet<ConnectionOutcome>, summary: &mut RunSummary) {
        if tasks.is_empty() {
            return;
        }
        let grace = self.settings().shutdown_grace();

        let drained = {
            let wait_all = async {
                while let Some(result) = tasks.join_next().await {
                    summary.tally(result);
                }
            };
            tokio::select! {
                _ = wait_all => true,
                _ = self.clock().sleep(grace) => false,
            }
        };

        if !drained {
            process_warn!(
                ProcessId::current(),
                "⚠️ {} connections still running after {:.1}s grace, aborting",
                tasks.len(),
                grace.as_secs_f64()
            );
            tasks.abort_all();
            while let Some(result) = tasks.join_next().await {
                summary.tally(result);
            }
        }
    }
}

/// Folds the connection into the collector when the lifecycle ends, however it ends
struct FinalizeGuard {
    probe: ConnectionProbe,
    metrics: MetricsCollector,
    registry: Registry,
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.probe.id());
        self.metrics.update_from_connection(self.probe.snapshot());
    }
}

async fn lifecycle(
    context: Arc<RunContext>,
    id: ConnectionId,
    stream_for: Duration,
    run_token: CancellationToken,
) -> ConnectionOutcome {
    let connection = Connection::with_cancellation(id, context.host.clone(), context.deps.clone(), &run_token);
    let probe = connection.probe();

    context
        .registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, probe.clone());
    context.metrics.connection_attempted();
    let _finalize = FinalizeGuard {
        probe,
        metrics: context.metrics.clone(),
        registry: context.registry.clone(),
    };

    if !connect_with_retry(&connection, &context.policy, context.deps.clock.as_ref()).await {
        connection.disconnect().await;
        return if context.abort.is_cancelled() {
            ConnectionOutcome::Cancelled
        } else {
            ConnectionOutcome::Failed
        };
    }

    let mut source = context.audio.open();
    let outcome = connection.stream_audio(source.as_mut(), Some(stream_for)).await;
    connection.disconnect().await;

    match outcome {
        StreamOutcome::Cancelled if context.abort.is_cancelled() => ConnectionOutcome::Cancelled,
        _ => ConnectionOutcome::Completed,
    }
}
