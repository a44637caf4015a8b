//! Load orchestrator tests: patterns, accounting and cancellation

mod common;

use common::{TestFixtures, TestHelpers};
use orchestrator::{LoadPattern, LoopbackBot, LoopbackScript, OrchestratorError, Progress};
use shared::Settings;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn progress_log() -> (Arc<Mutex<Vec<Progress>>>, orchestrator::ProgressCallback) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    (log, Arc::new(move |p: Progress| sink.lock().unwrap().push(p)))
}

/// Test every sustained connection is attempted, connected and folded once
#[tokio::test(start_paused = true)]
async fn test_sustained_accounts_for_every_connection() {
    // Arrange
    let bot = LoopbackBot::new(LoopbackScript {
        transcription_every: 10,
        ..LoopbackScript::default()
    });
    let (progress, callback) = progress_log();
    let orchestrator = TestHelpers::loopback_orchestrator(TestFixtures::fast_settings(), &bot).with_progress(callback);

    // Act
    let summary = orchestrator.run_sustained(5, Duration::from_secs(2)).await.unwrap();
    let report = orchestrator.report().await.unwrap();

    // Assert
    assert_eq!(summary.total(), 5);
    assert_eq!(summary.completed, 5);
    assert_eq!(orchestrator.active_connections(), 0);

    assert_eq!(report.summary.total_connections_attempted, 5);
    assert_eq!(report.summary.total_connections_successful, 5);
    assert_eq!(report.summary.success_rate, 1.0);
    assert_eq!(report.connections.len(), 5);
    assert!(report.summary.total_frames_sent > 0);
    assert!(report.summary.total_frames_received > 0);
    assert!(report.summary.duration_seconds >= 2.0);
    assert!(report.connections.iter().all(|c| c.connect_time.is_some()));

    let live = orchestrator.metrics().live().await.unwrap();
    assert_eq!(live.finalized, 5);

    let progress = progress.lock().unwrap();
    assert!(!progress.is_empty());
    assert_eq!(
        progress.last(),
        Some(&Progress::Elapsed {
            elapsed: Duration::from_secs(2),
            total: Duration::from_secs(2),
        })
    );
}

/// Test the report is stable after the run completes
#[tokio::test(start_paused = true)]
async fn test_report_is_frozen_after_run() {
    let bot = LoopbackBot::default();
    let orchestrator = TestHelpers::loopback_orchestrator(TestFixtures::fast_settings(), &bot);
    orchestrator.run_sustained(2, Duration::from_secs(1)).await.unwrap();

    let first = orchestrator.report().await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    let second = orchestrator.report().await.unwrap();

    assert_eq!(first, second);
}

/// Test a ramp spawns each batch in turn, `interval` apart
#[tokio::test(start_paused = true)]
async fn test_ramp_spawns_every_batch() {
    let bot = LoopbackBot::default();
    let (progress, callback) = progress_log();
    let orchestrator = TestHelpers::loopback_orchestrator(TestFixtures::fast_settings(), &bot).with_progress(callback);

    let started = Instant::now();
    let summary = orchestrator
        .run_ramp(10, 30, 10, Duration::from_secs(5), None)
        .await
        .unwrap();
    let report = orchestrator.report().await.unwrap();

    assert_eq!(summary.total(), 60);
    assert_eq!(summary.completed, 60);
    assert_eq!(report.summary.total_connections_attempted, 60);
    assert_eq!(report.summary.total_connections_successful, 60);
    assert_eq!(bot.bootstrap_calls(), 60);

    // Bootstraps land in groups of 10, 20 and 30, five seconds apart
    let offsets: Vec<Duration> = bot.bootstrap_times().iter().map(|t| *t - started).collect();
    let tolerance = Duration::from_millis(100);
    for (batch, range) in [(0u32, 0..10), (1, 10..30), (2, 30..60)] {
        let scheduled = Duration::from_secs(5) * batch;
        for offset in &offsets[range] {
            assert!(
                *offset >= scheduled && *offset < scheduled + tolerance,
                "batch {batch} bootstrapped at {offset:?}"
            );
        }
    }

    // Two inter-batch waits, then the last batch streams for the interval
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert_eq!(
        *progress.lock().unwrap(),
        vec![
            Progress::Step { current: 1, total: 3 },
            Progress::Step { current: 2, total: 3 },
            Progress::Step { current: 3, total: 3 },
        ]
    );
}

/// Test a spike issues all connections at once
#[tokio::test(start_paused = true)]
async fn test_spike_runs_like_sustained() {
    let bot = LoopbackBot::default();
    let orchestrator = TestHelpers::loopback_orchestrator(TestFixtures::fast_settings(), &bot);

    let summary = orchestrator
        .run(&LoadPattern::Spike {
            connections: 8,
            duration: Duration::from_secs(1),
        })
        .await
        .unwrap();

    assert_eq!(summary.completed, 8);
    assert_eq!(bot.transports_opened(), 8);
}

/// Test capacity and shape checks reject a pattern before anything is spawned
#[tokio::test]
async fn test_invalid_patterns_are_rejected_up_front() {
    let bot = LoopbackBot::default();
    let settings = Settings {
        max_connections: 5,
        ..TestFixtures::fast_settings()
    };
    let orchestrator = TestHelpers::loopback_orchestrator(settings, &bot);

    let over = orchestrator.run_sustained(10, Duration::from_secs(1)).await;
    assert!(matches!(
        over,
        Err(OrchestratorError::CapacityExceeded { requested: 10, max: 5 })
    ));

    let batch_over = orchestrator.run_ramp(2, 6, 2, Duration::from_secs(1), None).await;
    assert!(matches!(batch_over, Err(OrchestratorError::CapacityExceeded { .. })));

    let zero_step = orchestrator.run_ramp(1, 3, 0, Duration::from_secs(1), None).await;
    assert!(matches!(zero_step, Err(OrchestratorError::InvalidPattern { .. })));

    let backwards = orchestrator.run_ramp(4, 2, 1, Duration::from_secs(1), None).await;
    assert!(matches!(backwards, Err(OrchestratorError::InvalidPattern { .. })));

    assert_eq!(bot.bootstrap_calls(), 0);
    assert_eq!(orchestrator.report().await.unwrap().summary.total_connections_attempted, 0);
}

/// Test failed handshakes are counted without stopping the run
#[tokio::test(start_paused = true)]
async fn test_failed_connections_are_reported() {
    let bot = LoopbackBot::new(LoopbackScript {
        bootstrap_failures: u32::MAX,
        ..LoopbackScript::default()
    });
    let orchestrator = TestHelpers::loopback_orchestrator(TestFixtures::no_retry_settings(), &bot);

    let summary = orchestrator.run_sustained(4, Duration::from_secs(2)).await.unwrap();
    let report = orchestrator.report().await.unwrap();

    assert_eq!(summary.failed, 4);
    assert_eq!(report.summary.total_connections_attempted, 4);
    assert_eq!(report.summary.total_connections_successful, 0);
    assert_eq!(report.summary.success_rate, 0.0);
    assert_eq!(report.summary.total_errors, 4);
    assert_eq!(report.summary.error_events, 4);
    assert_eq!(report.performance.avg_connect_time_ms, 0.0);
    assert_eq!(report.connections.len(), 4);
}

/// Test a mix of good and failing sessions with retries
#[tokio::test(start_paused = true)]
async fn test_retries_recover_some_connections() {
    // The first two bootstrap calls fail; with two retries everyone gets through
    let bot = LoopbackBot::new(LoopbackScript {
        bootstrap_failures: 2,
        ..LoopbackScript::default()
    });
    let orchestrator = TestHelpers::loopback_orchestrator(TestFixtures::fast_settings(), &bot);

    let summary = orchestrator.run_sustained(3, Duration::from_secs(4)).await.unwrap();
    let report = orchestrator.report().await.unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(report.summary.total_connections_successful, 3);
    assert_eq!(report.summary.total_errors, 2);
    assert_eq!(bot.bootstrap_calls(), 5);
}

/// Test aborting mid-run cancels every connection and still yields a report
#[tokio::test(start_paused = true)]
async fn test_abort_cancels_run() {
    let bot = LoopbackBot::default();
    let orchestrator = TestHelpers::loopback_orchestrator(TestFixtures::fast_settings(), &bot);
    let abort = orchestrator.abort_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        abort.cancel();
    });

    let started = Instant::now();
    let summary = orchestrator.run_sustained(3, Duration::from_secs(60)).await.unwrap();
    let report = orchestrator.report().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.cancelled, 3);
    assert_eq!(report.summary.total_connections_attempted, 3);
    assert_eq!(report.connections.len(), 3);
    assert!(report.summary.total_frames_sent > 0);
    assert_eq!(orchestrator.active_connections(), 0);
}

/// Test live probes list connections while a run is in flight
#[tokio::test(start_paused = true)]
async fn test_active_probes_during_run() {
    let bot = LoopbackBot::default();
    let orchestrator = Arc::new(TestHelpers::loopback_orchestrator(TestFixtures::fast_settings(), &bot));

    let runner = orchestrator.clone();
    let run = tokio::spawn(async move { runner.run_sustained(4, Duration::from_secs(3)).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    let probes = orchestrator.active_probes();
    assert_eq!(probes.len(), 4);
    assert!(probes.iter().all(|p| p.state().is_ready()));
    assert!(probes.windows(2).all(|w| w[0].id() < w[1].id()));

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.completed, 4);
    assert!(orchestrator.active_probes().is_empty());
}
