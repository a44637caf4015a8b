use crate::core::metrics::MetricsState;
use crate::services::{MetricsCollector, TokioClock};
use crate::traits::EventSink;
use std::sync::Arc;
use std::time::Duration;

use super::common::{connected, error_event, snapshot};

#[test]
fn test_empty_report_has_zero_rates() {
    let report = MetricsState::new().report(Duration::ZERO);

    assert_eq!(report.summary.total_connections_attempted, 0);
    assert_eq!(report.summary.success_rate, 0.0);
    assert_eq!(report.summary.success_rate_percent, 0.0);
    assert_eq!(report.performance.throughput_frames_per_sec, 0.0);
    assert_eq!(report.performance.avg_connect_time_ms, 0.0);
    assert!(report.connections.is_empty());
}

#[test]
fn test_success_rate_and_connect_times() {
    let mut state = MetricsState::new();
    for _ in 0..4 {
        state.connection_attempted();
    }
    state.record_event(0.1, connected(0, 0.1));
    state.record_event(0.2, connected(1, 0.3));
    state.record_event(0.3, connected(2, 0.2));
    state.record_event(0.4, error_event(3));

    let report = state.report(Duration::from_secs(10));

    assert_eq!(report.summary.total_connections_attempted, 4);
    assert_eq!(report.summary.total_connections_successful, 3);
    assert_eq!(report.summary.success_rate, 0.75);
    assert_eq!(report.summary.success_rate_percent, 75.0);
    assert_eq!(report.summary.error_events, 1);
    assert_eq!(report.performance.avg_connect_time_ms, 200.0);
    assert_eq!(report.performance.min_connect_time_ms, 100.0);
    assert_eq!(report.performance.max_connect_time_ms, 300.0);
}

#[test]
fn test_folding_sums_totals_and_throughput() {
    let mut state = MetricsState::new();
    state.connection_attempted();
    state.connection_attempted();
    state.record_event(0.0, connected(0, 0.5));
    state.update_from_connection(snapshot(0, 100, 192_000, 7, 0));
    state.update_from_connection(snapshot(1, 0, 0, 0, 3));

    let report = state.report(Duration::from_secs(2));

    assert_eq!(report.summary.total_frames_sent, 100);
    assert_eq!(report.summary.total_bytes_sent, 192_000);
    assert_eq!(report.summary.total_frames_received, 7);
    assert_eq!(report.summary.total_errors, 3);
    assert_eq!(report.performance.avg_frames_per_connection, 50.0);
    assert_eq!(report.performance.throughput_frames_per_sec, 50.0);
    assert_eq!(report.performance.throughput_bits_per_sec, 768_000.0);
    assert_eq!(report.performance.throughput_mbps, 0.77);
    assert_eq!(state.live().finalized, 2);

    // The connect time recorded from the event survives the fold
    assert_eq!(report.connections[0].connect_time, Some(0.5));
    assert_eq!(report.connections[1].errors.len(), 3);
}

#[test]
fn test_report_is_pure() {
    let mut state = MetricsState::new();
    state.connection_attempted();
    state.record_event(0.0, connected(0, 0.25));
    state.update_from_connection(snapshot(0, 10, 1920, 1, 0));

    let first = state.report(Duration::from_secs(3));
    let second = state.report(Duration::from_secs(3));

    assert_eq!(first, second);
    assert_eq!(state.events().len(), 1);
    assert_eq!(state.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_collector_freezes_end_time() {
    let collector = MetricsCollector::start(Arc::new(TokioClock));
    collector.connection_attempted();
    collector.emit(connected(0, 0.1));

    tokio::time::sleep(Duration::from_secs(4)).await;
    collector.mark_complete();
    tokio::time::sleep(Duration::from_secs(30)).await;

    let first = collector.generate_report().await.unwrap();
    let second = collector.generate_report().await.unwrap();

    assert_eq!(first.summary.duration_seconds, 4.0);
    assert_eq!(first, second);
    assert_eq!(first.summary.total_connections_successful, 1);
}

#[tokio::test(start_paused = true)]
async fn test_collector_stamps_events_relative_to_start() {
    let collector = MetricsCollector::start(Arc::new(TokioClock));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    collector.record_event(error_event(2));

    let events = collector.events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert!((events[0].timestamp - 1.5).abs() < 1e-6);

    let live = collector.live().await.unwrap();
    assert_eq!(live.error_events, 1);
    assert_eq!(live.attempted, 0);
}
