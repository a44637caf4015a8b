//! Aggregated metrics state for one run
//!
//! Owned exclusively by the collector task; the report is a pure function of
//! this state and the elapsed time.

use serde::{Deserialize, Serialize};
use shared::messages::report::round2;
use shared::{ConnectionEvent, ConnectionId, ConnectionMetrics, Performance, RecordedEvent, Summary, TestReport};
use std::collections::BTreeMap;
use std::time::Duration;

/// Counters updated as events arrive, for live progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCounters {
    pub attempted: u64,
    pub successful: u64,
    pub error_events: u64,
    pub finalized: u64,
}

#[derive(Debug, Default)]
pub struct MetricsState {
    events: Vec<RecordedEvent>,
    connections: BTreeMap<ConnectionId, ConnectionMetrics>,
    attempted: u64,
    successful: u64,
    error_events: u64,
    finalized: u64,
    total_frames_sent: u64,
    total_bytes_sent: u64,
    total_frames_received: u64,
    total_errors: u64,
}

impl MetricsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_attempted(&mut self) {
        self.attempted += 1;
    }

    /// Append an event stamped `timestamp` seconds into the run
    pub fn record_event(&mut self, timestamp: f64, event: ConnectionEvent) {
        match &event {
            ConnectionEvent::Connected {
                connection_id,
                connect_time,
            } => {
                self.successful += 1;
                self.connections
                    .entry(*connection_id)
                    .or_insert_with(|| ConnectionMetrics::new(*connection_id))
                    .connect_time = Some(*connect_time);
            }
            ConnectionEvent::Error { .. } => self.error_events += 1,
            _ => {}
        }
        self.events.push(RecordedEvent { timestamp, event });
    }

    /// Fold one connection's final snapshot into its record and the totals
    pub fn update_from_connection(&mut self, snapshot: ConnectionMetrics) {
        self.finalized += 1;
        self.total_frames_sent += snapshot.frames_sent;
        self.total_bytes_sent += snapshot.bytes_sent;
        self.total_frames_received += snapshot.frames_received;
        self.total_errors += snapshot.errors.len() as u64;

        let entry = self
            .connections
            .entry(snapshot.connection_id)
            .or_insert_with(|| ConnectionMetrics::new(snapshot.connection_id));
        entry.frames_sent = snapshot.frames_sent;
        entry.bytes_sent = snapshot.bytes_sent;
        entry.frames_received = snapshot.frames_received;
        entry.errors = snapshot.errors;
        if snapshot.connect_time.is_some() {
            entry.connect_time = snapshot.connect_time;
        }
    }

    pub fn live(&self) -> LiveCounters {
        LiveCounters {
            attempted: self.attempted,
            successful: self.successful,
            error_events: self.error_events,
            finalized: self.finalized,
        }
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn report(&self, elapsed: Duration) -> TestReport {
        let duration = elapsed.as_secs_f64();

        let success_rate = if self.attempted > 0 {
            self.successful as f64 / self.attempted as f64
        } else {
            0.0
        };

        let connect_times: Vec<f64> = self.connections.values().filter_map(|c| c.connect_time).collect();
        let (avg_connect, min_connect, max_connect) = if connect_times.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = connect_times.iter().sum();
            let min = connect_times.iter().copied().fold(f64::INFINITY, f64::min);
            let max = connect_times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (sum / connect_times.len() as f64, min, max)
        };

        let avg_frames = if self.connections.is_empty() {
            0.0
        } else {
            let total: u64 = self.connections.values().map(|c| c.frames_sent).sum();
            total as f64 / self.connections.len() as f64
        };

        let (frames_per_sec, bits_per_sec) = if duration > 0.0 {
            (
                self.total_frames_sent as f64 / duration,
                self.total_bytes_sent as f64 * 8.0 / duration,
            )
        } else {
            (0.0, 0.0)
        };

        TestReport {
            summary: Summary {
                duration_seconds: round2(duration),
                total_connections_attempted: self.attempted,
                total_connections_successful: self.successful,
                success_rate: success_rate.clamp(0.0, 1.0),
                success_rate_percent: round2(success_rate * 100.0),
                total_frames_sent: self.total_frames_sent,
                total_bytes_sent: self.total_bytes_sent,
                total_frames_received: self.total_frames_received,
                total_errors: self.total_errors,
                error_events: self.error_events,
            },
            performance: Performance {
                avg_connect_time_ms: round2(avg_connect * 1000.0),
                min_connect_time_ms: round2(min_connect * 1000.0),
                max_connect_time_ms: round2(max_connect * 1000.0),
                avg_frames_per_connection: round2(avg_frames),
                throughput_frames_per_sec: round2(frames_per_sec),
                throughput_bits_per_sec: round2(bits_per_sec),
                throughput_mbps: round2(bits_per_sec / 1_000_000.0),
            },
            connections: self.connections.values().cloned().collect(),
        }
    }
}
