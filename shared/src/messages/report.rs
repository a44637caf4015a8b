//! Report types

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::types::{ConnectionId, ErrorRecord};

/// Per-connection snapshot folded into the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub connection_id: ConnectionId,
    /// Handshake latency in seconds, absent if the connection never became ready
    pub connect_time: Option<f64>,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub errors: Vec<ErrorRecord>,
}

impl ConnectionMetrics {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            connect_time: None,
            frames_sent: 0,
            bytes_sent: 0,
            frames_received: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub duration_seconds: f64,
    pub total_connections_attempted: u64,
    pub total_connections_successful: u64,
    /// successful / attempted, `0` when nothing was attempted
    pub success_rate: f64,
    pub success_rate_percent: f64,
    pub total_frames_sent: u64,
    pub total_bytes_sent: u64,
    pub total_frames_received: u64,
    pub total_errors: u64,
    /// Error events observed live, before per-connection folding
    pub error_events: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub avg_connect_time_ms: f64,
    pub min_connect_time_ms: f64,
    pub max_connect_time_ms: f64,
    pub avg_frames_per_connection: f64,
    pub throughput_frames_per_sec: f64,
    pub throughput_bits_per_sec: f64,
    pub throughput_mbps: f64,
}

/// Final output of a load test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub summary: Summary,
    pub performance: Performance,
    pub connections: Vec<ConnectionMetrics>,
}

impl TestReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text two-section summary for terminal output
    pub fn render_summary(&self) -> String {
        let s = &self.summary;
        let p = &self.performance;
        let mut out = String::new();

        let _ = writeln!(out, "Load Test Summary");
        let _ = writeln!(out, "-----------------");
        let rows: [(&str, String); 9] = [
            ("Duration Seconds", format!("{:.2}", s.duration_seconds)),
            ("Connections Attempted", s.total_connections_attempted.to_string()),
            ("Connections Successful", s.total_connections_successful.to_string()),
            ("Success Rate", format!("{:.2}%", s.success_rate_percent)),
            ("Frames Sent", s.total_frames_sent.to_string()),
            ("Bytes Sent", s.total_bytes_sent.to_string()),
            ("Frames Received", s.total_frames_received.to_string()),
            ("Total Errors", s.total_errors.to_string()),
            ("Error Events", s.error_events.to_string()),
        ];
        for (label, value) in rows {
            let _ = writeln!(out, "{label:<26}{value}");
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Performance Metrics");
        let _ = writeln!(out, "-------------------");
        let rows: [(&str, String); 6] = [
            ("Avg Connect Time (ms)", format!("{:.2}", p.avg_connect_time_ms)),
            ("Min Connect Time (ms)", format!("{:.2}", p.min_connect_time_ms)),
            ("Max Connect Time (ms)", format!("{:.2}", p.max_connect_time_ms)),
            ("Avg Frames / Connection", format!("{:.2}", p.avg_frames_per_connection)),
            ("Throughput (frames/s)", format!("{:.2}", p.throughput_frames_per_sec)),
            ("Throughput (Mbps)", format!("{:.2}", p.throughput_mbps)),
        ];
        for (label, value) in rows {
            let _ = writeln!(out, "{label:<26}{value}");
        }

        out
    }
}

/// Round to two decimal places, as the report presents every ratio
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
