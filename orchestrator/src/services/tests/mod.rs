//! Service-specific tests
//!
//! Each service has its own test file; shared fixtures live in `common`.

mod audio;
mod metrics_collector;

pub mod common {
    use shared::{ConnectionEvent, ConnectionId, ConnectionMetrics, ErrorPhase, ErrorRecord};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Helper to run async operations with timeout
    pub async fn with_timeout<T, F>(future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        timeout(TEST_TIMEOUT, future).await.expect("operation timed out")
    }

    pub fn connected(id: u64, connect_time: f64) -> ConnectionEvent {
        ConnectionEvent::Connected {
            connection_id: ConnectionId::new(id),
            connect_time,
        }
    }

    pub fn error_event(id: u64) -> ConnectionEvent {
        ConnectionEvent::Error {
            connection_id: ConnectionId::new(id),
            error: "boom".to_string(),
            phase: ErrorPhase::Connect,
        }
    }

    pub fn snapshot(id: u64, frames_sent: u64, bytes_sent: u64, frames_received: u64, errors: usize) -> ConnectionMetrics {
        ConnectionMetrics {
            frames_sent,
            bytes_sent,
            frames_received,
            errors: (0..errors).map(|_| ErrorRecord::now(ErrorPhase::Connect, "boom")).collect(),
            ..ConnectionMetrics::new(ConnectionId::new(id))
        }
    }
}
