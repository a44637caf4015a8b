//! Bounded exponential backoff around the handshake

use shared::{ProcessId, Settings, process_debug, process_warn};
use std::time::Duration;

use super::connection::Connection;
use super::state::ConnectionState;
use crate::traits::Clock;

/// Longest single wait between attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            delay: settings.retry_delay(),
            backoff: settings.retry_backoff_multiplier,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry number `retry` (1-based), capped at [`MAX_RETRY_DELAY`]
    pub fn delay_before(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }
        let mut delay = self.delay.min(MAX_RETRY_DELAY);
        for _ in 1..retry {
            if delay >= MAX_RETRY_DELAY {
                break;
            }
            delay = Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff.max(1.0))
                .unwrap_or(MAX_RETRY_DELAY)
                .min(MAX_RETRY_DELAY);
        }
        Some(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Attempt the handshake up to `max_retries + 1` times.
///
/// Each failed attempt is recorded on the connection before the next one.
/// Returns `false` with the connection in `Error` once attempts run out or
/// the connection is cancelled.
pub async fn connect_with_retry(connection: &Connection, policy: &RetryPolicy, clock: &dyn Clock) -> bool {
    let mut attempt = 1u32;

    loop {
        if connection.connect().await {
            return true;
        }

        let cancelled = connection.cancellation_token().is_cancelled();
        let Some(delay) = policy.delay_before(attempt).filter(|_| !cancelled) else {
            process_warn!(
                ProcessId::current(),
                connection_id = %connection.id(),
                "❌ handshake failed after {} attempt(s)",
                attempt
            );
            return false;
        };

        process_debug!(
            ProcessId::current(),
            connection_id = %connection.id(),
            "attempt {}/{} failed, retrying in {:.2}s",
            attempt,
            policy.total_attempts(),
            delay.as_secs_f64()
        );

        tokio::select! {
            _ = connection.cancellation_token().cancelled() => return false,
            _ = clock.sleep(delay) => {}
        }

        if connection.state() == ConnectionState::Error {
            connection.reset();
        }
        attempt += 1;
    }
}
