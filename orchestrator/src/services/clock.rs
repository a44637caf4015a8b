//! Tokio-backed clock

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

use crate::traits::Clock;

/// Real time via `tokio::time`, which also honours paused test time
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
