//! Webserver state management
//!
//! State shared by every request handler.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::services::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub started: Instant,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}
