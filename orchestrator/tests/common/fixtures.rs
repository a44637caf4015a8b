//! Test fixtures and data for orchestrator tests

use shared::Settings;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const HOST: &'static str = "loopback:8000";

    /// Settings with short delays so paused-time runs stay quick
    pub fn fast_settings() -> Settings {
        Settings {
            pipeline_init_delay: 0.1,
            connection_timeout: 5.0,
            disconnect_timeout: 0.5,
            retry_delay: 1.0,
            retry_backoff_multiplier: 2.0,
            max_retries: 2,
            progress_interval: 0.5,
            shutdown_grace: 1.0,
            default_audio_duration: 0.5,
            ..Settings::default()
        }
    }

    /// Settings that fail fast: no retries
    pub fn no_retry_settings() -> Settings {
        Settings {
            max_retries: 0,
            ..Self::fast_settings()
        }
    }
}
