//! Test fixtures and data for webserver tests

use shared::Settings;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const BOT_HOST: &'static str = "loopback:8000";

    /// Short handshake delays and a small session limit
    pub fn settings() -> Settings {
        Settings {
            host: Self::BOT_HOST.to_string(),
            pipeline_init_delay: 0.1,
            connection_timeout: 5.0,
            disconnect_timeout: 0.5,
            max_sessions: 2,
            ..Settings::default()
        }
    }

    /// 100 ms of silence as raw 16 kHz PCM: two 60 ms chunks
    pub fn short_pcm() -> Vec<u8> {
        vec![0u8; 3200]
    }
}
