//! Service-specific tests
//!
//! Each service has its own test file; shared fixtures live in `common`.


pub mod common {
    use orchestrator::{LoopbackBot, LoopbackScript};
    use shared::Settings;
    use std::sync::Arc;

    use crate::services::SessionManager;

    /// Settings with short delays so paused-time tests stay quick
    pub fn fast_settings() -> Settings {
        Settings {
            host: "loopback:8000".to_string(),
            pipeline_init_delay: 0.1,
            connection_timeout: 5.0,
            disconnect_timeout: 0.5,
            max_sessions: 3,
            session_timeout: 60.0,
            ..Settings::default()
        }
    }

    pub fn manager(settings: Settings, script: LoopbackScript) -> (SessionManager, LoopbackBot) {
        let bot = LoopbackBot::new(script);
        (SessionManager::loopback(Arc::new(settings), bot.clone()), bot)
    }
}
