//! Resolved settings for a load test run
//!
//! Sources are layered defaults → YAML file → `.env` / `PIPECAT_*` environment
//! variables; binaries apply CLI overrides last. The result is handed to the
//! core as one immutable value.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};

const STANDARD_SAMPLE_RATES: [u32; 5] = [8000, 16000, 22050, 44100, 48000];
const MAX_RETRIES: u32 = 20;
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;
const MAX_RETRY_DELAY_SECS: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Server
    pub host: String,
    pub connect_endpoint: String,
    pub rtvi_client_version: String,

    // Audio
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub chunk_duration_ms: u64,
    pub default_audio_frequency: f64,
    pub default_audio_duration: f64,
    pub audio_file: Option<PathBuf>,

    // Connection
    pub websocket_max_size: usize,
    pub websocket_ping_interval: f64,
    pub websocket_ping_timeout: f64,
    pub pipeline_init_delay: f64,
    pub connection_timeout: f64,
    pub disconnect_timeout: f64,

    // Retry
    pub max_retries: u32,
    pub retry_delay: f64,
    pub retry_backoff_multiplier: f64,

    // Orchestration
    pub max_connections: usize,
    pub progress_interval: f64,
    pub shutdown_grace: f64,

    // Test defaults
    pub default_connections: usize,
    pub default_duration: f64,
    pub default_output: PathBuf,

    // Logging
    pub log_level: String,

    // Testing API
    pub api_host: String,
    pub api_port: u16,
    pub session_timeout: f64,
    pub max_sessions: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "localhost:8000".to_string(),
            connect_endpoint: "/connect".to_string(),
            rtvi_client_version: "0.4.1".to_string(),

            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
            chunk_duration_ms: 60,
            default_audio_frequency: 440.0,
            default_audio_duration: 5.0,
            audio_file: None,

            websocket_max_size: 10 * 1024 * 1024,
            websocket_ping_interval: 20.0,
            websocket_ping_timeout: 20.0,
            pipeline_init_delay: 1.5,
            connection_timeout: 30.0,
            disconnect_timeout: 1.0,

            max_retries: 3,
            retry_delay: 1.0,
            retry_backoff_multiplier: 2.0,

            max_connections: 1000,
            progress_interval: 0.5,
            shutdown_grace: 5.0,

            default_connections: 10,
            default_duration: 60.0,
            default_output: PathBuf::from("results.json"),

            log_level: "info".to_string(),

            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            session_timeout: 300.0,
            max_sessions: 100,
        }
    }
}

impl Settings {
    /// Resolve settings from an optional YAML file and the environment
    pub fn load(config_path: Option<&Path>) -> SharedResult<Self> {
        dotenv::dotenv().ok();

        let mut settings = match config_path {
            Some(path) => Self::from_yaml_file(path)?,
            None => match Self::default_config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_yaml_file(&path)?,
                None => Self::default(),
            },
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("pipecat-config.yaml"), PathBuf::from("pipecat-config.yml")];
        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(home).join(".pipecat").join("config.yaml"));
        }
        paths
    }

    pub fn from_yaml_file(path: &Path) -> SharedResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SharedError::ConfigLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            SharedError::ConfigLoad { message, .. } => SharedError::ConfigLoad {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse YAML; one level of nested sections is flattened so that both
    /// `host: x` and `server: { host: x }` are accepted.
    pub fn from_yaml_str(content: &str) -> SharedResult<Self> {
        use serde_yaml_ng::{Mapping, Value};

        let load_err = |message: String| SharedError::ConfigLoad {
            path: "<yaml>".to_string(),
            message,
        };

        let root: Value = serde_yaml_ng::from_str(content).map_err(|e| load_err(e.to_string()))?;
        let mut flat = Mapping::new();
        match root {
            Value::Mapping(map) => {
                for (key, value) in map {
                    match value {
                        Value::Mapping(section) => flat.extend(section),
                        other => {
                            flat.insert(key, other);
                        }
                    }
                }
            }
            Value::Null => {}
            _ => return Err(load_err("top level must be a mapping".to_string())),
        }

        serde_yaml_ng::from_value(Value::Mapping(flat)).map_err(|e| load_err(e.to_string()))
    }

    /// Override fields from `PIPECAT_*` variables using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> SharedResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> SharedResult<T> {
            raw.trim().parse().map_err(|_| SharedError::invalid_config(key, raw))
        }

        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("PIPECAT_HOST") {
            self.host = v;
        }
        if let Some(v) = get("PIPECAT_CONNECT_ENDPOINT") {
            self.connect_endpoint = v;
        }
        if let Some(v) = get("PIPECAT_RTVI_VERSION") {
            self.rtvi_client_version = v;
        }
        if let Some(v) = get("PIPECAT_SAMPLE_RATE") {
            self.sample_rate = parse("PIPECAT_SAMPLE_RATE", &v)?;
        }
        if let Some(v) = get("PIPECAT_CHUNK_DURATION_MS") {
            self.chunk_duration_ms = parse("PIPECAT_CHUNK_DURATION_MS", &v)?;
        }
        if let Some(v) = get("PIPECAT_PIPELINE_INIT_DELAY") {
            self.pipeline_init_delay = parse("PIPECAT_PIPELINE_INIT_DELAY", &v)?;
        }
        if let Some(v) = get("PIPECAT_CONNECTION_TIMEOUT") {
            self.connection_timeout = parse("PIPECAT_CONNECTION_TIMEOUT", &v)?;
        }
        if let Some(v) = get("PIPECAT_MAX_RETRIES") {
            self.max_retries = parse("PIPECAT_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("PIPECAT_RETRY_DELAY") {
            self.retry_delay = parse("PIPECAT_RETRY_DELAY", &v)?;
        }
        if let Some(v) = get("PIPECAT_MAX_CONNECTIONS") {
            self.max_connections = parse("PIPECAT_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("PIPECAT_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("PIPECAT_API_HOST") {
            self.api_host = v;
        }
        if let Some(v) = get("PIPECAT_API_PORT") {
            self.api_port = parse("PIPECAT_API_PORT", &v)?;
        }
        if let Some(v) = get("PIPECAT_AUDIO_FILE") {
            self.audio_file = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Collect every problem with the settings; empty means valid
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("host is required".to_string());
        }
        if !STANDARD_SAMPLE_RATES.contains(&self.sample_rate) {
            errors.push(format!("sample_rate {} is not a standard audio rate", self.sample_rate));
        }
        if !(10..=500).contains(&self.chunk_duration_ms) {
            errors.push(format!(
                "chunk_duration_ms {} should be between 10-500ms",
                self.chunk_duration_ms
            ));
        }
        if self.channels == 0 {
            errors.push("channels must be >= 1".to_string());
        }
        if self.pipeline_init_delay < 0.0 {
            errors.push("pipeline_init_delay must be >= 0".to_string());
        }
        if self.retry_delay < 0.0 {
            errors.push("retry_delay must be >= 0".to_string());
        }
        if self.retry_delay > MAX_RETRY_DELAY_SECS {
            errors.push(format!("retry_delay must be <= {MAX_RETRY_DELAY_SECS}s"));
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.retry_backoff_multiplier) {
            errors.push(format!(
                "retry_backoff_multiplier {} should be between 1-{MAX_BACKOFF_MULTIPLIER}",
                self.retry_backoff_multiplier
            ));
        }
        if self.max_retries > MAX_RETRIES {
            errors.push(format!("max_retries {} exceeds {MAX_RETRIES}", self.max_retries));
        }
        if self.connection_timeout <= 0.0 {
            errors.push("connection_timeout must be > 0".to_string());
        }
        if self.max_connections == 0 {
            errors.push("max_connections must be >= 1".to_string());
        }
        if let Some(path) = &self.audio_file {
            if !path.exists() {
                errors.push(format!("audio_file '{}' does not exist", path.display()));
            }
        }

        errors
    }

    /// Convert [`Settings::validate`] into a single error
    pub fn ensure_valid(&self) -> SharedResult<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SharedError::invalid_config("settings", errors.join("; ")))
        }
    }

    /// Bootstrap URL for a host; a bare `host:port` gets an `http://` scheme
    pub fn connect_url(&self, host: &str) -> String {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        format!("{}{}", base, self.connect_endpoint)
    }

    /// Bytes in one PCM chunk at the configured rate, channels and bit depth
    pub fn chunk_size_bytes(&self) -> usize {
        let samples = self.sample_rate as u64 * self.chunk_duration_ms / 1000;
        samples as usize * self.channels as usize * (self.bit_depth as usize / 8)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_duration_ms)
    }

    pub fn pipeline_init_delay(&self) -> Duration {
        secs(self.pipeline_init_delay)
    }

    pub fn connection_timeout(&self) -> Duration {
        secs(self.connection_timeout)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        secs(self.disconnect_timeout)
    }

    pub fn ping_interval(&self) -> Duration {
        secs(self.websocket_ping_interval)
    }

    pub fn ping_timeout(&self) -> Duration {
        secs(self.websocket_ping_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay)
    }

    pub fn progress_interval(&self) -> Duration {
        secs(self.progress_interval)
    }

    pub fn shutdown_grace(&self) -> Duration {
        secs(self.shutdown_grace)
    }

    pub fn session_timeout(&self) -> Duration {
        secs(self.session_timeout)
    }
}

/// Non-negative, finite seconds to a `Duration`
pub fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_empty());
        assert_eq!(settings.chunk_size_bytes(), 1920);
        assert_eq!(settings.pipeline_init_delay(), Duration::from_millis(1500));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let settings = Settings {
            sample_rate: 12345,
            chunk_duration_ms: 5,
            pipeline_init_delay: -1.0,
            ..Settings::default()
        };
        let errors = settings.validate();
        assert_eq!(errors.len(), 3);
        assert!(settings.ensure_valid().is_err());
    }

    #[test]
    fn test_retry_bounds_are_validated() {
        let settings = Settings {
            max_retries: 70,
            retry_backoff_multiplier: 50.0,
            retry_delay: 1e12,
            ..Settings::default()
        };
        let errors = settings.validate();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("max_retries")));
        assert_eq!(settings.retry_delay(), Duration::from_secs_f64(1e12));
        assert_eq!(secs(f64::MAX), Duration::MAX);
    }

    #[test]
    fn test_nested_yaml_sections_are_flattened() {
        let yaml = "server:\n  host: bot.internal:9000\nretry:\n  max_retries: 5\nlog_level: debug\n";
        let settings = Settings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.host, "bot.internal:9000");
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.sample_rate, 16000);
    }

    #[test]
    fn test_yaml_file_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pipeline_init_delay: 0.25").unwrap();
        let settings = Settings::from_yaml_file(file.path()).unwrap();
        assert_eq!(settings.pipeline_init_delay, 0.25);
    }

    #[test]
    fn test_missing_yaml_file_is_an_error() {
        let err = Settings::from_yaml_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, SharedError::ConfigLoad { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("PIPECAT_HOST", "10.0.0.2:8000"), ("PIPECAT_MAX_RETRIES", "0")].into();
        let mut settings = Settings::default();
        settings.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.host, "10.0.0.2:8000");
        assert_eq!(settings.max_retries, 0);
    }

    #[test]
    fn test_bad_env_number_is_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(|k| (k == "PIPECAT_SAMPLE_RATE").then(|| "loud".to_string()))
            .unwrap_err();
        assert!(matches!(err, SharedError::InvalidConfig { .. }));
    }

    #[test]
    fn test_connect_url() {
        let settings = Settings::default();
        assert_eq!(settings.connect_url("localhost:8000"), "http://localhost:8000/connect");
        assert_eq!(settings.connect_url("https://bot.example/"), "https://bot.example/connect");
    }
}
