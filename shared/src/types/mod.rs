//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Global process identity for log attribution
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Process identifier for each binary in the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// The `pipecat-load` CLI driving load patterns
    LoadTester,
    /// The interactive testing API server
    TestingApi,
}

impl ProcessId {
    /// Initialize the global process ID for the load tester CLI
    pub fn init_load_tester() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::LoadTester)
    }

    /// Initialize the global process ID for the testing API
    pub fn init_testing_api() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::TestingApi)
    }

    /// Get the global process ID, falling back to the load tester when unset
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::LoadTester)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::LoadTester => write!(f, "load_tester"),
            ProcessId::TestingApi => write!(f, "testing_api"),
        }
    }
}

/// Numeric identity of one simulated client connection within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Phase of a connection's lifecycle in which an error was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPhase {
    Connect,
    SendAudio,
    SendText,
    Receive,
    Decode,
    Disconnect,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorPhase::Connect => "connect",
            ErrorPhase::SendAudio => "send_audio",
            ErrorPhase::SendText => "send_text",
            ErrorPhase::Receive => "receive",
            ErrorPhase::Decode => "decode",
            ErrorPhase::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

/// One recorded failure on a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unix time in seconds when the error was recorded
    pub time: f64,
    pub phase: ErrorPhase,
    pub error: String,
}

impl ErrorRecord {
    pub fn now(phase: ErrorPhase, error: impl Into<String>) -> Self {
        Self {
            time: unix_time_secs(),
            phase,
            error: error.into(),
        }
    }
}

/// Current wall-clock time as fractional unix seconds
pub fn unix_time_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
