//! Load generation library for pipecat voice bots
//!
//! Drives many concurrent two-phase sessions (bootstrap POST, then an RTVI
//! handshake over a websocket) according to a load pattern, streams PCM audio
//! through each, and aggregates per-connection results into one report.

pub mod core;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use core::{
    Connection, ConnectionDeps, ConnectionProbe, ConnectionState, LoadPattern, Progress, RetryPolicy, StreamOutcome,
    connect_with_retry,
};
pub use error::{HandshakeError, OrchestratorError, OrchestratorResult};
pub use orchestrator::{Collaborators, ConnectionOutcome, LoadOrchestrator, ProgressCallback, RunSummary};
pub use services::{AudioClip, LoopbackBot, LoopbackScript, MetricsCollector};
pub use traits::{AudioSource, AudioSourceFactory, Bootstrapper, Clock, EventSink, Transport, TransportConnector};
