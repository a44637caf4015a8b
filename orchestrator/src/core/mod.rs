//! Core connection and load logic
//!
//! The lifecycle state machine, retry policy, load patterns and metrics
//! aggregation. All I/O enters through the seams in `crate::traits`, so every
//! module here is driven deterministically by tests.

pub mod connection;
pub mod metrics;
pub mod patterns;
pub mod retry;
pub mod state;

pub use connection::{Connection, ConnectionDeps, ConnectionProbe, StreamOutcome};
pub use metrics::{LiveCounters, MetricsState};
pub use patterns::{LoadPattern, Progress};
pub use retry::{RetryPolicy, connect_with_retry};
pub use state::ConnectionState;
