//! Message types produced by connections and the metrics collector
//!
//! - `events`: structured per-connection events sent to a sink
//! - `report`: per-connection snapshots and the final test report

pub mod events;
pub mod report;

pub use events::{ConnectionEvent, RecordedEvent};

pub use report::{ConnectionMetrics, Performance, Summary, TestReport};
