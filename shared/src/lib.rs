//! Shared types for the pipecat load testing workspace
//!
//! Holds the wire codec and everything both binaries agree on: frames, the
//! RTVI envelope, resolved settings, connection events and the report.
//! Component-internal types stay in their respective crates.

pub mod types;
pub mod errors;
pub mod frames;
pub mod rtvi;
pub mod config;
pub mod logging;
pub mod messages;

pub use types::*;
pub use errors::*;

pub use frames::{AudioFrame, Decoded, Frame, MessageFrame, TextFrame, TranscriptionFrame, decode_frame, encode_frame};
pub use rtvi::{ClientAbout, RtviEnvelope};
pub use config::Settings;

pub use messages::{
    // Connection → Collector
    ConnectionEvent, RecordedEvent,

    // Collector output
    ConnectionMetrics, Performance, Summary, TestReport,
};
