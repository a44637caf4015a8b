//! Service implementations
//!
//! Real implementations of the seams in `crate::traits`, plus the metrics
//! collector task and the in-process loopback bot.

pub mod audio;
pub mod clock;
pub mod http_bootstrap;
pub mod loopback;
pub mod metrics_collector;
pub mod ws_transport;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use audio::{AudioClip, ClipCursor};
pub use clock::TokioClock;
pub use http_bootstrap::RealBootstrapper;
pub use loopback::{LoopbackBot, LoopbackScript};
pub use metrics_collector::MetricsCollector;
pub use ws_transport::{RealTransportConnector, WsTransport};
