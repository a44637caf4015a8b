//! Interactive testing API for pipecat voice bots
//!
//! Exposes single bot sessions over HTTP: start a session, push text or
//! audio through it, read back what the bot sent, and close it. Each session
//! wraps one orchestrator `Connection`.

pub mod error;
pub mod services;
pub mod state;
pub mod types;
pub mod web;
pub mod webserver_impl;

// Re-export main types
pub use error::{WebServerError, WebServerResult};
pub use services::{MessageBuffer, Session, SessionManager};
pub use state::AppState;
pub use types::*;
pub use webserver_impl::WebServer;
