//! Service implementations
//!
//! Session lifecycle for the testing API and the message buffer each
//! session fills from its receive loop.

pub mod message_buffer;
pub mod session;
pub mod session_manager;

#[cfg(test)]
mod tests;

pub use message_buffer::MessageBuffer;
pub use session::Session;
pub use session_manager::SessionManager;
