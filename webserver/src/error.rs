//! WebServer-specific error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orchestrator::OrchestratorError;
use serde_json::json;
use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebServerError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session limit of {max} reached")]
    CapacityExceeded { max: usize },

    #[error("Session {session_id} is not connected (status {status})")]
    NotConnected { session_id: String, status: String },

    #[error("Failed to start session: {message}")]
    ConnectFailed { message: String },

    #[error("Send failed: {message}")]
    SendFailed { message: String },

    #[error("Invalid request format: {details}")]
    InvalidRequest { details: String },

    #[error("Server startup error: {0}")]
    ServerStartup(String),

    #[error("Orchestrator component error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WebServerError {
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebServerError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            WebServerError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WebServerError::NotConnected { .. } => StatusCode::CONFLICT,
            WebServerError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            WebServerError::Orchestrator(OrchestratorError::Audio { .. }) => StatusCode::BAD_REQUEST,
            WebServerError::ConnectFailed { .. }
            | WebServerError::SendFailed { .. }
            | WebServerError::ServerStartup(_)
            | WebServerError::Orchestrator(_)
            | WebServerError::Shared(_)
            | WebServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebServerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type WebServerResult<T> = Result<T, WebServerError>;
