//! Shared error types for the load testing workspace

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Invalid RTVI envelope: {message}")]
    InvalidEnvelope { message: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Configuration load failed for {path}: {message}")]
    ConfigLoad { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SharedError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame { reason: reason.into() }
    }

    pub fn invalid_config(field: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
