//! RTVI application envelope nested inside `message` frames

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::{SharedError, SharedResult};
use crate::frames::Frame;

pub const RTVI_LABEL: &str = "rtvi-ai";

pub const CLIENT_READY: &str = "client-ready";
pub const SEND_TEXT: &str = "send-text";
pub const BOT_READY: &str = "bot-ready";
pub const ERROR: &str = "error";

/// Client metadata advertised in the client-ready message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientAbout {
    pub library: String,
    pub library_version: String,
    pub platform: String,
}

impl Default for ClientAbout {
    fn default() -> Self {
        Self {
            library: "pipecat-load".to_string(),
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: "rust".to_string(),
        }
    }
}

/// `{label, type, id, data}` object carried in `MessageFrame.data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtviEnvelope {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

fn default_label() -> String {
    RTVI_LABEL.to_string()
}

/// Random 8-character message id
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

impl RtviEnvelope {
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            label: RTVI_LABEL.to_string(),
            message_type: message_type.into(),
            id: short_id(),
            data,
        }
    }

    pub fn client_ready(client_version: &str, about: &ClientAbout) -> Self {
        Self::new(
            CLIENT_READY,
            json!({
                "version": client_version,
                "about": about,
            }),
        )
    }

    pub fn send_text(content: &str) -> Self {
        Self::new(SEND_TEXT, json!({ "content": content }))
    }

    pub fn parse(data: &str) -> SharedResult<Self> {
        serde_json::from_str(data).map_err(|e| SharedError::InvalidEnvelope { message: e.to_string() })
    }

    pub fn is_bot_ready(&self) -> bool {
        self.message_type == BOT_READY
    }

    pub fn is_error(&self) -> bool {
        self.message_type == ERROR
    }

    /// Server-supplied error text, `"unknown"` when absent
    pub fn error_message(&self) -> String {
        self.data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn to_json(&self) -> String {
        // A struct of strings and a Value always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Wrap into a `message` frame ready for encoding
    pub fn into_frame(self) -> Frame {
        Frame::message(self.to_json())
    }
}
