//! Bootstrap POST over reqwest

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{HandshakeError, OrchestratorError, OrchestratorResult};
use crate::traits::Bootstrapper;

#[derive(Serialize)]
struct ConnectRequest<'a> {
    rtvi_client_version: &'a str,
}

#[derive(Deserialize)]
struct ConnectResponse {
    #[serde(default)]
    ws_url: Option<String>,
}

/// Real bootstrapper; one pooled HTTP client shared by every connection
#[derive(Clone)]
pub struct RealBootstrapper {
    client: reqwest::Client,
}

impl RealBootstrapper {
    pub fn new(timeout: Duration) -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            OrchestratorError::Handshake(HandshakeError::BootstrapRequest {
                message: format!("failed to build HTTP client: {e}"),
            })
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Bootstrapper for RealBootstrapper {
    async fn bootstrap(&self, connect_url: &str, client_version: &str) -> Result<String, HandshakeError> {
        let response = self
            .client
            .post(connect_url)
            .json(&ConnectRequest {
                rtvi_client_version: client_version,
            })
            .send()
            .await
            .map_err(|e| HandshakeError::BootstrapRequest { message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandshakeError::BootstrapStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: ConnectResponse = response
            .json()
            .await
            .map_err(|e| HandshakeError::BootstrapRequest {
                message: format!("invalid bootstrap response: {e}"),
            })?;

        body.ws_url
            .filter(|url| !url.is_empty())
            .ok_or(HandshakeError::MissingTransportUrl)
    }
}
