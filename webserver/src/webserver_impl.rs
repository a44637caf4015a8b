//! Main webserver implementation
//!
//! Builds the testing API router over the session manager and serves it
//! until the shutdown token fires.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use shared::{ProcessId, process_info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{WebServerError, WebServerResult};
use crate::services::SessionManager;
use crate::state::AppState;
use crate::web::handlers::api;

/// Largest accepted audio upload
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub struct WebServer {
    state: AppState,
}

impl WebServer {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            state: AppState::new(sessions),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the Axum router with all routes
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/test/session/start", post(api::start_session))
            .route("/test/session/:id/audio", post(api::send_audio))
            .route("/test/session/:id/text", post(api::send_text))
            .route("/test/session/:id/messages", get(api::get_messages))
            .route("/test/session/:id/status", get(api::get_status))
            .route("/test/session/:id", delete(api::close_session))
            .route("/test/sessions", get(api::list_sessions))
            .route("/health", get(api::health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive())
                    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
                    .into_inner(),
            )
            .with_state(self.state.clone())
    }

    /// Serve on `addr` until `shutdown` is cancelled, then close every session
    pub async fn run(&self, addr: SocketAddr, shutdown: CancellationToken) -> WebServerResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| WebServerError::ServerStartup(format!("Failed to bind to {addr}: {e}")))?;
        process_info!(ProcessId::current(), "🌐 Testing API listening on http://{}", addr);

        let interval = (self.state.sessions.settings().session_timeout() / 10).max(Duration::from_secs(1));
        let sweeper = self.state.sessions.spawn_sweeper(interval, shutdown.clone());

        let signal = shutdown.clone();
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await?;

        shutdown.cancel();
        let _ = sweeper.await;
        let closed = self.state.sessions.close_all().await;
        process_info!(ProcessId::current(), "closed {} sessions on shutdown", closed);
        Ok(())
    }
}
