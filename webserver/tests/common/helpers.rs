//! Test helper functions and utilities

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use orchestrator::{LoopbackBot, LoopbackScript};
use serde_json::Value;
use shared::Settings;
use std::sync::Arc;
use tower::ServiceExt;
use webserver::{SessionManager, WebServer};

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    /// Router over a session manager answered by a loopback bot
    pub fn app(settings: Settings, script: LoopbackScript) -> (Router, Arc<SessionManager>, LoopbackBot) {
        let bot = LoopbackBot::new(script);
        let sessions = Arc::new(SessionManager::loopback(Arc::new(settings), bot.clone()));
        let router = WebServer::new(sessions.clone()).build_router();
        (router, sessions, bot)
    }

    /// Send one request and decode the JSON response body
    pub async fn call(router: &Router, method: Method, uri: &str, body: Body, json: bool) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if json {
            request = request.header("content-type", "application/json");
        }
        let response = router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
        Self::call(router, Method::GET, uri, Body::empty(), false).await
    }

    pub async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        Self::call(router, Method::POST, uri, Body::from(body.to_string()), true).await
    }

    pub async fn post_bytes(router: &Router, uri: &str, bytes: Vec<u8>) -> (StatusCode, Value) {
        Self::call(router, Method::POST, uri, Body::from(bytes), false).await
    }

    pub async fn delete(router: &Router, uri: &str) -> (StatusCode, Value) {
        Self::call(router, Method::DELETE, uri, Body::empty(), false).await
    }

    /// Start a session and return its id
    pub async fn start_session(router: &Router) -> String {
        let (status, body) = Self::post_json(router, "/test/session/start", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK, "start failed: {body}");
        body["session_id"].as_str().unwrap().to_string()
    }

    /// Let the receive loop drain what the bot sent
    pub async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
