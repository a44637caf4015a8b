//! REST API handlers
//!
//! Session endpoints of the testing API. Every handler resolves the session
//! through the manager and delegates to it.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use shared::{ProcessId, process_debug};

use crate::error::{WebServerError, WebServerResult};
use crate::state::AppState;
use crate::types::{
    AudioSendResponse, CloseSessionResponse, HealthResponse, MessagesQuery, MessagesResponse, SendTextRequest,
    SendTextResponse, SessionListResponse, SessionStatusResponse, StartSessionRequest, StartSessionResponse,
};

/// POST /test/session/start
pub async fn start_session(
    State(state): State<AppState>,
    body: Option<Json<StartSessionRequest>>,
) -> WebServerResult<Json<StartSessionResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let session = state.sessions.create_session(request.bot_host).await?;

    Ok(Json(StartSessionResponse {
        session_id: session.id().clone(),
        status: session.status().to_string(),
        ws_url: session.ws_url(),
        created_at: session.created_at(),
    }))
}

/// POST /test/session/:id/audio with PCM or WAV bytes as the body
pub async fn send_audio(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> WebServerResult<Json<AudioSendResponse>> {
    if body.is_empty() {
        return Err(WebServerError::InvalidRequest {
            details: "audio body is empty".to_string(),
        });
    }
    let session = state.sessions.get(&session_id).await?;
    process_debug!(ProcessId::current(), session_id = %session_id, "audio upload of {} bytes", body.len());
    Ok(Json(session.send_audio(&body).await?))
}

/// POST /test/session/:id/text
pub async fn send_text(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SendTextRequest>,
) -> WebServerResult<Json<SendTextResponse>> {
    let session = state.sessions.get(&session_id).await?;
    let frame_id = session.send_text(&request.text).await?;
    Ok(Json(SendTextResponse { sent: true, frame_id }))
}

/// GET /test/session/:id/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> WebServerResult<Json<MessagesResponse>> {
    let session = state.sessions.get(&session_id).await?;
    Ok(Json(session.messages(query.limit, query.since)))
}

/// GET /test/session/:id/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> WebServerResult<Json<SessionStatusResponse>> {
    let session = state.sessions.get(&session_id).await?;
    Ok(Json(session.status_report()))
}

/// DELETE /test/session/:id
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> WebServerResult<Json<CloseSessionResponse>> {
    let final_metrics = state.sessions.close(&session_id).await?;
    Ok(Json(CloseSessionResponse {
        session_id: crate::types::SessionId(session_id),
        status: "closed".to_string(),
        final_metrics,
    }))
}

/// GET /test/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.sessions.list().await;
    Json(SessionListResponse {
        total_active: sessions.len(),
        sessions,
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        active_sessions: state.sessions.session_count().await,
        uptime_seconds: state.uptime().as_secs_f64(),
    })
}
