//! Testing API integration tests over the axum router

mod common;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use common::{TestFixtures, TestHelpers};
use orchestrator::LoopbackScript;
use serde_json::json;

/// Test a full session: start, text, audio, messages, status, close
#[tokio::test(start_paused = true)]
async fn test_session_lifecycle() {
    // Arrange
    let (router, _sessions, bot) = TestHelpers::app(TestFixtures::settings(), LoopbackScript::default());

    // Act
    let (status, started) = TestHelpers::post_json(&router, "/test/session/start", json!({})).await;
    let id = started["session_id"].as_str().unwrap().to_string();

    let (text_status, text) =
        TestHelpers::post_json(&router, &format!("/test/session/{id}/text"), json!({ "text": "hello" })).await;
    let (audio_status, audio) =
        TestHelpers::post_bytes(&router, &format!("/test/session/{id}/audio"), TestFixtures::short_pcm()).await;
    TestHelpers::settle().await;

    let (_, messages) = TestHelpers::get(&router, &format!("/test/session/{id}/messages")).await;
    let (_, report) = TestHelpers::get(&router, &format!("/test/session/{id}/status")).await;
    let (close_status, closed) = TestHelpers::delete(&router, &format!("/test/session/{id}")).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "connected");
    assert_eq!(started["ws_url"], "loopback://session/0");
    assert!(started["created_at"].is_string());

    assert_eq!(text_status, StatusCode::OK);
    assert_eq!(text, json!({ "sent": true, "frame_id": 1 }));

    assert_eq!(audio_status, StatusCode::OK);
    assert_eq!(audio["frames_sent"], 2);
    assert_eq!(audio["duration_ms"], 120);

    assert_eq!(messages["session_id"], id.as_str());
    assert_eq!(messages["total_messages"], 1);
    assert_eq!(messages["messages"][0]["type"], "transcription");
    assert_eq!(messages["messages"][0]["data"]["text"], "hello");

    assert_eq!(report["status"], "connected");
    assert_eq!(report["frames_sent"], 3);
    assert_eq!(report["frames_received"], 1);

    assert_eq!(close_status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");
    assert_eq!(closed["final_metrics"]["total_frames_sent"], 3);
    assert_eq!(closed["final_metrics"]["total_errors"], 0);
    assert_eq!(bot.received_frames().len(), 4);
}

/// Test unknown session ids answer 404 on every route
#[tokio::test(start_paused = true)]
async fn test_unknown_session_is_not_found() {
    let (router, _sessions, _bot) = TestHelpers::app(TestFixtures::settings(), LoopbackScript::default());

    let responses = vec![
        TestHelpers::get(&router, "/test/session/missing/status").await,
        TestHelpers::get(&router, "/test/session/missing/messages").await,
        TestHelpers::post_json(&router, "/test/session/missing/text", json!({ "text": "hi" })).await,
        TestHelpers::post_bytes(&router, "/test/session/missing/audio", TestFixtures::short_pcm()).await,
        TestHelpers::delete(&router, "/test/session/missing").await,
    ];

    for (status, body) in responses {
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("missing"));
    }
}

/// Test the session limit answers 503
#[tokio::test(start_paused = true)]
async fn test_session_limit_answers_503() {
    let (router, sessions, _bot) = TestHelpers::app(TestFixtures::settings(), LoopbackScript::default());
    TestHelpers::start_session(&router).await;
    TestHelpers::start_session(&router).await;

    let (status, body) = TestHelpers::post_json(&router, "/test/session/start", json!({})).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains("2"));
    assert_eq!(sessions.session_count().await, 2);
}

/// Test a failed bot handshake answers 500 and registers nothing
#[tokio::test(start_paused = true)]
async fn test_failed_start_answers_500() {
    let (router, sessions, _bot) = TestHelpers::app(
        TestFixtures::settings(),
        LoopbackScript {
            bot_error: Some("pipeline crashed".to_string()),
            ..LoopbackScript::default()
        },
    );

    let (status, body) = TestHelpers::post_json(&router, "/test/session/start", json!({})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("pipeline crashed"));
    assert_eq!(sessions.session_count().await, 0);
}

/// Test the message query honours limit and since
#[tokio::test(start_paused = true)]
async fn test_message_query_filters() {
    let (router, sessions, _bot) = TestHelpers::app(TestFixtures::settings(), LoopbackScript::default());
    let id = TestHelpers::start_session(&router).await;
    let session = sessions.get(&id).await.unwrap();
    for text in ["one", "two", "three"] {
        session.send_text(text).await.unwrap();
        TestHelpers::settle().await;
    }

    let (_, limited) = TestHelpers::get(&router, &format!("/test/session/{id}/messages?limit=2")).await;
    let newest = limited["messages"].as_array().unwrap();
    let cutoff = newest[0]["timestamp"].as_f64().unwrap();
    let (_, since) = TestHelpers::get(&router, &format!("/test/session/{id}/messages?since={cutoff}")).await;

    assert_eq!(limited["total_messages"], 3);
    assert_eq!(newest.len(), 2);
    assert_eq!(newest[0]["data"]["text"], "two");
    assert_eq!(newest[1]["data"]["text"], "three");
    assert_eq!(since["messages"].as_array().unwrap().len(), 1);
    assert_eq!(since["messages"][0]["data"]["text"], "three");
}

/// Test empty and malformed audio bodies answer 400
#[tokio::test(start_paused = true)]
async fn test_bad_audio_answers_400() {
    let (router, _sessions, _bot) = TestHelpers::app(TestFixtures::settings(), LoopbackScript::default());
    let id = TestHelpers::start_session(&router).await;
    let uri = format!("/test/session/{id}/audio");

    let (empty, _) = TestHelpers::post_bytes(&router, &uri, Vec::new()).await;
    let (truncated, body) = TestHelpers::post_bytes(&router, &uri, b"RIFF\x04\x00\x00\x00WAVE".to_vec()).await;

    assert_eq!(empty, StatusCode::BAD_REQUEST);
    assert_eq!(truncated, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("fmt"));
}

/// Test sending on a session the bot closed answers 409
#[tokio::test(start_paused = true)]
async fn test_send_after_peer_close_answers_409() {
    let (router, sessions, _bot) = TestHelpers::app(
        TestFixtures::settings(),
        LoopbackScript {
            close_after_audio: Some(1),
            ..LoopbackScript::default()
        },
    );
    let id = TestHelpers::start_session(&router).await;
    let session = sessions.get(&id).await.unwrap();
    session.send_audio(&[0u8; 1920]).await.unwrap();
    TestHelpers::settle().await;

    let (status, body) =
        TestHelpers::post_json(&router, &format!("/test/session/{id}/text"), json!({ "text": "anyone?" })).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].as_str().unwrap().contains("disconnected"));
}

/// Test listing and health reflect open sessions
#[tokio::test(start_paused = true)]
async fn test_list_and_health() {
    let (router, _sessions, _bot) = TestHelpers::app(TestFixtures::settings(), LoopbackScript::default());
    let first = TestHelpers::start_session(&router).await;
    let second = TestHelpers::start_session(&router).await;

    let (_, listed) = TestHelpers::get(&router, "/test/sessions").await;
    let (health_status, health) = TestHelpers::get(&router, "/health").await;

    assert_eq!(listed["total_active"], 2);
    assert_eq!(listed["sessions"][0]["session_id"], first.as_str());
    assert_eq!(listed["sessions"][1]["session_id"], second.as_str());
    assert_eq!(health_status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["active_sessions"], 2);
}

/// Test a start request without a body uses the configured bot host
#[tokio::test(start_paused = true)]
async fn test_start_without_body() {
    let (router, sessions, _bot) = TestHelpers::app(TestFixtures::settings(), LoopbackScript::default());

    let (status, body) = TestHelpers::call(&router, Method::POST, "/test/session/start", Body::empty(), false).await;

    assert_eq!(status, StatusCode::OK);
    let session = sessions.get(body["session_id"].as_str().unwrap()).await.unwrap();
    assert_eq!(session.bot_host(), TestFixtures::BOT_HOST);
}
