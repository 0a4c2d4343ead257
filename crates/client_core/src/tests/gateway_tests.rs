use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;
use shared::domain::{AvatarSelection, ParticipantId, SessionId};
use tokio::net::TcpListener;

use super::*;

#[derive(Clone)]
struct ServerState {
    attempts: Arc<AtomicU32>,
    failures_before_success: u32,
}

async fn handle_start(
    State(state): State<ServerState>,
    Json(_body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let attempt = state.attempts.fetch_add(1, Ordering::SeqCst);
    if attempt < state.failures_before_success {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "sessionId": "S1",
            "condition": {
                "avatarEnabled": true,
                "avatarType": "premade",
                "adaptiveStyle": true
            },
            "initialHistory": [{"role": "assistant", "content": "Hello!"}]
        })),
    )
}

async fn handle_generate_quota(
    State(state): State<ServerState>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.attempts.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({"detail": "Avatar generation limit reached for this session."})),
    )
}

async fn spawn_backend(failures_before_success: u32) -> (String, Arc<AtomicU32>) {
    let attempts = Arc::new(AtomicU32::new(0));
    let state = ServerState {
        attempts: Arc::clone(&attempts),
        failures_before_success,
    };
    let app = Router::new()
        .route("/api/session/start", post(handle_start))
        .route("/api/avatar/generate", post(handle_generate_quota))
        .route("/api/session/end", post(handle_start))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), attempts)
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn retries_transient_server_errors_until_success() {
    let (server_url, attempts) = spawn_backend(2).await;
    let gateway = ApiGateway::new(server_url).with_retry_policy(fast_retry(3));

    let response = gateway
        .start_session(&ParticipantId::new("P1"), "premade_adaptive")
        .await
        .expect("start after retries");

    assert_eq!(response.session_id.as_str(), "S1");
    assert!(response.condition.avatar_enabled);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn surfaces_server_error_after_retry_exhaustion() {
    let (server_url, attempts) = spawn_backend(u32::MAX).await;
    let gateway = ApiGateway::new(server_url).with_retry_policy(fast_retry(2));

    let err = gateway
        .start_session(&ParticipantId::new("P1"), "premade_adaptive")
        .await
        .expect_err("must exhaust retries");

    match err {
        GatewayError::ServerExhausted { status, attempts: reported } => {
            assert_eq!(status, 500);
            assert_eq!(reported, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_are_never_retried_and_carry_detail() {
    let (server_url, attempts) = spawn_backend(0).await;
    let gateway = ApiGateway::new(server_url).with_retry_policy(fast_retry(3));

    let err = gateway
        .generate_avatar(&SessionId::new("S1"), "a wise old owl")
        .await
        .expect_err("quota must reject");

    assert!(err.is_client_error());
    assert_eq!(
        err.detail(),
        Some("Avatar generation limit reached for this session.")
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_normalized() {
    let (server_url, _attempts) = spawn_backend(0).await;
    let gateway = ApiGateway::new(format!("{server_url}/"));
    assert!(!gateway.base_url().ends_with('/'));

    gateway
        .set_avatar_details(
            &SessionId::new("S1"),
            &AvatarSelection::Premade {
                url: "/static/avatars/frog.png".to_string(),
            },
        )
        .await
        .expect_err("route not served; error expected");
}

#[tokio::test]
async fn unreachable_backend_surfaces_network_error_immediately() {
    // Port 9 (discard) on localhost is refused in this environment.
    let gateway =
        ApiGateway::new("http://127.0.0.1:9").with_retry_policy(fast_retry(3));
    let started = std::time::Instant::now();
    let err = gateway
        .end_session(&SessionId::new("S1"))
        .await
        .expect_err("must fail");
    assert!(matches!(err, GatewayError::Network(_)));
    // No backoff loop for connection failures.
    assert!(started.elapsed() < Duration::from_secs(2));
}
