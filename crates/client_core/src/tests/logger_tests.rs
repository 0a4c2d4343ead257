use std::{sync::Arc, time::Duration};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;
use shared::{
    domain::{ParticipantId, SessionId},
    protocol::FrontendEventRequest,
};
use tokio::{net::TcpListener, sync::Mutex};

use super::*;
use crate::gateway::RetryPolicy;

#[derive(Clone)]
struct ServerState {
    received: Arc<Mutex<Vec<FrontendEventRequest>>>,
    fail: bool,
}

async fn handle_log(
    State(state): State<ServerState>,
    Json(body): Json<FrontendEventRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.received.lock().await.push(body);
    if state.fail {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})))
    } else {
        (StatusCode::OK, Json(json!({"status": "ok"})))
    }
}

async fn spawn_log_server(fail: bool) -> (String, Arc<Mutex<Vec<FrontendEventRequest>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = ServerState {
        received: Arc::clone(&received),
        fail,
    };
    let app = Router::new()
        .route("/api/log/frontend_event", post(handle_log))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), received)
}

async fn wait_for_events(
    received: &Arc<Mutex<Vec<FrontendEventRequest>>>,
    expected: usize,
) -> Vec<FrontendEventRequest> {
    for _ in 0..100 {
        {
            let events = received.lock().await;
            if events.len() >= expected {
                return events.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    received.lock().await.clone()
}

#[tokio::test]
async fn attaches_identity_and_client_timestamp() {
    let (server_url, received) = spawn_log_server(false).await;
    let logger = EventLogger::new(Arc::new(ApiGateway::new(server_url)));
    logger.set_identity(
        Some(SessionId::new("S1")),
        Some(ParticipantId::new("P1")),
    );

    logger.log("phase_change", json!({"from": "loading", "to": "intro"}));

    let events = wait_for_events(&received, 1).await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event_type, "phase_change");
    assert_eq!(event.session_id.as_ref().map(SessionId::as_str), Some("S1"));
    assert_eq!(
        event.participant_id.as_ref().map(ParticipantId::as_str),
        Some("P1")
    );
    assert_eq!(event.event_data["from"], "loading");
    assert!(event.event_data["client_timestamp_utc"].is_string());
}

#[tokio::test]
async fn drops_non_allow_listed_events_without_identity() {
    let (server_url, received) = spawn_log_server(false).await;
    let logger = EventLogger::new(Arc::new(ApiGateway::new(server_url)));

    logger.log("phase_change", json!({}));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received.lock().await.is_empty());
}

#[tokio::test]
async fn allow_listed_events_log_before_any_identity() {
    let (server_url, received) = spawn_log_server(false).await;
    let logger = EventLogger::new(Arc::new(ApiGateway::new(server_url)));

    logger.log("invalid_url_params", json!({"url_params": ""}));

    let events = wait_for_events(&received, 1).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].session_id.is_none());
    assert!(events[0].participant_id.is_none());
}

#[tokio::test]
async fn delivery_failure_is_swallowed() {
    let (server_url, received) = spawn_log_server(true).await;
    let gateway = ApiGateway::new(server_url).with_retry_policy(RetryPolicy {
        max_retries: 0,
        base_delay: Duration::from_millis(1),
    });
    let logger = EventLogger::new(Arc::new(gateway));
    logger.set_identity(Some(SessionId::new("S1")), None);

    // Must neither panic nor propagate.
    logger.log("chat_timer_expired", json!({}));

    let events = wait_for_events(&received, 1).await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn mount_success_needs_a_participant_identity() {
    let (server_url, received) = spawn_log_server(false).await;
    let logger = EventLogger::new(Arc::new(ApiGateway::new(server_url)));

    // Not on the pre-identity list; dropped until a participant is known.
    logger.log("app_mounted_success", json!({}));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received.lock().await.is_empty());

    logger.set_identity(None, Some(ParticipantId::new("P1")));
    logger.log("app_mounted_success", json!({}));

    let events = wait_for_events(&received, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "app_mounted_success");
}

#[tokio::test]
async fn identity_reset_reverts_to_pre_identity_rules() {
    let (server_url, received) = spawn_log_server(false).await;
    let logger = EventLogger::new(Arc::new(ApiGateway::new(server_url)));
    logger.set_identity(Some(SessionId::new("S1")), None);
    logger.clear_identity();

    logger.log("generate_avatar_clicked", json!({"prompt": "an owl"}));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received.lock().await.is_empty());
}

#[test]
fn non_object_event_data_is_wrapped_not_lost() {
    let stamped = super::stamp(json!("bare-string"));
    assert_eq!(stamped["value"], "bare-string");
    assert!(stamped["client_timestamp_utc"].is_string());
}
