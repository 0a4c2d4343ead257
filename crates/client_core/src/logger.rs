//! Fire-and-forget telemetry delivery. Logging never blocks the caller,
//! never returns an error, and never alters application state.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use serde_json::{json, Value};
use shared::{
    domain::{ParticipantId, SessionId},
    protocol::FrontendEventRequest,
};
use tracing::warn;

use crate::gateway::ApiGateway;

/// Event types that may be logged before any session or participant
/// identity exists. Everything else is dropped without an identity to
/// avoid orphan backend records.
pub const PRE_IDENTITY_EVENTS: &[&str] = &[
    "app_mounted",
    "app_mounted_no_pid",
    "invalid_url_params",
    "session_start_failed",
    "session_start_success",
];

#[derive(Debug, Clone, Default)]
pub struct TelemetryIdentity {
    pub session_id: Option<SessionId>,
    pub participant_id: Option<ParticipantId>,
}

impl TelemetryIdentity {
    fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.participant_id.is_none()
    }
}

#[derive(Clone)]
pub struct EventLogger {
    gateway: Arc<ApiGateway>,
    identity: Arc<RwLock<TelemetryIdentity>>,
}

impl EventLogger {
    pub fn new(gateway: Arc<ApiGateway>) -> Self {
        Self {
            gateway,
            identity: Arc::new(RwLock::new(TelemetryIdentity::default())),
        }
    }

    pub fn set_identity(
        &self,
        session_id: Option<SessionId>,
        participant_id: Option<ParticipantId>,
    ) {
        let mut identity = self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *identity = TelemetryIdentity {
            session_id,
            participant_id,
        };
    }

    pub fn clear_identity(&self) {
        self.set_identity(None, None);
    }

    pub fn identity(&self) -> TelemetryIdentity {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attaches the current identity and a client timestamp, then delivers
    /// on a detached task. Delivery failures are recorded locally only.
    pub fn log(&self, event_type: &str, event_data: Value) {
        let identity = self.identity();
        if identity.is_empty() && !PRE_IDENTITY_EVENTS.contains(&event_type) {
            warn!(
                event_type,
                "telemetry event dropped: no session or participant identity"
            );
            return;
        }

        let request = FrontendEventRequest {
            session_id: identity.session_id,
            participant_id: identity.participant_id,
            event_type: event_type.to_string(),
            event_data: stamp(event_data),
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event_type, "telemetry event dropped: no async runtime");
            return;
        };
        let gateway = Arc::clone(&self.gateway);
        let event_type = event_type.to_string();
        runtime.spawn(async move {
            if let Err(err) = gateway.log_event(&request).await {
                warn!(event_type, error = %err, "telemetry delivery failed");
            }
        });
    }
}

fn stamp(event_data: Value) -> Value {
    let timestamp = Utc::now().to_rfc3339();
    match event_data {
        Value::Object(mut map) => {
            map.insert("client_timestamp_utc".to_string(), json!(timestamp));
            Value::Object(map)
        }
        other => json!({
            "value": other,
            "client_timestamp_utc": timestamp,
        }),
    }
}

#[cfg(test)]
#[path = "tests/logger_tests.rs"]
mod tests;
