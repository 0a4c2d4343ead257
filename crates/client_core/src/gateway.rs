//! Typed wrapper over the study backend's HTTP surface.
//!
//! Retry is transport-level middleware with an explicit predicate: only 5xx
//! responses are retried, with bounded exponential backoff. Client errors
//! (4xx) and network failures surface immediately, since they likely
//! indicate a non-transient condition.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{AvatarSelection, ParticipantId, SessionId},
    error::ApiErrorBody,
    protocol::{
        EndSessionRequest, FrontendEventRequest, GenerateAvatarRequest, GenerateAvatarResponse,
        SendMessageRequest, SendMessageResponse, SetAvatarDetailsRequest, StartSessionRequest,
        StartSessionResponse,
    },
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend rejected request ({status}): {}", detail.as_deref().unwrap_or("no detail"))]
    Client { status: u16, detail: Option<String> },
    #[error("backend unavailable ({status}) after {attempts} attempt(s)")]
    ServerExhausted { status: u16, attempts: u32 },
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl GatewayError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, GatewayError::Client { .. })
    }

    /// Backend-provided detail string for a rejected request, when present.
    pub fn detail(&self) -> Option<&str> {
        match self {
            GatewayError::Client { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

pub struct ApiGateway {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ApiGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues one POST, retrying on 5xx per the retry policy, and returns
    /// the successful response.
    async fn post_with_retry<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0u32;
        loop {
            let response = self.http.post(&url).json(body).send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status.is_server_error() {
                if attempt < self.retry.max_retries {
                    warn!(
                        path,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        "transient server error; retrying"
                    );
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(GatewayError::ServerExhausted {
                    status: status.as_u16(),
                    attempts: attempt + 1,
                });
            }

            let detail = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .map(|body| body.detail);
            return Err(GatewayError::Client {
                status: status.as_u16(),
                detail,
            });
        }
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, GatewayError> {
        let response = self.post_with_retry(path, body).await?;
        Ok(response.json().await?)
    }

    async fn post_ack<B: Serialize>(&self, path: &str, body: &B) -> Result<(), GatewayError> {
        self.post_with_retry(path, body).await?;
        Ok(())
    }

    /// Once per bootstrap.
    pub async fn start_session(
        &self,
        participant_id: &ParticipantId,
        condition_name: &str,
    ) -> Result<StartSessionResponse, GatewayError> {
        self.post_json(
            "/api/session/start",
            &StartSessionRequest {
                participant_id: participant_id.clone(),
                condition_name: condition_name.to_string(),
            },
        )
        .await
    }

    /// Once per accepted chat send.
    pub async fn send_message(
        &self,
        session_id: &SessionId,
        message: &str,
    ) -> Result<SendMessageResponse, GatewayError> {
        self.post_json(
            "/api/session/message",
            &SendMessageRequest {
                session_id: session_id.clone(),
                message: message.to_string(),
            },
        )
        .await
    }

    pub async fn set_avatar_details(
        &self,
        session_id: &SessionId,
        selection: &AvatarSelection,
    ) -> Result<(), GatewayError> {
        self.post_ack(
            "/api/session/set_avatar_details",
            &SetAvatarDetailsRequest {
                session_id: session_id.clone(),
                avatar_url: selection.url().to_string(),
                avatar_prompt: selection.prompt().map(str::to_string),
            },
        )
        .await
    }

    pub async fn generate_avatar(
        &self,
        session_id: &SessionId,
        prompt: &str,
    ) -> Result<GenerateAvatarResponse, GatewayError> {
        self.post_json(
            "/api/avatar/generate",
            &GenerateAvatarRequest {
                session_id: session_id.clone(),
                prompt: prompt.to_string(),
            },
        )
        .await
    }

    /// Best-effort; callers route this through a [`crate::SessionEndTransport`].
    pub async fn end_session(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        self.post_ack(
            "/api/session/end",
            &EndSessionRequest {
                session_id: session_id.clone(),
            },
        )
        .await
    }

    pub async fn log_event(&self, request: &FrontendEventRequest) -> Result<(), GatewayError> {
        self.post_ack("/api/log/frontend_event", request).await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
