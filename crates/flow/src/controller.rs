//! Phase orchestration: bootstraps a session from launch parameters,
//! drives phase transitions, wires the countdown to session end, and
//! mediates avatar and chat handlers.

use std::sync::Arc;
use std::time::Duration;

use client_core::{
    gateway::{ApiGateway, GatewayError},
    logger::EventLogger,
    transport::{preferred_end_transport, SessionEndTransport},
};
use serde_json::json;
use shared::{
    domain::{
        AvatarSelection, AvatarType, ChatMessage, Condition, ParticipantId, Phase, SessionId,
    },
    protocol::GenerateAvatarResponse,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::store::{SessionStore, TranscriptStore};
use crate::timer::Countdown;

pub const DEFAULT_CHAT_DURATION_SECONDS: u64 = 600;
pub const LOADING_MIN_DISPLAY: Duration = Duration::from_millis(3000);
pub const MAX_AVATAR_GENERATIONS: usize = 5;
pub const AVATAR_PROMPT_CHAR_LIMIT: usize = 150;
/// Shown in place of a bot reply when a send ultimately fails.
pub const FALLBACK_BOT_REPLY: &str = "I seem to be having trouble connecting.";

const DEMO_PARTICIPANT_PREFIX: &str = "demo_user";
const GENERIC_GENERATION_FAILURE: &str = "Could not generate avatar. Please try again.";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub chat_duration_seconds: u64,
    pub loading_min_display: Duration,
    pub survey_base_url: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            chat_duration_seconds: DEFAULT_CHAT_DURATION_SECONDS,
            loading_min_display: LOADING_MIN_DISPLAY,
            survey_base_url:
                "https://youruniversity.qualtrics.com/jfe/form/SV_YOUR_SURVEY_ID".to_string(),
        }
    }
}

/// Launch-context parameters as handed over by the host (query string or
/// command line). Demonstration mode bypasses them entirely.
#[derive(Debug, Clone)]
pub enum LaunchParams {
    Experiment {
        participant_id: Option<String>,
        avatar: Option<String>,
        style: Option<String>,
        response_token: Option<String>,
    },
    Demo,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("missing or invalid launch parameters: {0}")]
    InvalidLaunchParams(String),
    #[error("session start failed")]
    StartFailed(#[source] GatewayError),
}

#[derive(Debug, Error)]
pub enum AvatarGenerationError {
    #[error("describe your avatar first")]
    EmptyPrompt,
    #[error("prompts are limited to 150 characters")]
    PromptTooLong,
    #[error("no generations remain for this session")]
    QuotaExhausted,
    #[error("{0}")]
    Rejected(String),
    #[error("avatar generation is not available right now")]
    Unavailable,
}

/// Notifications toward the rendering layer.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    PhaseChanged { from: Phase, to: Phase },
    TranscriptUpdated,
}

struct LaunchContext {
    participant_id: ParticipantId,
    condition: Condition,
    survey_return_url: Option<Url>,
    demo: bool,
}

struct ControllerState {
    session: SessionStore,
    transcript: TranscriptStore,
    generation_count: usize,
    ended: bool,
    bootstrapping: bool,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            session: SessionStore::new(),
            transcript: TranscriptStore::new(),
            generation_count: 0,
            ended: false,
            bootstrapping: false,
        }
    }

    fn reset_for_bootstrap(&mut self) {
        self.session.reset();
        self.transcript.reset();
        self.generation_count = 0;
        self.ended = false;
    }
}

pub struct PhaseController {
    gateway: Arc<ApiGateway>,
    logger: EventLogger,
    end_transport: Arc<dyn SessionEndTransport>,
    countdown: Countdown,
    config: ControllerConfig,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<FlowEvent>,
}

impl PhaseController {
    pub fn new(gateway: Arc<ApiGateway>) -> Arc<Self> {
        let logger = EventLogger::new(Arc::clone(&gateway));
        let end_transport = preferred_end_transport(Arc::clone(&gateway));
        Self::new_with_dependencies(gateway, logger, end_transport, ControllerConfig::default())
    }

    pub fn new_with_dependencies(
        gateway: Arc<ApiGateway>,
        logger: EventLogger,
        end_transport: Arc<dyn SessionEndTransport>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            gateway,
            logger,
            end_transport,
            countdown: Countdown::new(),
            config,
            inner: Mutex::new(ControllerState::new()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }

    pub async fn phase(&self) -> Phase {
        self.inner.lock().await.session.phase()
    }

    pub async fn condition(&self) -> Option<Condition> {
        self.inner.lock().await.session.condition()
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.inner.lock().await.session.session_id().cloned()
    }

    pub async fn survey_return_url(&self) -> Option<Url> {
        self.inner.lock().await.session.survey_return_url().cloned()
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.transcript.messages().to_vec()
    }

    pub async fn is_sending(&self) -> bool {
        self.inner.lock().await.transcript.is_sending()
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.countdown.remaining()
    }

    /// Establishes a session from launch parameters. Runs at most once per
    /// host mount; a completed bootstrap can be repeated after a full reset
    /// of session and transcript state so stale and fresh identifiers
    /// cannot mix, while a call made during an in-flight bootstrap is
    /// ignored.
    pub async fn bootstrap(self: &Arc<Self>, params: LaunchParams) -> Result<(), BootstrapError> {
        let started_at = tokio::time::Instant::now();
        {
            let mut state = self.inner.lock().await;
            if state.bootstrapping {
                warn!("bootstrap already in progress; ignoring");
                return Ok(());
            }
            state.reset_for_bootstrap();
            state.bootstrapping = true;
        }
        self.logger.clear_identity();
        self.countdown.cancel();

        let launch = match self.resolve_launch(params) {
            Ok(launch) => launch,
            Err(err) => {
                self.logger
                    .log("invalid_url_params", json!({ "reason": err.to_string() }));
                let mut state = self.inner.lock().await;
                state.bootstrapping = false;
                self.transition(&mut state, Phase::Error);
                return Err(err);
            }
        };

        {
            let mut state = self.inner.lock().await;
            state.session.begin_bootstrap(
                launch.participant_id.clone(),
                launch.demo,
                launch.survey_return_url.clone(),
            );
        }
        self.logger
            .set_identity(None, Some(launch.participant_id.clone()));
        self.logger.log(
            "app_mounted_success",
            json!({
                "participant_id": launch.participant_id,
                "condition_name": launch.condition.name(),
                "demo_mode": launch.demo,
            }),
        );

        let condition_name = launch.condition.name();
        let response = match self
            .gateway
            .start_session(&launch.participant_id, &condition_name)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.logger.log(
                    "session_start_failed",
                    json!({
                        "condition_name_sent": condition_name,
                        "error_detail": err.to_string(),
                    }),
                );
                let mut state = self.inner.lock().await;
                state.bootstrapping = false;
                self.transition(&mut state, Phase::Error);
                return Err(BootstrapError::StartFailed(err));
            }
        };

        {
            let mut state = self.inner.lock().await;
            state
                .session
                .adopt_session(response.session_id.clone(), response.condition);
            state.transcript.set_initial_history(&response.initial_history);
        }
        self.logger.set_identity(
            Some(response.session_id.clone()),
            Some(launch.participant_id.clone()),
        );
        self.logger.log(
            "session_start_success",
            json!({
                "condition_name_sent": condition_name,
                "backend_condition_received": response.condition,
            }),
        );
        info!(
            session_id = %response.session_id,
            participant_id = %launch.participant_id,
            condition = %response.condition.name(),
            "session started"
        );

        // The loading screen stays up for its minimum display time even
        // when the backend answers quickly.
        let elapsed = started_at.elapsed();
        if elapsed < self.config.loading_min_display {
            tokio::time::sleep(self.config.loading_min_display - elapsed).await;
        }

        let mut state = self.inner.lock().await;
        state.bootstrapping = false;
        if state.session.phase() == Phase::Loading {
            self.transition(&mut state, Phase::Intro);
        }
        Ok(())
    }

    /// Intro acknowledged: avatar configuration when the condition carries
    /// an avatar, otherwise straight into the chat.
    pub async fn complete_intro(self: &Arc<Self>) {
        let mut state = self.inner.lock().await;
        if state.session.phase() != Phase::Intro {
            warn!(phase = %state.session.phase(), "complete_intro ignored outside intro");
            return;
        }
        let Some(condition) = state.session.condition() else {
            warn!("complete_intro without an adopted condition");
            return;
        };
        if condition.avatar_enabled {
            self.transition(&mut state, Phase::Avatar);
        } else {
            self.enter_chat(&mut state);
        }
    }

    pub async fn confirm_premade_avatar(self: &Arc<Self>, url: &str) {
        self.confirm_avatar(AvatarSelection::Premade {
            url: url.to_string(),
        })
        .await;
    }

    pub async fn confirm_generated_avatar(self: &Arc<Self>, url: &str, prompt: &str) {
        self.confirm_avatar(AvatarSelection::Generated {
            url: url.to_string(),
            prompt: prompt.to_string(),
        })
        .await;
    }

    async fn confirm_avatar(self: &Arc<Self>, selection: AvatarSelection) {
        let session_id = {
            let mut state = self.inner.lock().await;
            if state.session.phase() != Phase::Avatar {
                warn!(phase = %state.session.phase(), "avatar confirmation ignored outside avatar phase");
                return;
            }
            let Some(session_id) = state.session.session_id().cloned() else {
                warn!("avatar confirmation without a session id");
                return;
            };
            state.session.set_avatar(selection.clone());
            session_id
        };

        let flavor = match &selection {
            AvatarSelection::Premade { .. } => "premade",
            AvatarSelection::Generated { .. } => "generated",
        };
        // Best-effort: the chat starts either way.
        match self.gateway.set_avatar_details(&session_id, &selection).await {
            Ok(()) => self.logger.log(
                &format!("{flavor}_avatar_details_sent"),
                json!({ "avatar_url": selection.url() }),
            ),
            Err(err) => self.logger.log(
                &format!("{flavor}_avatar_details_send_failed"),
                json!({
                    "avatar_url": selection.url(),
                    "error_detail": err.to_string(),
                }),
            ),
        }

        let mut state = self.inner.lock().await;
        if state.session.phase() == Phase::Avatar {
            self.enter_chat(&mut state);
        }
    }

    /// Requests one avatar generation. Bounded client-side as a UX guard;
    /// the backend enforces the real limit.
    pub async fn generate_avatar(
        self: &Arc<Self>,
        prompt: &str,
    ) -> Result<GenerateAvatarResponse, AvatarGenerationError> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            return Err(AvatarGenerationError::EmptyPrompt);
        }
        if trimmed.chars().count() > AVATAR_PROMPT_CHAR_LIMIT {
            return Err(AvatarGenerationError::PromptTooLong);
        }

        let session_id = {
            let state = self.inner.lock().await;
            if state.session.phase() != Phase::Avatar {
                return Err(AvatarGenerationError::Unavailable);
            }
            if state.generation_count >= MAX_AVATAR_GENERATIONS {
                return Err(AvatarGenerationError::QuotaExhausted);
            }
            state
                .session
                .session_id()
                .cloned()
                .ok_or(AvatarGenerationError::Unavailable)?
        };

        self.logger
            .log("generate_avatar_clicked", json!({ "prompt": trimmed }));

        match self.gateway.generate_avatar(&session_id, trimmed).await {
            Ok(generated) => {
                let mut state = self.inner.lock().await;
                state.generation_count += 1;
                Ok(generated)
            }
            Err(err) => {
                self.logger.log(
                    "avatar_generation_failed",
                    json!({ "error_detail": err.to_string() }),
                );
                let display = err
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| GENERIC_GENERATION_FAILURE.to_string());
                Err(AvatarGenerationError::Rejected(display))
            }
        }
    }

    /// Accepts one chat turn. A no-op when the text is blank, a send is
    /// already in flight, or the session has ended.
    pub async fn send_chat_message(self: &Arc<Self>, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let session_id = {
            let mut state = self.inner.lock().await;
            if state.session.phase() != Phase::Chat || state.ended {
                return;
            }
            if state.transcript.is_sending() {
                return;
            }
            let Some(session_id) = state.session.session_id().cloned() else {
                warn!("chat send without a session id");
                return;
            };
            state.transcript.push_user(trimmed);
            state.transcript.push_thinking();
            state.transcript.set_sending(true);
            session_id
        };
        let _ = self.events.send(FlowEvent::TranscriptUpdated);

        let reply = match self.gateway.send_message(&session_id, trimmed).await {
            Ok(response) => response.response,
            Err(err) => {
                self.logger.log(
                    "message_send_failed",
                    json!({ "error_detail": err.to_string() }),
                );
                FALLBACK_BOT_REPLY.to_string()
            }
        };

        let mut state = self.inner.lock().await;
        state.transcript.resolve_thinking(reply);
        state.transcript.set_sending(false);
        drop(state);
        let _ = self.events.send(FlowEvent::TranscriptUpdated);
    }

    /// One-shot session end: decide the terminal phase, then notify the
    /// backend best-effort. Notification failure never reverts the
    /// already-decided transition.
    pub async fn finish_session(self: &Arc<Self>) {
        let (session_id, target) = {
            let mut state = self.inner.lock().await;
            if state.ended || state.session.phase() != Phase::Chat {
                return;
            }
            state.ended = true;
            let target = if state.session.demo_mode() {
                Phase::DemoEnd
            } else {
                Phase::Survey
            };
            self.transition(&mut state, target);
            (state.session.session_id().cloned(), target)
        };
        self.countdown.cancel();

        if let Some(session_id) = session_id {
            if let Err(err) = self.end_transport.notify_session_end(&session_id).await {
                warn!(session_id = %session_id, error = %err, "session end notification failed");
            }
        }
        self.logger
            .log("chat_timer_expired", json!({ "target_phase": target }));
    }

    /// Host teardown: clears the pending countdown.
    pub fn shutdown(&self) {
        self.countdown.cancel();
    }

    fn enter_chat(self: &Arc<Self>, state: &mut ControllerState) {
        self.transition(state, Phase::Chat);
        let controller = Arc::downgrade(self);
        self.countdown.start(
            self.config.chat_duration_seconds,
            Arc::new(move || {
                if let Some(controller) = controller.upgrade() {
                    tokio::spawn(async move {
                        controller.finish_session().await;
                    });
                }
            }),
        );
    }

    fn transition(&self, state: &mut ControllerState, to: Phase) {
        let from = state.session.phase();
        state.session.set_phase(to);
        info!(from = %from, to = %to, "phase transition");
        self.logger
            .log("phase_change", json!({ "from": from, "to": to }));
        let _ = self.events.send(FlowEvent::PhaseChanged { from, to });
    }

    fn resolve_launch(&self, params: LaunchParams) -> Result<LaunchContext, BootstrapError> {
        match params {
            LaunchParams::Demo => Ok(LaunchContext {
                participant_id: ParticipantId::new(format!(
                    "{DEMO_PARTICIPANT_PREFIX}_{}",
                    Uuid::new_v4().simple()
                )),
                condition: Condition {
                    avatar_enabled: true,
                    avatar_type: AvatarType::Premade,
                    adaptive_style: true,
                },
                survey_return_url: None,
                demo: true,
            }),
            LaunchParams::Experiment {
                participant_id,
                avatar,
                style,
                response_token,
            } => {
                let participant_id = required(participant_id, "participant id")?;
                let avatar = required(avatar, "avatar descriptor")?;
                let style = required(style, "style descriptor")?;
                let response_token = required(response_token, "survey response token")?;

                let condition = Condition::from_name(&format!("{avatar}_{style}"))
                    .map_err(|err| BootstrapError::InvalidLaunchParams(err.to_string()))?;
                let survey_return_url = Url::parse_with_params(
                    &self.config.survey_base_url,
                    &[("Q_R", response_token.as_str()), ("Q_R_DEL", "1")],
                )
                .map_err(|err| {
                    BootstrapError::InvalidLaunchParams(format!("survey base url: {err}"))
                })?;

                Ok(LaunchContext {
                    participant_id: ParticipantId::new(participant_id),
                    condition,
                    survey_return_url: Some(survey_return_url),
                    demo: false,
                })
            }
        }
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, BootstrapError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(BootstrapError::InvalidLaunchParams(name.to_string())),
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
