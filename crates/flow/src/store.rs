//! Narrow, explicitly-scoped state containers with a fixed action surface.
//! Both are plain structs owned by the orchestrator; neither is reachable
//! as an ambient singleton.

use shared::{
    domain::{AvatarSelection, ChatMessage, Condition, ParticipantId, Phase, Sender, SessionId},
    protocol::HistoryEntry,
};
use tracing::warn;
use url::Url;

/// Placeholder text rendered while a bot reply is in flight.
pub const THINKING_TEXT: &str = "...";

/// Source of truth for phase, session identity, condition, and avatar
/// state. Mutated only through its own actions.
#[derive(Debug)]
pub struct SessionStore {
    phase: Phase,
    session_id: Option<SessionId>,
    participant_id: Option<ParticipantId>,
    condition: Option<Condition>,
    avatar: Option<AvatarSelection>,
    survey_return_url: Option<Url>,
    demo_mode: bool,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            phase: Phase::Loading,
            session_id: None,
            participant_id: None,
            condition: None,
            avatar: None,
            survey_return_url: None,
            demo_mode: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn participant_id(&self) -> Option<&ParticipantId> {
        self.participant_id.as_ref()
    }

    pub fn condition(&self) -> Option<Condition> {
        self.condition
    }

    pub fn avatar(&self) -> Option<&AvatarSelection> {
        self.avatar.as_ref()
    }

    pub fn survey_return_url(&self) -> Option<&Url> {
        self.survey_return_url.as_ref()
    }

    pub fn demo_mode(&self) -> bool {
        self.demo_mode
    }

    /// Full reset plus the identity derived once from launch parameters.
    pub fn begin_bootstrap(
        &mut self,
        participant_id: ParticipantId,
        demo_mode: bool,
        survey_return_url: Option<Url>,
    ) {
        *self = Self::new();
        self.participant_id = Some(participant_id);
        self.demo_mode = demo_mode;
        self.survey_return_url = survey_return_url;
    }

    /// Adopts the backend-assigned identity and authoritative condition.
    /// The session id is set at most once; a second adoption is ignored.
    pub fn adopt_session(&mut self, session_id: SessionId, condition: Condition) {
        if let Some(existing) = &self.session_id {
            warn!(
                existing = %existing,
                rejected = %session_id,
                "session id already set; ignoring second adoption"
            );
            return;
        }
        self.session_id = Some(session_id);
        self.condition = Some(condition);
    }

    pub fn set_avatar(&mut self, selection: AvatarSelection) {
        self.avatar = Some(selection);
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Ordered message log plus the in-flight-send flag. Resettable
/// independently of session identity.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    messages: Vec<ChatMessage>,
    pending: Option<usize>,
    sending: bool,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn set_sending(&mut self, sending: bool) {
        self.sending = sending;
    }

    pub fn set_initial_history(&mut self, history: &[HistoryEntry]) {
        self.messages = history
            .iter()
            .filter_map(HistoryEntry::to_chat_message)
            .collect();
        self.pending = None;
        self.sending = false;
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::user(text));
    }

    /// Appends the single thinking placeholder. Returns false (appending
    /// nothing) when one is already live.
    pub fn push_thinking(&mut self) -> bool {
        if self.pending.is_some() {
            warn!("thinking placeholder already pending; not appending another");
            return false;
        }
        self.messages.push(ChatMessage {
            sender: Sender::BotThinking,
            text: THINKING_TEXT.to_string(),
        });
        self.pending = Some(self.messages.len() - 1);
        true
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Replaces the live placeholder in place, preserving order.
    pub fn resolve_thinking(&mut self, text: impl Into<String>) {
        let Some(index) = self.pending.take() else {
            warn!("no thinking placeholder to resolve");
            return;
        };
        if let Some(slot) = self.messages.get_mut(index) {
            *slot = ChatMessage::bot(text);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
