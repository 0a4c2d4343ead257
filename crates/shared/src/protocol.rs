//! Wire DTOs for the study backend's HTTP surface. The backend is a
//! camelCase JSON API; every body here renames accordingly.

use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, Condition, ParticipantId, Sender, SessionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub participant_id: ParticipantId,
    pub condition_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: SessionId,
    pub condition: Condition,
    #[serde(default)]
    pub initial_history: Vec<HistoryEntry>,
}

/// One turn of pre-seeded conversation history, in the backend's
/// `{role, content}` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl HistoryEntry {
    /// Entries with a blank role or content carry no displayable turn and
    /// map to `None`.
    pub fn to_chat_message(&self) -> Option<ChatMessage> {
        if self.role.trim().is_empty() || self.content.trim().is_empty() {
            return None;
        }
        let sender = if self.role == "assistant" {
            Sender::Bot
        } else {
            Sender::User
        };
        Some(ChatMessage {
            sender,
            text: self.content.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub session_id: SessionId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAvatarDetailsRequest {
    pub session_id: SessionId,
    pub avatar_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAvatarRequest {
    pub session_id: SessionId,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateAvatarResponse {
    pub url: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendEventRequest {
    pub session_id: Option<SessionId>,
    pub participant_id: Option<ParticipantId>,
    pub event_type: String,
    pub event_data: serde_json::Value,
}
