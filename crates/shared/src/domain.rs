use serde::{Deserialize, Serialize};

use crate::error::InvalidConditionName;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(SessionId);
id_newtype!(ParticipantId);

/// Experiment phases, in the order the participant moves through them.
/// `Error`, `Survey`, and `DemoEnd` are terminal for the run's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    Intro,
    Avatar,
    Chat,
    Survey,
    DemoEnd,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Survey | Phase::DemoEnd | Phase::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Loading => "loading",
            Phase::Intro => "intro",
            Phase::Avatar => "avatar",
            Phase::Chat => "chat",
            Phase::Survey => "survey",
            Phase::DemoEnd => "demo_end",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarType {
    None,
    Premade,
    Generated,
}

impl AvatarType {
    pub fn as_str(self) -> &'static str {
        match self {
            AvatarType::None => "none",
            AvatarType::Premade => "premade",
            AvatarType::Generated => "generated",
        }
    }
}

impl std::fmt::Display for AvatarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Experimental treatment assignment. The backend's returned condition is
/// authoritative even over a client-requested guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub avatar_enabled: bool,
    pub avatar_type: AvatarType,
    pub adaptive_style: bool,
}

impl Condition {
    /// Parses the wire encoding `<avatar>_<style>`, e.g. `premade_adaptive`
    /// or `none_static`. Exactly six names are valid.
    pub fn from_name(name: &str) -> Result<Self, InvalidConditionName> {
        let lowered = name.trim().to_ascii_lowercase();
        let (avatar, style) = lowered
            .rsplit_once('_')
            .ok_or_else(|| InvalidConditionName(name.to_string()))?;

        let avatar_type = match avatar {
            "none" => AvatarType::None,
            "premade" => AvatarType::Premade,
            "generated" => AvatarType::Generated,
            _ => return Err(InvalidConditionName(name.to_string())),
        };
        let adaptive_style = match style {
            "static" => false,
            "adaptive" => true,
            _ => return Err(InvalidConditionName(name.to_string())),
        };

        Ok(Self {
            avatar_enabled: avatar_type != AvatarType::None,
            avatar_type,
            adaptive_style,
        })
    }

    pub fn name(&self) -> String {
        let style = if self.adaptive_style {
            "adaptive"
        } else {
            "static"
        };
        format!("{}_{style}", self.avatar_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
    #[serde(rename = "bot-thinking")]
    BotThinking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
        }
    }
}

/// The participant's chosen companion image; variants are mutually
/// exclusive per condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarSelection {
    Premade { url: String },
    Generated { url: String, prompt: String },
}

impl AvatarSelection {
    pub fn url(&self) -> &str {
        match self {
            AvatarSelection::Premade { url } => url,
            AvatarSelection::Generated { url, .. } => url,
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        match self {
            AvatarSelection::Premade { .. } => None,
            AvatarSelection::Generated { prompt, .. } => Some(prompt),
        }
    }
}
