//! Conversation turn types shared across the pipeline.

use serde::{Deserialize, Serialize};

/// Speaker of a turn. Exactly one `System` turn exists per session, always first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted utterance in a conversation.
///
/// `pair_id` links exactly one user turn with at most one assistant turn that
/// answers it; the system turn has no pair. `audio_ref` points at stored audio
/// bytes (path or URL), never the bytes themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
    /// Unix millis. Never changes after insert.
    pub created_at: i64,
    /// Unix millis. Changes once, when audio is attached after text.
    pub updated_at: i64,
}

/// Insert payload for a turn. The store assigns `id` and timestamps.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub session_id: String,
    pub pair_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub audio_ref: Option<String>,
}

impl NewTurn {
    pub fn system(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            pair_id: None,
            role: Role::System,
            content: content.into(),
            audio_ref: None,
        }
    }

    pub fn user(
        session_id: impl Into<String>,
        pair_id: impl Into<String>,
        content: impl Into<String>,
        audio_ref: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            pair_id: Some(pair_id.into()),
            role: Role::User,
            content: content.into(),
            audio_ref,
        }
    }

    pub fn assistant(
        session_id: impl Into<String>,
        pair_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            pair_id: Some(pair_id.into()),
            role: Role::Assistant,
            content: content.into(),
            audio_ref: None,
        }
    }
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
