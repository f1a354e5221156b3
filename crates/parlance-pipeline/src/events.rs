//! Caller-facing turn events.

use bytes::Bytes;
use serde::Serialize;

use parlance_core::{Error, Turn};

/// One event in the finite, consume-once sequence returned by
/// `produce_turn`. The sequence ends with either `Complete` or `Error`.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Transcription finished and the user turn is persisted.
    Transcribed { text: String, audio_ref: String },
    /// Structured reply obtained and the assistant turn is persisted.
    AssistantText { text: String },
    /// One synthesized audio chunk, in arrival order.
    AudioChunk { bytes: Bytes },
    /// The turn failed; no further events follow.
    Error { kind: ErrorKind, message: String },
    /// The turn finished; carries the full ordered transcript.
    Complete {
        session_id: String,
        history: Vec<Turn>,
    },
}

/// Stable error discriminant for callers that match on failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transcription,
    NoStructuredOutput,
    TruncatedResponse,
    SchemaValidation,
    Synthesis,
    DuplicateTurn,
    NotFound,
    SessionBusy,
    Internal,
}

impl ErrorKind {
    pub fn of(error: &Error) -> Self {
        match error {
            Error::Transcription(_) => ErrorKind::Transcription,
            Error::NoStructuredOutput(_) => ErrorKind::NoStructuredOutput,
            Error::TruncatedResponse(_) => ErrorKind::TruncatedResponse,
            Error::SchemaValidation(_) => ErrorKind::SchemaValidation,
            Error::Synthesis(_) => ErrorKind::Synthesis,
            Error::DuplicateTurn { .. } => ErrorKind::DuplicateTurn,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::SessionBusy(_) => ErrorKind::SessionBusy,
            _ => ErrorKind::Internal,
        }
    }
}
