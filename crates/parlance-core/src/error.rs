//! Error taxonomy for the turn pipeline.
//!
//! Every variant is terminal for the current turn: the pipeline never retries
//! internally, and partial work already persisted is never rolled back.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Model returned no structured output: {0}")]
    NoStructuredOutput(String),

    #[error("Model response truncated by length limit: {0}")]
    TruncatedResponse(String),

    #[error("Structured reply failed schema validation: {0}")]
    SchemaValidation(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Duplicate turn: session={session_id} pair={pair_id} role={role}")]
    DuplicateTurn {
        session_id: String,
        pair_id: String,
        role: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session busy: {0} already has a turn in flight")]
    SessionBusy(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
