//! Parlance Pipeline — the conversational turn orchestrator.
//!
//! Takes a spoken utterance, transcribes it, assembles a token-budgeted
//! context, obtains a structured model reply, synthesizes it to audio, and
//! streams every intermediate artifact back to the caller while persisting a
//! durable ordered transcript. Adapters for speech-to-text, completion, and
//! synthesis are injected; see `parlance-speech` and `parlance-llm` for the
//! production backends.

pub mod events;
pub mod guard;
pub mod orchestrator;

pub use events::{ErrorKind, TurnEvent};
pub use guard::InFlightSessions;
pub use orchestrator::{TurnPipeline, TurnRequest};
