//! Parlance LLM — structured completion with schema-validated replies.

pub mod completion;
pub mod schema;

pub use completion::{
    parse_completion, ChatCompletionsApi, CompletionModel, ContextMessage, ModelConfig,
};
pub use schema::{validate_payload, ReplySchema};
