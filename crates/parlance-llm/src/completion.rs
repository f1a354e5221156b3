//! Structured-completion adapter.
//!
//! Wraps an OpenAI-compatible `/chat/completions` call with a forced tool
//! choice, then refuses to hand back anything that is truncated, missing, or
//! schema-invalid. A truncated structured payload is unsafe to parse and must
//! never reach the caller as if complete.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::schema::{validate_payload, ReplySchema};
use parlance_core::{Error, Result};

const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

/// One message of the budgeted context, in wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

/// Model selection and sampling parameters for one completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Required shape of the structured reply.
    pub schema: ReplySchema,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> usize {
    1024
}

impl ModelConfig {
    pub fn new(schema: ReplySchema) -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            schema,
        }
    }
}

/// Boundary for obtaining a schema-validated structured reply.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, messages: &[ContextMessage], config: &ModelConfig) -> Result<Value>;
}

/// Production backend: OpenAI-compatible chat completions with tools.
pub struct ChatCompletionsApi {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionsApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(COMPLETION_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from environment: `LLM_API_URL`, `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("LLM_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY is not set".to_string()))?;
        Self::new(base_url, api_key)
    }
}

#[async_trait]
impl CompletionModel for ChatCompletionsApi {
    async fn complete(&self, messages: &[ContextMessage], config: &ModelConfig) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": config.model,
            "messages": messages,
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
            "tools": [{
                "type": "function",
                "function": {
                    "name": config.schema.name,
                    "description": config.schema.description,
                    "parameters": config.schema.parameters,
                }
            }],
            "tool_choice": {
                "type": "function",
                "function": { "name": config.schema.name }
            },
        });

        debug!(
            "Completing {} messages with model {}",
            messages.len(),
            config.model
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("LLM API error {}: {}", status, body)));
        }

        let raw: Value = response.json().await.map_err(|e| Error::Http(e.to_string()))?;
        parse_completion(&raw, &config.schema)
    }
}

/// Extract and validate the structured payload from a raw completion
/// response.
///
/// Kept separate from the HTTP call so the taxonomy is unit-testable:
/// - finish reason `length` means the payload was cut off — `TruncatedResponse`;
/// - no tool call present — `NoStructuredOutput`;
/// - arguments unparseable or schema-invalid — `SchemaValidation`.
pub fn parse_completion(response: &Value, schema: &ReplySchema) -> Result<Value> {
    let choice = &response["choices"][0];

    if choice["finish_reason"].as_str() == Some("length") {
        return Err(Error::TruncatedResponse(
            "finish_reason=length; structured payload may be cut off".into(),
        ));
    }

    let arguments = choice["message"]["tool_calls"][0]["function"]["arguments"]
        .as_str()
        .ok_or_else(|| {
            Error::NoStructuredOutput("response carried no tool call payload".into())
        })?;

    let payload: Value = serde_json::from_str(arguments)
        .map_err(|e| Error::SchemaValidation(format!("arguments are not valid JSON: {}", e)))?;

    validate_payload(&schema.parameters, &payload)?;
    Ok(payload)
}
