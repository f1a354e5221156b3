//! Reply schema definition and payload validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parlance_core::{Error, Result};

/// Caller-supplied shape of the model's structured reply, exposed to the
/// model as a forced tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplySchema {
    /// Tool/function name the model is forced to call.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool arguments.
    pub parameters: Value,
}

impl ReplySchema {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Validate a raw tool-call payload against the reply schema.
///
/// Validation failures are reported as `SchemaValidation`, distinct from
/// upstream errors, so callers can tell "the model behaved unexpectedly"
/// from "the model didn't answer".
pub fn validate_payload(schema: &Value, payload: &Value) -> Result<()> {
    let validator = jsonschema::options()
        .build(schema)
        .map_err(|e| Error::Config(format!("invalid reply schema: {}", e)))?;

    validator
        .validate(payload)
        .map_err(|e| Error::SchemaValidation(e.to_string()))
}
