//! Speech-to-text adapter.
//!
//! Wraps an OpenAI-compatible `/audio/transcriptions` endpoint. Raw audio is
//! persisted to the blob store before transcription so a reference exists
//! even when the upstream call fails partway; a transcription failure still
//! fails the whole turn. No retry policy lives here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::blob::AudioStore;
use parlance_core::{Error, Result};

const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Transcription result: the text plus a durable reference to the stored
/// input audio.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub audio_ref: String,
}

/// Boundary for converting caller audio into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one utterance. `prompt` disambiguates vocabulary;
    /// `language` is an ISO-639-1 hint.
    async fn transcribe(
        &self,
        audio: &[u8],
        prompt: Option<&str>,
        language: Option<&str>,
    ) -> Result<Transcription>;
}

/// Production backend: OpenAI-compatible transcription API (OpenAI Whisper,
/// Groq, etc.).
pub struct WhisperApi {
    base_url: String,
    api_key: String,
    model: String,
    audio_extension: String,
    audio_store: Arc<dyn AudioStore>,
    client: reqwest::Client,
}

impl WhisperApi {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        audio_store: Arc<dyn AudioStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(STT_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            audio_extension: "wav".into(),
            audio_store,
            client,
        })
    }

    /// Build from environment: `STT_API_URL`, `OPENAI_API_KEY`, `STT_MODEL`.
    pub fn from_env(audio_store: Arc<dyn AudioStore>) -> Result<Self> {
        let base_url = std::env::var("STT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY is not set".to_string()))?;
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        Self::new(base_url, api_key, model, audio_store)
    }

    /// Extension used when persisting incoming audio (default `wav`).
    pub fn with_audio_extension(mut self, extension: impl Into<String>) -> Self {
        self.audio_extension = extension.into();
        self
    }
}

#[async_trait]
impl SpeechToText for WhisperApi {
    async fn transcribe(
        &self,
        audio: &[u8],
        prompt: Option<&str>,
        language: Option<&str>,
    ) -> Result<Transcription> {
        if audio.is_empty() {
            return Err(Error::Transcription("empty audio payload".into()));
        }

        // Persist first: the reference must exist even if the upstream call
        // fails from here on.
        let audio_ref = self.audio_store.put(audio, &self.audio_extension)?;

        let url = format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", self.audio_extension))
            .mime_str("application/octet-stream")
            .map_err(|e| Error::Transcription(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(prompt) = prompt {
            form = form.text("prompt", prompt.to_string());
        }
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        debug!("Transcribing {} bytes via {}", audio.len(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "STT API error {}: {}",
                status, body
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| Error::Transcription("response carried no text field".into()))?
            .trim()
            .to_string();

        Ok(Transcription { text, audio_ref })
    }
}
