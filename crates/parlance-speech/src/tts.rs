//! Text-to-speech adapter.
//!
//! Produces audio as a lazy, finite, single-consumption byte-chunk stream:
//! chunks are yielded as they arrive from the upstream synthesizer, and
//! re-invoking `synthesize` re-synthesizes from scratch. Upstream errors
//! terminate the stream as `Error::Synthesis` without trailing partial
//! chunks.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::debug;

use parlance_core::{Error, Result};

/// Single-consumption stream of synthesized audio chunks.
pub type AudioByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Voice and output-format selection for one synthesis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Container format (`mp3`, `opus`, `aac`, `flac`, `wav`, `pcm`); also
    /// used as the blob file extension.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_model() -> String {
    "tts-1".into()
}
fn default_voice() -> String {
    "alloy".into()
}
fn default_format() -> String {
    "mp3".into()
}
fn default_speed() -> f32 {
    1.0
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            voice: default_voice(),
            format: default_format(),
            speed: default_speed(),
        }
    }
}

/// Boundary for rendering text to an audio chunk stream.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str, config: &SynthesisConfig) -> AudioByteStream;
}

/// Production backend: OpenAI-compatible `/audio/speech` API, consumed
/// incrementally.
pub struct SpeechApi {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SpeechApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from environment: `TTS_API_URL`, `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self::new(base_url, api_key))
    }
}

impl SpeechSynthesizer for SpeechApi {
    fn synthesize(&self, text: &str, config: &SynthesisConfig) -> AudioByteStream {
        let client = self.client.clone();
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let api_key = self.api_key.clone();
        let body = serde_json::json!({
            "model": config.model,
            "input": text,
            "voice": config.voice,
            "response_format": config.format,
            "speed": config.speed,
        });

        Box::pin(async_stream::stream! {
            debug!("Synthesizing {} chars via {}", body["input"].as_str().map(str::len).unwrap_or(0), url);

            let response = match client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    yield Err(Error::Synthesis(format!("Request failed: {}", e)));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                yield Err(Error::Synthesis(format!("TTS API error {}: {}", status, body)));
                return;
            }

            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) if bytes.is_empty() => continue,
                    Ok(bytes) => yield Ok(bytes),
                    Err(e) => {
                        yield Err(Error::Synthesis(format!("Stream read error: {}", e)));
                        return;
                    }
                }
            }
        })
    }
}
