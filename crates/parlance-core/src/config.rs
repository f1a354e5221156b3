//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default token ceiling for the budgeted context.
pub const DEFAULT_TOKEN_CEILING: usize = 128_000;

/// Default headroom reserved for the model's own reply tokens.
pub const DEFAULT_REPLY_MARGIN: usize = 4_096;

/// Schema field whose string value is persisted and synthesized by default.
pub const DEFAULT_SPEECH_FIELD: &str = "message";

/// Paths to all pipeline data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Transcript database directory (`data/transcripts/`).
    pub transcripts: PathBuf,
    /// Persisted audio blobs (`data/audio/`).
    pub audio: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            transcripts: root.join("transcripts"),
            audio: root.join("audio"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.transcripts)?;
        std::fs::create_dir_all(&self.audio)?;
        Ok(())
    }
}

/// Turn pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// System prompt inserted as the first turn of every new session.
    pub system_prompt: String,
    /// Hard token ceiling for the budgeted context.
    #[serde(default = "default_ceiling")]
    pub token_ceiling: usize,
    /// Headroom subtracted from the ceiling before history selection.
    #[serde(default = "default_margin")]
    pub reply_margin: usize,
    /// Name of the structured-reply field that is persisted and spoken.
    #[serde(default = "default_speech_field")]
    pub speech_field: String,
}

fn default_ceiling() -> usize {
    DEFAULT_TOKEN_CEILING
}
fn default_margin() -> usize {
    DEFAULT_REPLY_MARGIN
}
fn default_speech_field() -> String {
    DEFAULT_SPEECH_FIELD.into()
}

impl PipelineConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            token_ceiling: DEFAULT_TOKEN_CEILING,
            reply_margin: DEFAULT_REPLY_MARGIN,
            speech_field: DEFAULT_SPEECH_FIELD.into(),
        }
    }

    /// Load from a JSON file, falling back to defaults for absent fields.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&raw)?;
        if config.reply_margin >= config.token_ceiling {
            return Err(crate::Error::Config(format!(
                "reply_margin ({}) must be below token_ceiling ({})",
                config.reply_margin, config.token_ceiling
            )));
        }
        Ok(config)
    }
}
