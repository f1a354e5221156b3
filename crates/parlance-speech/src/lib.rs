//! Parlance Speech — STT/TTS adapters and audio blob storage.

pub mod blob;
pub mod stt;
pub mod tts;

pub use blob::{AudioStore, FsAudioStore};
pub use stt::{SpeechToText, Transcription, WhisperApi};
pub use tts::{AudioByteStream, SpeechApi, SpeechSynthesizer, SynthesisConfig};
