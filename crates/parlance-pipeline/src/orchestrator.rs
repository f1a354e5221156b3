//! Turn orchestrator.
//!
//! Drives one full turn: receive audio, transcribe, persist the user turn,
//! budget the context, complete, persist the assistant turn, synthesize, and
//! emit events throughout. The turn runs on a background task; the caller
//! consumes a finite event stream and may walk away at any point. Detachment
//! suppresses emission only — every persistence step still happens, so the
//! transcript stays complete and replayable even if no one was listening.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{ErrorKind, TurnEvent};
use crate::guard::InFlightSessions;
use parlance_context::{budget_context, BudgetConfig, TokenCounter};
use parlance_core::{Error, NewTurn, PipelineConfig, Result, Role};
use parlance_llm::{CompletionModel, ContextMessage, ModelConfig};
use parlance_speech::{AudioStore, SpeechSynthesizer, SpeechToText, SynthesisConfig};
use parlance_store::TranscriptStore;

/// One turn request: session scope, the utterance audio, and per-call model
/// and voice configuration.
#[derive(Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub audio: Vec<u8>,
    /// Optional vocabulary-disambiguation prompt for transcription.
    pub transcription_hint: Option<String>,
    /// Optional ISO-639-1 target-language hint.
    pub language: Option<String>,
    pub model: ModelConfig,
    pub synthesis: SynthesisConfig,
}

/// The conversational turn pipeline. Adapters and the store are injected, so
/// tests run against doubles; all state for a turn lives in the task frame
/// processing it, and sessions never contend with each other.
pub struct TurnPipeline {
    store: Arc<TranscriptStore>,
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn CompletionModel>,
    tts: Arc<dyn SpeechSynthesizer>,
    audio_store: Arc<dyn AudioStore>,
    counter: Arc<dyn TokenCounter>,
    config: PipelineConfig,
    in_flight: InFlightSessions,
}

impl TurnPipeline {
    pub fn new(
        store: Arc<TranscriptStore>,
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn CompletionModel>,
        tts: Arc<dyn SpeechSynthesizer>,
        audio_store: Arc<dyn AudioStore>,
        counter: Arc<dyn TokenCounter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            stt,
            llm,
            tts,
            audio_store,
            counter,
            config,
            in_flight: InFlightSessions::new(),
        }
    }

    /// Run one turn, returning its event stream.
    ///
    /// The stream is finite and consumed once; the sequence ends with
    /// `Complete` or `Error`. Dropping the stream detaches the caller but
    /// never cancels the work in progress.
    pub fn produce_turn(&self, request: TurnRequest) -> UnboundedReceiverStream<TurnEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = TurnWorker {
            store: self.store.clone(),
            stt: self.stt.clone(),
            llm: self.llm.clone(),
            tts: self.tts.clone(),
            audio_store: self.audio_store.clone(),
            counter: self.counter.clone(),
            config: self.config.clone(),
            in_flight: self.in_flight.clone(),
        };

        tokio::spawn(async move {
            let mut emitter = Emitter::new(tx);
            if let Err(err) = worker.run(&request, &mut emitter).await {
                error!(
                    "Turn failed for session {}: {}",
                    request.session_id, err
                );
                emitter.emit(TurnEvent::Error {
                    kind: ErrorKind::of(&err),
                    message: err.to_string(),
                });
            }
        });

        UnboundedReceiverStream::new(rx)
    }
}

/// Per-turn worker owning clones of the shared collaborators.
struct TurnWorker {
    store: Arc<TranscriptStore>,
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn CompletionModel>,
    tts: Arc<dyn SpeechSynthesizer>,
    audio_store: Arc<dyn AudioStore>,
    counter: Arc<dyn TokenCounter>,
    config: PipelineConfig,
    in_flight: InFlightSessions,
}

impl TurnWorker {
    async fn run(&self, request: &TurnRequest, emitter: &mut Emitter) -> Result<()> {
        // One in-flight turn per session; released when this frame unwinds.
        let _permit = self
            .in_flight
            .acquire(&request.session_id)
            .ok_or_else(|| Error::SessionBusy(request.session_id.clone()))?;

        // Each attempt mints a fresh pair id; a failed attempt leaves its
        // user turn behind as a half pair rather than being retried in place.
        let pair_id = Uuid::new_v4().to_string();
        info!(
            "Turn started: session={} pair={} audio={} bytes",
            request.session_id,
            pair_id,
            request.audio.len()
        );

        // TRANSCRIBING. On failure nothing is persisted: an incomplete turn
        // never enters the transcript.
        let transcription = self
            .stt
            .transcribe(
                &request.audio,
                request.transcription_hint.as_deref(),
                request.language.as_deref(),
            )
            .await?;

        let history = self.store.list_by_session(&request.session_id)?;
        if !history.iter().any(|t| t.role == Role::System) {
            self.store.append(NewTurn::system(
                &request.session_id,
                &self.config.system_prompt,
            ))?;
        }
        self.store.append(NewTurn::user(
            &request.session_id,
            &pair_id,
            &transcription.text,
            Some(transcription.audio_ref.clone()),
        ))?;
        emitter.emit(TurnEvent::Transcribed {
            text: transcription.text.clone(),
            audio_ref: transcription.audio_ref,
        });

        // CONTEXT_BUILT -> COMPLETING. The user turn stays persisted on
        // failure; the transcript is append-only and reflects the half
        // exchange.
        let history = self.store.list_by_session(&request.session_id)?;
        let budget = BudgetConfig::new(self.config.token_ceiling, self.config.reply_margin);
        let context = budget_context(&history, &pair_id, &budget, self.counter.as_ref());
        let messages: Vec<ContextMessage> = context
            .iter()
            .map(|t| ContextMessage {
                role: t.role.as_str().into(),
                content: t.content.clone(),
            })
            .collect();
        debug!(
            "Context built: {} of {} turns for session {}",
            messages.len(),
            history.len(),
            request.session_id
        );

        let payload = self.llm.complete(&messages, &request.model).await?;
        let reply_text = payload
            .get(&self.config.speech_field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::SchemaValidation(format!(
                    "reply payload has no string field `{}`",
                    self.config.speech_field
                ))
            })?
            .to_string();

        self.store.append(NewTurn::assistant(
            &request.session_id,
            &pair_id,
            &reply_text,
        ))?;
        emitter.emit(TurnEvent::AssistantText {
            text: reply_text.clone(),
        });

        // SYNTHESIZING. Chunks are always drained, emitted only while
        // attached; the concatenated bytes become the assistant turn's audio.
        let mut chunks = self.tts.synthesize(&reply_text, &request.synthesis);
        let mut audio: Vec<u8> = Vec::new();
        while let Some(chunk) = chunks.next().await {
            let bytes = chunk?;
            audio.extend_from_slice(&bytes);
            emitter.emit(TurnEvent::AudioChunk { bytes });
        }

        let audio_ref = self.audio_store.put(&audio, &request.synthesis.format)?;
        self.store.attach_audio(
            &request.session_id,
            &pair_id,
            Role::Assistant,
            &audio_ref,
        )?;

        // DONE.
        let history = self.store.list_by_session(&request.session_id)?;
        info!(
            "Turn complete: session={} pair={} transcript={} turns",
            request.session_id,
            pair_id,
            history.len()
        );
        emitter.emit(TurnEvent::Complete {
            session_id: request.session_id.clone(),
            history,
        });
        Ok(())
    }
}

/// Emission gate. Once a send fails the receiver is gone; the flag flips and
/// every later emission is a no-op while the turn keeps running.
struct Emitter {
    tx: mpsc::UnboundedSender<TurnEvent>,
    detached: bool,
}

impl Emitter {
    fn new(tx: mpsc::UnboundedSender<TurnEvent>) -> Self {
        Self {
            tx,
            detached: false,
        }
    }

    fn emit(&mut self, event: TurnEvent) {
        if self.detached {
            return;
        }
        if self.tx.send(event).is_err() {
            warn!("Client detached mid-turn; persisting without emission");
            self.detached = true;
        }
    }
}
