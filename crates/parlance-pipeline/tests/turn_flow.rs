//! End-to-end turn flow tests against scripted adapter doubles.
//!
//! The doubles implement the real adapter traits; the scripted LLM feeds its
//! canned wire response through the real `parse_completion`, so the error
//! taxonomy is exercised exactly as it would be against the live API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use tokio_stream::StreamExt;

use parlance_context::CharEstimate;
use parlance_core::{Error, PipelineConfig, Result, Role};
use parlance_llm::{parse_completion, CompletionModel, ContextMessage, ModelConfig, ReplySchema};
use parlance_pipeline::{ErrorKind, TurnEvent, TurnPipeline, TurnRequest};
use parlance_speech::{
    AudioByteStream, FsAudioStore, SpeechSynthesizer, SpeechToText, SynthesisConfig, Transcription,
};
use parlance_store::TranscriptStore;

struct ScriptedStt {
    /// `None` simulates an upstream transcription failure.
    text: Option<String>,
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _prompt: Option<&str>,
        _language: Option<&str>,
    ) -> Result<Transcription> {
        match &self.text {
            Some(text) => Ok(Transcription {
                text: text.clone(),
                audio_ref: "audio/utterance.wav".into(),
            }),
            None => Err(Error::Transcription("upstream recognizer down".into())),
        }
    }
}

struct ScriptedLlm {
    /// Raw completion response, parsed by the production parser.
    response: Value,
}

#[async_trait]
impl CompletionModel for ScriptedLlm {
    async fn complete(&self, _messages: &[ContextMessage], config: &ModelConfig) -> Result<Value> {
        parse_completion(&self.response, &config.schema)
    }
}

struct ScriptedTts {
    chunks: Vec<&'static [u8]>,
    fail_after: Option<usize>,
    chunk_delay: Duration,
}

impl ScriptedTts {
    fn ok(chunks: Vec<&'static [u8]>) -> Self {
        Self {
            chunks,
            fail_after: None,
            chunk_delay: Duration::ZERO,
        }
    }
}

impl SpeechSynthesizer for ScriptedTts {
    fn synthesize(&self, _text: &str, _config: &SynthesisConfig) -> AudioByteStream {
        let chunks = self.chunks.clone();
        let fail_after = self.fail_after;
        let delay = self.chunk_delay;
        Box::pin(async_stream::stream! {
            for (i, chunk) in chunks.into_iter().enumerate() {
                if fail_after == Some(i) {
                    yield Err(Error::Synthesis("upstream synthesizer hung up".into()));
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(Bytes::from_static(chunk));
            }
        })
    }
}

fn reply_response(text: &str) -> Value {
    json!({
        "choices": [{
            "finish_reason": "tool_calls",
            "message": {
                "tool_calls": [{
                    "function": {
                        "name": "reply",
                        "arguments": json!({ "message": text }).to_string(),
                    }
                }]
            }
        }]
    })
}

fn truncated_response() -> Value {
    json!({
        "choices": [{
            "finish_reason": "length",
            "message": { "tool_calls": null }
        }]
    })
}

fn model_config() -> ModelConfig {
    ModelConfig::new(ReplySchema::new(
        "reply",
        json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        }),
    ))
}

fn request(session_id: &str) -> TurnRequest {
    TurnRequest {
        session_id: session_id.into(),
        audio: b"fake wav bytes".to_vec(),
        transcription_hint: None,
        language: Some("fr".into()),
        model: model_config(),
        synthesis: SynthesisConfig::default(),
    }
}

struct Fixture {
    pipeline: TurnPipeline,
    store: Arc<TranscriptStore>,
    _dir: tempfile::TempDir,
}

fn fixture(stt: ScriptedStt, llm: ScriptedLlm, tts: ScriptedTts) -> Fixture {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(TranscriptStore::open(dir.path().join("db")).unwrap());
    let audio_store = Arc::new(FsAudioStore::new(dir.path().join("audio")).unwrap());
    let pipeline = TurnPipeline::new(
        store.clone(),
        Arc::new(stt),
        Arc::new(llm),
        Arc::new(tts),
        audio_store,
        Arc::new(CharEstimate),
        PipelineConfig::new("You are a patient language tutor."),
    );
    Fixture {
        pipeline,
        store,
        _dir: dir,
    }
}

async fn collect(
    mut stream: impl tokio_stream::Stream<Item = TurnEvent> + Unpin,
) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn happy_path_emits_full_sequence_and_persists_pair() {
    let fx = fixture(
        ScriptedStt {
            text: Some("Bonjour, comment allez-vous ?".into()),
        },
        ScriptedLlm {
            response: reply_response("Très bien, merci !"),
        },
        ScriptedTts::ok(vec![b"chunk-one", b"chunk-two"]),
    );

    let events = collect(fx.pipeline.produce_turn(request("s1"))).await;

    assert!(matches!(
        &events[0],
        TurnEvent::Transcribed { text, audio_ref }
            if text == "Bonjour, comment allez-vous ?" && audio_ref == "audio/utterance.wav"
    ));
    assert!(matches!(
        &events[1],
        TurnEvent::AssistantText { text } if text == "Très bien, merci !"
    ));
    let chunk_count = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::AudioChunk { .. }))
        .count();
    assert_eq!(chunk_count, 2);
    let TurnEvent::Complete {
        session_id,
        history,
    } = events.last().unwrap()
    else {
        panic!("expected Complete, got {:?}", events.last());
    };
    assert_eq!(session_id, "s1");
    assert_eq!(history.len(), 3);

    // Transcript: system first, then a user/assistant pair sharing one id.
    let turns = fx.store.list_by_session("s1").unwrap();
    assert_eq!(turns[0].role, Role::System);
    assert_eq!(turns[1].role, Role::User);
    assert_eq!(turns[2].role, Role::Assistant);
    assert_eq!(turns[1].pair_id, turns[2].pair_id);
    assert_eq!(
        turns[1].audio_ref.as_deref(),
        Some("audio/utterance.wav")
    );
    let assistant_audio = turns[2].audio_ref.as_deref().unwrap();
    assert_eq!(
        std::fs::read(assistant_audio).unwrap(),
        b"chunk-onechunk-two"
    );
}

#[tokio::test]
async fn truncated_model_response_stops_before_assistant_turn() {
    let fx = fixture(
        ScriptedStt {
            text: Some("Hola".into()),
        },
        ScriptedLlm {
            response: truncated_response(),
        },
        ScriptedTts::ok(vec![b"unused"]),
    );

    let events = collect(fx.pipeline.produce_turn(request("s1"))).await;

    assert!(matches!(&events[0], TurnEvent::Transcribed { .. }));
    assert!(matches!(
        &events[1],
        TurnEvent::Error {
            kind: ErrorKind::TruncatedResponse,
            ..
        }
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, TurnEvent::AssistantText { .. })));

    // User turn persisted, no assistant turn: half-complete but recoverable.
    let turns = fx.store.list_by_session("s1").unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].role, Role::User);
}

#[tokio::test]
async fn transcription_failure_persists_nothing() {
    let fx = fixture(
        ScriptedStt { text: None },
        ScriptedLlm {
            response: reply_response("unused"),
        },
        ScriptedTts::ok(vec![b"unused"]),
    );

    let events = collect(fx.pipeline.produce_turn(request("s1"))).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        TurnEvent::Error {
            kind: ErrorKind::Transcription,
            ..
        }
    ));
    assert!(fx.store.list_by_session("s1").unwrap().is_empty());
}

#[tokio::test]
async fn synthesis_failure_keeps_assistant_text_without_audio() {
    let fx = fixture(
        ScriptedStt {
            text: Some("Hallo".into()),
        },
        ScriptedLlm {
            response: reply_response("Guten Tag!"),
        },
        ScriptedTts {
            chunks: vec![b"first", b"never-sent"],
            fail_after: Some(1),
            chunk_delay: Duration::ZERO,
        },
    );

    let events = collect(fx.pipeline.produce_turn(request("s1"))).await;

    assert!(matches!(
        events.last(),
        Some(TurnEvent::Error {
            kind: ErrorKind::Synthesis,
            ..
        })
    ));
    // One good chunk made it out before the failure, none after.
    let chunk_count = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::AudioChunk { .. }))
        .count();
    assert_eq!(chunk_count, 1);

    let turns = fx.store.list_by_session("s1").unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[2].role, Role::Assistant);
    assert_eq!(turns[2].content, "Guten Tag!");
    assert!(turns[2].audio_ref.is_none());
}

#[tokio::test]
async fn detached_consumer_does_not_reduce_persistence() {
    let fx = fixture(
        ScriptedStt {
            text: Some("Ciao".into()),
        },
        ScriptedLlm {
            response: reply_response("Buongiorno!"),
        },
        ScriptedTts::ok(vec![b"audio"]),
    );

    // Drop the stream before consuming anything.
    drop(fx.pipeline.produce_turn(request("s1")));

    // The background task keeps working; wait for the full pair to land.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let turns = fx.store.list_by_session("s1").unwrap();
        if turns.len() == 3 && turns[2].audio_ref.is_some() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "transcript never completed after detach; turns={}",
            turns.len()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn second_turn_on_busy_session_is_rejected() {
    let fx = fixture(
        ScriptedStt {
            text: Some("Hello".into()),
        },
        ScriptedLlm {
            response: reply_response("Hi!"),
        },
        ScriptedTts {
            chunks: vec![b"slow", b"audio"],
            fail_after: None,
            chunk_delay: Duration::from_millis(150),
        },
    );

    let mut first = fx.pipeline.produce_turn(request("s1"));
    // Wait until the first turn is demonstrably in flight.
    loop {
        match first.next().await {
            Some(TurnEvent::AssistantText { .. }) => break,
            Some(_) => continue,
            None => panic!("first turn ended before assistant text"),
        }
    }

    let events = collect(fx.pipeline.produce_turn(request("s1"))).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        TurnEvent::Error {
            kind: ErrorKind::SessionBusy,
            ..
        }
    ));

    // The first turn still completes normally.
    let remaining = collect(first).await;
    assert!(matches!(remaining.last(), Some(TurnEvent::Complete { .. })));

    // And the guard released: a third turn goes through.
    let events = collect(fx.pipeline.produce_turn(request("s1"))).await;
    assert!(matches!(events.last(), Some(TurnEvent::Complete { .. })));
}

#[tokio::test]
async fn concurrent_sessions_do_not_contend() {
    let fx = fixture(
        ScriptedStt {
            text: Some("Hi".into()),
        },
        ScriptedLlm {
            response: reply_response("Hello!"),
        },
        ScriptedTts {
            chunks: vec![b"a", b"b"],
            fail_after: None,
            chunk_delay: Duration::from_millis(50),
        },
    );

    let (a, b) = tokio::join!(
        collect(fx.pipeline.produce_turn(request("s1"))),
        collect(fx.pipeline.produce_turn(request("s2"))),
    );

    assert!(matches!(a.last(), Some(TurnEvent::Complete { .. })));
    assert!(matches!(b.last(), Some(TurnEvent::Complete { .. })));
    assert_eq!(fx.store.list_by_session("s1").unwrap().len(), 3);
    assert_eq!(fx.store.list_by_session("s2").unwrap().len(), 3);
}

#[tokio::test]
async fn reply_without_speech_field_is_schema_error() {
    // Schema permits the payload, but the configured speech field is absent.
    let fx = fixture(
        ScriptedStt {
            text: Some("Hey".into()),
        },
        ScriptedLlm {
            response: json!({
                "choices": [{
                    "finish_reason": "tool_calls",
                    "message": {
                        "tool_calls": [{
                            "function": {
                                "name": "reply",
                                "arguments": "{\"notes\": \"no message here\"}",
                            }
                        }]
                    }
                }]
            }),
        },
        ScriptedTts::ok(vec![b"unused"]),
    );

    let mut req = request("s1");
    req.model.schema = ReplySchema::new("reply", json!({ "type": "object" }));
    let events = collect(fx.pipeline.produce_turn(req)).await;

    assert!(matches!(
        events.last(),
        Some(TurnEvent::Error {
            kind: ErrorKind::SchemaValidation,
            ..
        })
    ));
    // User turn persisted, assistant never appended.
    assert_eq!(fx.store.list_by_session("s1").unwrap().len(), 2);
}
