//! End-to-end tests of the HTTP gateway.
//!
//! The server runs on an ephemeral port with a wiremock Gemini backend and
//! in-process fakes for conversion, recognition and synthesis.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nova::audio::transcode::{AudioTranscoder, ContainerConverter, TargetFormat};
use nova::chat::responder::{ResponderOptions, StreamingResponder};
use nova::config::ServerConfig;
use nova::error::{NovaError, Result};
use nova::llm::gemini::{GeminiBackend, GeminiConfig};
use nova::server::{AppState, NovaServer};
use nova::session::store::{ExpiryPolicy, MemorySessionStore};
use nova::stt::recognizer::{LinearAudio, Recognizer};
use nova::stt::transcriber::{Transcriber, TranscriptionPipeline};
use nova::tts::{SpeechSynthesizer, Synthesizer};
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_PATH: &str = "/v1beta/models/gemini-2.0-flash:streamGenerateContent";

// ────────────────────────────────────────────────────────────────────────────
// Fakes
// ────────────────────────────────────────────────────────────────────────────

struct FakeSynth {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    fn name(&self) -> &str {
        "fake"
    }

    async fn synthesize_to(&self, text: &str, _voice: &str, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NovaError::Tts("voice service unavailable".into()));
        }
        tokio::fs::write(output, format!("ID3-{text}")).await?;
        Ok(())
    }
}

struct FakeConverter {
    calls: AtomicUsize,
}

#[async_trait]
impl ContainerConverter for FakeConverter {
    async fn convert(&self, _: &Path, destination: &Path, target: TargetFormat) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spec = hound::WavSpec {
            channels: target.channels,
            sample_rate: target.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(destination, spec)
            .map_err(|e| NovaError::Transcode(e.to_string()))?;
        for _ in 0..320 {
            writer
                .write_sample(0i16)
                .map_err(|e| NovaError::Transcode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| NovaError::Transcode(e.to_string()))
    }
}

struct FixedRecognizer;

#[async_trait]
impl Recognizer for FixedRecognizer {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn recognize(&self, _: &LinearAudio) -> Result<Option<String>> {
        Ok(Some("I have a fever".into()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

struct Harness {
    server: NovaServer,
    gemini: MockServer,
    temp: TempDir,
    synth: Arc<FakeSynth>,
    converter: Arc<FakeConverter>,
    client: reqwest::Client,
}

impl Harness {
    async fn start(synth_fails: bool) -> Self {
        let gemini = MockServer::start().await;
        let temp = tempfile::tempdir().unwrap();
        let synth = Arc::new(FakeSynth {
            calls: AtomicUsize::new(0),
            fail: synth_fails,
        });
        let converter = Arc::new(FakeConverter {
            calls: AtomicUsize::new(0),
        });

        let backend = GeminiBackend::new(
            GeminiConfig::new("test-key", "gemini-2.0-flash").with_base_url(gemini.uri()),
        );
        let state = AppState {
            sessions: Arc::new(MemorySessionStore::new("You are Dr. Nova.", ExpiryPolicy::never())),
            responder: StreamingResponder::new(
                Arc::new(backend),
                ResponderOptions {
                    timeout: Duration::from_secs(5),
                    buffer: 8,
                },
            ),
            synthesizer: Synthesizer::new(synth.clone(), temp.path(), "en-US-BrianNeural"),
            transcription: TranscriptionPipeline::new(
                AudioTranscoder::new(converter.clone(), TargetFormat::default()),
                Transcriber::new(Arc::new(FixedRecognizer)),
                temp.path(),
            ),
            retain_tts_files: false,
            sweep_interval: None,
        };
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        };
        let server = NovaServer::start(state, &config).await.unwrap();

        Self {
            server,
            gemini,
            temp,
            synth,
            converter,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("http://{}{route}", self.server.addr())
    }

    fn temp_files(&self) -> usize {
        std::fs::read_dir(self.temp.path())
            .map(|dir| dir.count())
            .unwrap_or_default()
    }

    async fn post_json(&self, route: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(route))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn post_form(&self, form: Form) -> Value {
        self.client
            .post(self.url("/api/transcribe"))
            .multipart(form)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

fn webm_part(data: &'static [u8]) -> Part {
    Part::bytes(data)
        .file_name("audio.webm")
        .mime_str("audio/webm")
        .unwrap()
}

fn sse_chunk(text: &str) -> String {
    let payload = json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    });
    format!("data: {payload}\r\n\r\n")
}

async fn body_text(response: reqwest::Response) -> String {
    response.text().await.unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Chat
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_streams_plain_text_and_keeps_history() {
    let h = Harness::start(false).await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            [sse_chunk("Hello"), sse_chunk(" there"), sse_chunk(".")].concat(),
        ))
        .mount(&h.gemini)
        .await;

    let response = h
        .post_json("/api/chat/stream", json!({"message": "hi", "chat_id": "c1"}))
        .await;
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(body_text(response).await, "Hello there.");

    let response = h
        .post_json("/api/chat/stream", json!({"message": "and then?", "chat_id": "c1"}))
        .await;
    assert_eq!(body_text(response).await, "Hello there.");

    let requests = h.gemini.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
    let contents = second["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "Hello there.");
    assert_eq!(second["systemInstruction"]["parts"][0]["text"], "You are Dr. Nova.");
}

#[tokio::test]
async fn chat_without_id_uses_default_session() {
    let h = Harness::start(false).await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_chunk("Hi")))
        .mount(&h.gemini)
        .await;

    let _ = body_text(h.post_json("/api/chat/stream", json!({"message": "one"})).await).await;
    let _ = body_text(h.post_json("/api/chat/stream", json!({"message": "two"})).await).await;

    let health: Value = h
        .client
        .get(h.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok", "sessions": 1}));
}

#[tokio::test]
async fn chat_backend_failure_is_inline_marker() {
    let h = Harness::start(false).await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": 500, "message": "Internal error encountered."}
        })))
        .mount(&h.gemini)
        .await;

    let response = h.post_json("/api/chat/stream", json!({"message": "hi"})).await;
    assert_eq!(response.status(), 200);
    let body = body_text(response).await;
    assert!(body.starts_with("\n**Error:** "), "got {body:?}");
    assert!(body.contains("Internal error encountered."));
}

#[tokio::test]
async fn chat_without_message_is_rejected() {
    let h = Harness::start(false).await;
    let response = h.post_json("/api/chat/stream", json!({"chat_id": "c"})).await;
    assert_eq!(response.status(), 400);
    assert!(h.gemini.received_requests().await.unwrap().is_empty());
}

// ────────────────────────────────────────────────────────────────────────────
// Synthesis
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tts_empty_text_is_client_error_without_synthesis() {
    let h = Harness::start(false).await;

    let response = h.post_json("/api/tts", json!({"text": ""})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "No text"}));

    let response = h
        .client
        .post(h.url("/api/tts"))
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    assert_eq!(h.synth.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.temp_files(), 0);
}

#[tokio::test]
async fn tts_returns_audio_and_cleans_up() {
    let h = Harness::start(false).await;

    let response = h.post_json("/api/tts", json!({"text": "Hello"})).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("audio/mpeg")
    );
    let bytes = response.bytes().await.unwrap();
    assert_eq!(&bytes[..], b"ID3-Hello");
    assert_eq!(h.synth.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.temp_files(), 0);
}

#[tokio::test]
async fn tts_service_fault_is_structured() {
    let h = Harness::start(true).await;

    let response = h.post_json("/api/tts", json!({"text": "Hello"})).await;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "voice service unavailable"}));
    assert_eq!(h.temp_files(), 0);
}

// ────────────────────────────────────────────────────────────────────────────
// Transcription
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transcribe_without_audio_field_is_empty() {
    let h = Harness::start(false).await;

    let body = h
        .post_form(Form::new().part("other", webm_part(b"data")))
        .await;
    assert_eq!(body, json!({"text": ""}));
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.temp_files(), 0);
}

#[tokio::test]
async fn transcribe_returns_text_and_cleans_up() {
    let h = Harness::start(false).await;

    let body = h
        .post_form(Form::new().part("audio", webm_part(b"\x1aE\xdf\xa3webm")))
        .await;
    assert_eq!(body, json!({"text": "I have a fever"}));
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.temp_files(), 0);
}

#[tokio::test]
async fn transcribe_non_multipart_is_empty() {
    let h = Harness::start(false).await;

    let response = h.post_json("/api/transcribe", json!({"audio": "nope"})).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"text": ""}));
}

// ────────────────────────────────────────────────────────────────────────────
// Cross-cutting
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cors_allows_any_origin() {
    let h = Harness::start(false).await;

    let response = h
        .client
        .get(h.url("/health"))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
