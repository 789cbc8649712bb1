//! Gemini Backend Contract Tests
//!
//! Verify the wire format of streamed generation requests and how SSE
//! responses, HTTP errors and in-stream errors are surfaced.

use futures_util::StreamExt;
use nova::error::NovaError;
use nova::llm::gemini::{GeminiBackend, GeminiConfig};
use nova::llm::message::Message;
use nova::llm::provider::{GenerationBackend, GenerationRequest};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_PATH: &str = "/v1beta/models/gemini-2.0-flash:streamGenerateContent";

fn sse_chunk(text: &str) -> String {
    let payload = json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    });
    format!("data: {payload}\r\n\r\n")
}

fn backend(server: &MockServer) -> GeminiBackend {
    GeminiBackend::new(GeminiConfig::new("test-key", "gemini-2.0-flash").with_base_url(server.uri()))
}

async fn collect(
    backend: &GeminiBackend,
    system: &str,
    history: &[Message],
) -> Result<Vec<Result<String, NovaError>>, NovaError> {
    let stream = backend
        .stream(GenerationRequest {
            system_instruction: system,
            history,
        })
        .await?;
    Ok(stream.collect().await)
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_carries_key_history_and_system_instruction() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": { "parts": [{ "text": "You are Dr. Nova." }] },
            "contents": [
                { "role": "user", "parts": [{ "text": "I have a cough" }] },
                { "role": "model", "parts": [{ "text": "How long?" }] },
                { "role": "user", "parts": [{ "text": "Two days" }] }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_chunk("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        Message::user("I have a cough"),
        Message::assistant("How long?"),
        Message::user("Two days"),
    ];
    let items = collect(&backend(&server), "You are Dr. Nova.", &history).await;
    assert!(items.is_ok(), "request should match the contract");
}

// ────────────────────────────────────────────────────────────────────────────
// Response parsing
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fragments_arrive_in_order() {
    let server = MockServer::start().await;

    let body = [sse_chunk("Hello"), sse_chunk(" there"), sse_chunk(".")].concat();
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let items = match collect(&backend(&server), "sys", &[Message::user("hi")]).await {
        Ok(items) => items,
        Err(e) => unreachable!("stream should start: {e}"),
    };
    let texts: Vec<String> = items.into_iter().filter_map(Result::ok).collect();
    assert_eq!(texts, vec!["Hello", " there", "."]);
}

#[tokio::test]
async fn test_in_stream_error_ends_stream() {
    let server = MockServer::start().await;

    let body = format!(
        "{}data: {}\n\n{}",
        sse_chunk("Partial"),
        json!({ "error": { "code": 503, "message": "The model is overloaded." } }),
        sse_chunk("never")
    );
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let items = match collect(&backend(&server), "sys", &[Message::user("hi")]).await {
        Ok(items) => items,
        Err(e) => unreachable!("stream should start: {e}"),
    };
    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Ok(ref t) if t == "Partial"));
    assert!(matches!(items[1], Err(ref e) if e.message().contains("overloaded")));
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP errors
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_invalid_key_is_reported_before_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let result = collect(&backend(&server), "sys", &[Message::user("hi")]).await;
    match result {
        Err(e) => {
            assert_eq!(e.code(), "GENERATION_FAILED");
            assert!(e.message().contains("400"));
            assert!(e.message().contains("API key not valid"));
        }
        Ok(_) => unreachable!("a 400 must fail the request"),
    }
}

#[tokio::test]
async fn test_rate_limit_is_named() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let result = collect(&backend(&server), "sys", &[Message::user("hi")]).await;
    assert!(matches!(result, Err(ref e) if e.message().contains("rate limited")));
}

#[tokio::test]
async fn test_unreachable_backend_fails_to_start() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let backend = GeminiBackend::new(GeminiConfig::new("k", "gemini-2.0-flash").with_base_url(uri));
    let result = collect(&backend, "sys", &[Message::user("hi")]).await;
    assert!(result.is_err());
}
