//! Gemini generation backend.
//!
//! Calls `POST {base_url}/v1beta/models/{model}:streamGenerateContent?alt=sse`
//! and normalizes each SSE payload into plain text fragments.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nova::llm::gemini::{GeminiBackend, GeminiConfig};
//!
//! let backend = GeminiBackend::new(GeminiConfig::new("api-key", "gemini-2.0-flash"));
//! ```

use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::debug;

use super::message::{Message, Role};
use super::provider::{FragmentStream, GenerationBackend, GenerationRequest};
use super::sse::{SseDecoder, is_done};
use crate::config::LlmConfig;
use crate::error::NovaError;

/// Configuration for the Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Base URL (defaults to the public endpoint).
    pub base_url: String,
    /// Model name, e.g. `gemini-2.0-flash`.
    pub model: String,
    /// Connect timeout for the HTTP client.
    pub connect_timeout: Duration,
}

impl GeminiConfig {
    /// Create a config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            model: model.into(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl From<&LlmConfig> for GeminiConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            connect_timeout: config.timeout(),
        }
    }
}

/// Build the JSON body for a streamed generation request.
pub fn build_request_body(system_instruction: &str, history: &[Message]) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = history
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            serde_json::json!({
                "role": role,
                "parts": [{ "text": msg.content }],
            })
        })
        .collect();

    let mut body = serde_json::json!({ "contents": contents });
    if !system_instruction.trim().is_empty()
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert(
            "systemInstruction".into(),
            serde_json::json!({ "parts": [{ "text": system_instruction }] }),
        );
    }
    body
}

/// Parse one SSE payload into text fragments.
///
/// Returns an error when the payload reports an API error or a blocked prompt.
/// Payloads that are not JSON are ignored.
pub fn parse_stream_payload(payload: &str) -> Result<Vec<String>, NovaError> {
    if is_done(payload) {
        return Ok(Vec::new());
    }
    let parsed: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            debug!("ignoring non-JSON stream payload: {e}");
            return Ok(Vec::new());
        }
    };

    if let Some(error) = parsed.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(NovaError::Generation(format!("Gemini stream error: {message}")));
    }

    if let Some(reason) = parsed
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        return Err(NovaError::Generation(format!("prompt blocked: {reason}")));
    }

    let mut fragments = Vec::new();
    let parts = parsed
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array());
    if let Some(parts) = parts {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str())
                && !text.is_empty()
            {
                fragments.push(text.to_owned());
            }
        }
    }
    Ok(fragments)
}

/// Extract an error message from a Gemini error response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

/// Gemini streaming backend.
pub struct GeminiBackend {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl GeminiBackend {
    /// Create a backend with the given configuration.
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> NovaError {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 | 403 => NovaError::Generation(format!("Gemini authentication failed: {message}")),
            429 => NovaError::Generation(format!("Gemini rate limited: {message}")),
            code => NovaError::Generation(format!("Gemini HTTP {code}: {message}")),
        }
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream(&self, request: GenerationRequest<'_>) -> Result<FragmentStream, NovaError> {
        let body = build_request_body(request.system_instruction, request.history);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NovaError::Generation(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let mut bytes = Box::pin(response.bytes_stream());
        let fragments = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(NovaError::Generation(format!("stream read error: {e}")));
                        return;
                    }
                };
                for payload in decoder.push(&chunk) {
                    match parse_stream_payload(&payload) {
                        Ok(texts) => {
                            for text in texts {
                                yield Ok(text);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
            if let Some(payload) = decoder.finish() {
                match parse_stream_payload(&payload) {
                    Ok(texts) => {
                        for text in texts {
                            yield Ok(text);
                        }
                    }
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}
