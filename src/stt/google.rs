//! Google Cloud Speech-to-Text recognizer.
//!
//! Sends one synchronous `speech:recognize` request per utterance with
//! base64 LINEAR16 content.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use super::recognizer::{LinearAudio, Recognizer};
use crate::config::SttConfig;
use crate::error::{NovaError, Result};

/// Settings for [`GoogleSpeechRecognizer`].
#[derive(Clone)]
pub struct GoogleSpeechConfig {
    /// API key passed as the `key` query parameter.
    pub api_key: String,
    /// Service base URL.
    pub base_url: String,
    /// BCP-47 language code, e.g. `en-US`.
    pub language: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for GoogleSpeechConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSpeechConfig")
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl From<&SttConfig> for GoogleSpeechConfig {
    fn from(config: &SttConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            language: config.language.clone(),
            timeout: config.timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Recognizer backed by the Google Speech REST API.
#[derive(Debug)]
pub struct GoogleSpeechRecognizer {
    config: GoogleSpeechConfig,
    client: reqwest::Client,
}

impl GoogleSpeechRecognizer {
    /// Create a recognizer.
    ///
    /// # Errors
    ///
    /// Returns [`NovaError::Stt`] if the HTTP client cannot be built.
    pub fn new(config: GoogleSpeechConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NovaError::Stt(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/speech:recognize",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, audio: &LinearAudio) -> serde_json::Value {
        serde_json::json!({
            "config": {
                "encoding": "LINEAR16",
                "sampleRateHertz": audio.sample_rate,
                "audioChannelCount": audio.channels,
                "languageCode": self.config.language,
            },
            "audio": {
                "content": base64::engine::general_purpose::STANDARD.encode(&audio.pcm),
            },
        })
    }
}

/// Join the top alternative of every result; blank means no result.
fn best_transcript(response: RecognizeResponse) -> Option<String> {
    let text = response
        .results
        .into_iter()
        .filter_map(|r| r.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

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

#[async_trait]
impl Recognizer for GoogleSpeechRecognizer {
    fn name(&self) -> &str {
        "google-speech"
    }

    async fn recognize(&self, audio: &LinearAudio) -> Result<Option<String>> {
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&self.request_body(audio))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NovaError::Timeout(format!(
                        "speech recognition exceeded {}s",
                        self.config.timeout.as_secs()
                    ))
                } else {
                    NovaError::Stt(format!("speech request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NovaError::Stt(format!(
                "speech service returned HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| NovaError::Stt(format!("invalid speech response: {e}")))?;
        let transcript = best_transcript(parsed);
        debug!("speech service returned {:?}", transcript);
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn recognizer() -> GoogleSpeechRecognizer {
        GoogleSpeechRecognizer::new(GoogleSpeechConfig {
            api_key: "k".into(),
            base_url: "http://localhost:9/".into(),
            language: "en-US".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn body_carries_linear16_and_language() {
        let audio = LinearAudio::from_samples(&[1, 2], 16_000, 1);
        let body = recognizer().request_body(&audio);
        assert_eq!(body["config"]["encoding"], "LINEAR16");
        assert_eq!(body["config"]["sampleRateHertz"], 16_000);
        assert_eq!(body["config"]["languageCode"], "en-US");
        assert_eq!(body["audio"]["content"], "AQACAA==");
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(recognizer().endpoint(), "http://localhost:9/v1/speech:recognize");
    }

    #[test]
    fn transcripts_are_joined() {
        let response: RecognizeResponse = serde_json::from_str(
            r#"{"results":[
                {"alternatives":[{"transcript":"I have a headache","confidence":0.93}]},
                {"alternatives":[{"transcript":" since yesterday"}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            best_transcript(response).as_deref(),
            Some("I have a headache since yesterday")
        );
    }

    #[test]
    fn empty_results_mean_no_transcript() {
        let response: RecognizeResponse = serde_json::from_str("{}").unwrap();
        assert!(best_transcript(response).is_none());
        let response: RecognizeResponse =
            serde_json::from_str(r#"{"results":[{"alternatives":[]}]}"#).unwrap();
        assert!(best_transcript(response).is_none());
    }

    #[test]
    fn debug_hides_api_key() {
        let config = GoogleSpeechConfig {
            api_key: "super-secret".into(),
            base_url: "http://x".into(),
            language: "en-US".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
