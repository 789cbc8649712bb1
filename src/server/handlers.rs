//! Route handlers.

use std::convert::Infallible;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::state::AppState;
use crate::session::store::SessionStore;
use crate::session::types::DEFAULT_SESSION_ID;
use crate::stt::transcriber::Transcript;

/// Multipart field carrying the recording.
const AUDIO_FIELD: &str = "audio";

/// Body of `POST /api/chat/stream`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatStreamRequest {
    pub message: Option<String>,
    pub chat_id: Option<String>,
}

/// Body of `POST /api/tts`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TtsRequest {
    pub text: Option<String>,
}

/// Decode a JSON body, treating anything unparseable as an empty object.
fn parse_lenient<T: DeserializeOwned + Default>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        debug!("treating malformed JSON body as empty: {e}");
        T::default()
    })
}

/// `POST /api/chat/stream`: stream the reply as raw text fragments.
pub async fn chat_stream(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ChatStreamRequest = parse_lenient(&body);
    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("No message"))?;
    let chat_id = request
        .chat_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_owned());

    info!(chat_id = %chat_id, "chat request");
    let session = state.sessions.get_or_create(&chat_id).await;
    let fragments = state
        .responder
        .respond(session, message)
        .map(Ok::<_, Infallible>);

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(fragments))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}

/// `POST /api/tts`: synthesize text and return the MP3 bytes.
pub async fn tts(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: TtsRequest = parse_lenient(&body);
    let text = request.text.unwrap_or_default();

    let audio = state.synthesizer.synthesize(&text, None).await?;
    let bytes = audio.read().await;
    if !state.retain_tts_files
        && let Err(e) = audio.discard().await
    {
        warn!("failed to remove synthesized file: {e}");
    }
    let bytes = bytes?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response())
}

/// `POST /api/transcribe`: transcribe the multipart `audio` field.
///
/// Always answers with a transcript body; a request without the field
/// yields empty text and creates no files.
pub async fn transcribe(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<Transcript> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            debug!("transcribe request is not multipart: {e}");
            return Json(Transcript::empty());
        }
    };

    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(AUDIO_FIELD) => match field.bytes().await {
                Ok(bytes) => {
                    upload = Some(bytes);
                    break;
                }
                Err(e) => {
                    warn!("failed reading audio field: {e}");
                    return Json(Transcript {
                        text: String::new(),
                        error: Some(format!("failed reading audio field: {e}")),
                    });
                }
            },
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!("invalid multipart payload: {e}");
                return Json(Transcript {
                    text: String::new(),
                    error: Some(format!("invalid multipart payload: {e}")),
                });
            }
        }
    }

    let Some(bytes) = upload else {
        debug!("no audio field in transcribe request");
        return Json(Transcript::empty());
    };
    info!("transcribing {} byte upload", bytes.len());
    Json(state.transcription.run(&bytes).await)
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.len().await,
    }))
}
