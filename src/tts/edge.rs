//! Microsoft Edge "read aloud" speech synthesis over WebSocket.
//!
//! One connection carries one turn: a `speech.config` text frame, an `ssml`
//! text frame, then the service streams binary frames whose header block
//! names `Path:audio`, followed by a `Path:turn.end` text frame.
//!
//! The service rejects oversized SSML, so long text is split into chunks of
//! at most [`MAX_CHUNK_BYTES`] escaped bytes and spoken one turn per chunk,
//! all appended to the same output file.
//!
//! Binary frames start with a big-endian `u16` header length, the header
//! block, then raw MP3 bytes.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::debug;

use super::SpeechSynthesizer;
use crate::config::TtsConfig;
use crate::error::{NovaError, Result};

/// Public read-aloud endpoint.
pub const DEFAULT_ENDPOINT: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";

/// Client token embedded in the Edge browser.
pub const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

const CHROMIUM_FULL_VERSION: &str = "130.0.2849.68";
const ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0";
const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Largest escaped text carried by one SSML frame.
pub const MAX_CHUNK_BYTES: usize = 4096;

/// Seconds between 1601-01-01 and 1970-01-01.
const WINDOWS_EPOCH_OFFSET_SECS: u64 = 11_644_473_600;
/// Token validity window.
const GEC_WINDOW_SECS: u64 = 300;

/// Compute the `Sec-MS-GEC` token for a Unix time.
///
/// SHA-256 over the Windows file-time tick count (rounded down to a
/// five-minute window) concatenated with [`TRUSTED_CLIENT_TOKEN`],
/// rendered as upper-case hex.
pub fn sec_ms_gec(unix_secs: u64) -> String {
    let mut secs = unix_secs + WINDOWS_EPOCH_OFFSET_SECS;
    secs -= secs % GEC_WINDOW_SECS;
    let ticks = u128::from(secs) * 10_000_000;
    let digest = Sha256::digest(format!("{ticks}{TRUSTED_CLIENT_TOKEN}").as_bytes());
    digest.iter().map(|b| format!("{b:02X}")).collect()
}

/// Expand a short voice id (`en-US-BrianNeural`) into the service's full name.
pub fn full_voice_name(voice: &str) -> String {
    let mut parts = voice.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lang), Some(region), Some(name)) if !name.is_empty() => {
            format!("Microsoft Server Speech Text to Speech Voice ({lang}-{region}, {name})")
        }
        _ => voice.to_owned(),
    }
}

/// Escape text for inclusion in SSML.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Replace control characters the service refuses with spaces.
///
/// Tab, line feed and carriage return are kept.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\t' | '\n' | '\r' => c,
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

/// Split escaped text into chunks of at most `max_bytes` bytes.
///
/// Cuts prefer the last newline, then the last space, inside the window and
/// never land inside a character or an XML entity. Chunks are trimmed and
/// blank chunks dropped.
pub fn split_escaped(text: &str, max_bytes: usize) -> Vec<&str> {
    let max_bytes = max_bytes.max(8);
    let mut chunks = Vec::new();
    let mut rest = text.trim();
    while rest.len() > max_bytes {
        let mut cut = max_bytes;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &rest[..cut];
        let mut split = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|i| *i > 0)
            .unwrap_or(cut);
        if let Some(amp) = rest[..split].rfind('&')
            && amp > 0
            && !rest[amp..split].contains(';')
        {
            split = amp;
        }
        let (chunk, tail) = rest.split_at(split);
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

fn js_timestamp() -> String {
    chrono::Utc::now()
        .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
        .to_string()
}

fn speech_config_frame(timestamp: &str) -> String {
    let body = serde_json::json!({
        "context": {
            "synthesis": {
                "audio": {
                    "metadataoptions": {
                        "sentenceBoundaryEnabled": "false",
                        "wordBoundaryEnabled": "false",
                    },
                    "outputFormat": OUTPUT_FORMAT,
                }
            }
        }
    });
    format!(
        "X-Timestamp:{timestamp}\r\nContent-Type:application/json; charset=utf-8\r\n\
         Path:speech.config\r\n\r\n{body}\r\n"
    )
}

/// Build the `ssml` frame; `escaped_text` must already be XML-escaped.
fn ssml_frame(request_id: &str, timestamp: &str, voice: &str, escaped_text: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\nContent-Type:application/ssml+xml\r\n\
         X-Timestamp:{timestamp}Z\r\nPath:ssml\r\n\r\n\
         <speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'><prosody pitch='+0Hz' rate='+0%' volume='+0%'>{}</prosody></voice>\
         </speak>",
        full_voice_name(voice),
        escaped_text
    )
}

/// The `Path:` header of a text frame.
fn header_path(frame: &str) -> Option<&str> {
    let headers = frame.split("\r\n\r\n").next()?;
    headers
        .split("\r\n")
        .find_map(|line| line.strip_prefix("Path:"))
        .map(str::trim)
}

/// Audio bytes carried by a binary frame, if it is an audio frame.
fn audio_payload(frame: &[u8]) -> Result<Option<&[u8]>> {
    if frame.len() < 2 {
        return Err(NovaError::Tts("truncated binary frame".into()));
    }
    let header_len = usize::from(u16::from_be_bytes([frame[0], frame[1]]));
    let Some(headers) = frame.get(2..2 + header_len) else {
        return Err(NovaError::Tts("binary frame header overruns frame".into()));
    };
    let headers = String::from_utf8_lossy(headers);
    let is_audio = headers
        .split("\r\n")
        .any(|line| line.trim() == "Path:audio");
    if !is_audio {
        return Ok(None);
    }
    Ok(Some(&frame[2 + header_len..]))
}

/// Settings for [`EdgeTtsSynthesizer`].
#[derive(Debug, Clone)]
pub struct EdgeTtsConfig {
    /// WebSocket endpoint without query string.
    pub endpoint: String,
    /// Bound on one whole synthesis, across all chunks.
    pub timeout: Duration,
    /// Chunk size for long text; see [`MAX_CHUNK_BYTES`].
    pub max_chunk_bytes: usize,
}

impl Default for EdgeTtsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            timeout: Duration::from_secs(60),
            max_chunk_bytes: MAX_CHUNK_BYTES,
        }
    }
}

impl From<&TtsConfig> for EdgeTtsConfig {
    fn from(config: &TtsConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            timeout: config.timeout(),
            max_chunk_bytes: MAX_CHUNK_BYTES,
        }
    }
}

/// Synthesizer speaking the Edge read-aloud protocol.
#[derive(Debug, Clone)]
pub struct EdgeTtsSynthesizer {
    config: EdgeTtsConfig,
}

impl EdgeTtsSynthesizer {
    /// Create a synthesizer.
    pub fn new(config: EdgeTtsConfig) -> Self {
        Self { config }
    }

    fn connect_url(&self) -> String {
        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!(
            "{}?TrustedClientToken={TRUSTED_CLIENT_TOKEN}&ConnectionId={}\
             &Sec-MS-GEC={}&Sec-MS-GEC-Version=1-{CHROMIUM_FULL_VERSION}",
            self.config.endpoint,
            uuid::Uuid::new_v4().simple(),
            sec_ms_gec(unix_secs)
        )
    }

    /// Speak every chunk of `text` into `output`.
    async fn run(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
        let escaped = escape_xml(&strip_control_chars(text));
        let chunks = split_escaped(&escaped, self.config.max_chunk_bytes);
        if chunks.is_empty() {
            return Err(NovaError::InvalidInput("No text".into()));
        }
        let mut file = tokio::fs::File::create(output).await?;
        let mut written = 0usize;
        for (index, chunk) in chunks.iter().enumerate() {
            debug!(chunk = index + 1, of = chunks.len(), "synthesizing chunk");
            written += self.run_turn(chunk, voice, &mut file).await?;
        }
        file.flush().await?;
        debug!("received {written} bytes of audio");
        Ok(())
    }

    /// One connection, one turn; returns the audio bytes appended to `file`.
    async fn run_turn(
        &self,
        escaped_text: &str,
        voice: &str,
        file: &mut tokio::fs::File,
    ) -> Result<usize> {
        let mut request = self
            .connect_url()
            .into_client_request()
            .map_err(|e| NovaError::Tts(format!("invalid synthesis endpoint: {e}")))?;
        let headers = request.headers_mut();
        headers.insert("Pragma", HeaderValue::from_static("no-cache"));
        headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
        headers.insert("Origin", HeaderValue::from_static(ORIGIN));
        headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| NovaError::Tts(format!("synthesis connect failed: {e}")))?;
        let (mut write, mut read) = stream.split();

        let timestamp = js_timestamp();
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        write
            .send(Message::Text(speech_config_frame(&timestamp)))
            .await
            .map_err(|e| NovaError::Tts(format!("send speech.config: {e}")))?;
        write
            .send(Message::Text(ssml_frame(&request_id, &timestamp, voice, escaped_text)))
            .await
            .map_err(|e| NovaError::Tts(format!("send ssml: {e}")))?;

        let mut written = 0usize;
        let mut finished = false;
        while let Some(message) = read.next().await {
            match message.map_err(|e| NovaError::Tts(format!("synthesis stream error: {e}")))? {
                Message::Text(frame) => match header_path(&frame) {
                    Some("turn.end") => {
                        finished = true;
                        break;
                    }
                    Some(path) => debug!("synthesis frame {path}"),
                    None => {}
                },
                Message::Binary(frame) => {
                    if let Some(audio) = audio_payload(&frame)?
                        && !audio.is_empty()
                    {
                        file.write_all(audio).await?;
                        written += audio.len();
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        let _ = write.close().await;

        if !finished {
            return Err(NovaError::Tts(
                "synthesis connection closed before the turn ended".into(),
            ));
        }
        if written == 0 {
            return Err(NovaError::Tts("no audio was received".into()));
        }
        Ok(written)
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTtsSynthesizer {
    fn name(&self) -> &str {
        "edge-tts"
    }

    async fn synthesize_to(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
        match tokio::time::timeout(self.config.timeout, self.run(text, voice, output)).await {
            Ok(result) => result,
            Err(_) => Err(NovaError::Timeout(format!(
                "speech synthesis exceeded {}s",
                self.config.timeout.as_secs()
            ))),
        }
    }
}
