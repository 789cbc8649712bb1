//! Linear audio to text, and the full upload-to-text pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::recognizer::{LinearAudio, Recognizer};
use crate::audio::janitor::ResourceJanitor;
use crate::audio::transcode::{AudioTranscoder, DecodedAudio};
use crate::error::{NovaError, Result};

/// Outcome of one transcription. Never an error at this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    /// Recognized text; empty when nothing was understood.
    pub text: String,
    /// Fault description when the text is empty because something failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Transcript {
    /// Successful recognition.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    /// No speech understood, no fault.
    pub fn empty() -> Self {
        Self::text("")
    }

    /// Recognition failed with `err`.
    pub fn failed(err: &NovaError) -> Self {
        Self {
            text: String::new(),
            error: Some(err.message().to_owned()),
        }
    }

    /// Whether this outcome carries a fault.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Read a 16-bit PCM WAV into submission form.
fn read_linear(path: &Path) -> Result<LinearAudio> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| NovaError::Stt(format!("unreadable WAV {}: {e}", path.display())))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(NovaError::Stt(format!(
            "expected 16-bit PCM, got {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }
    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NovaError::Stt(format!("corrupt WAV data: {e}")))?;
    Ok(LinearAudio::from_samples(
        &samples,
        spec.sample_rate,
        spec.channels,
    ))
}

/// Submits decoded audio to a [`Recognizer`].
#[derive(Clone)]
pub struct Transcriber {
    recognizer: Arc<dyn Recognizer>,
}

impl std::fmt::Debug for Transcriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcriber")
            .field("recognizer", &self.recognizer.name())
            .finish()
    }
}

impl Transcriber {
    /// Create a transcriber over `recognizer`.
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer }
    }

    /// Transcribe `decoded`.
    ///
    /// Faults reading the file or calling the service become a transcript
    /// with empty text and an `error`; no confident result becomes an empty
    /// transcript without one.
    pub async fn transcribe(&self, decoded: &DecodedAudio) -> Transcript {
        let path = decoded.path().to_path_buf();
        let audio = match tokio::task::spawn_blocking(move || read_linear(&path)).await {
            Ok(Ok(audio)) => audio,
            Ok(Err(e)) => {
                warn!("cannot read decoded audio: {e}");
                return Transcript::failed(&e);
            }
            Err(e) => {
                let err = NovaError::Stt(format!("WAV reader task failed: {e}"));
                warn!("{err}");
                return Transcript::failed(&err);
            }
        };

        info!(
            "recognizing {:.1}s of audio via {}",
            audio.duration_secs(),
            self.recognizer.name()
        );
        match self.recognizer.recognize(&audio).await {
            Ok(Some(text)) => Transcript::text(text),
            Ok(None) => {
                info!("no confident transcription");
                Transcript::empty()
            }
            Err(e) => {
                warn!("speech recognition failed: {e}");
                Transcript::failed(&e)
            }
        }
    }
}

/// Upload bytes to transcript, with temp files confined to one call.
#[derive(Debug, Clone)]
pub struct TranscriptionPipeline {
    transcoder: AudioTranscoder,
    transcriber: Transcriber,
    temp_dir: PathBuf,
}

impl TranscriptionPipeline {
    /// Compose the pipeline; temp files go under `temp_dir`.
    pub fn new(
        transcoder: AudioTranscoder,
        transcriber: Transcriber,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transcoder,
            transcriber,
            temp_dir: temp_dir.into(),
        }
    }

    /// Transcribe uploaded container bytes.
    ///
    /// Every temp file created along the way is removed before this returns.
    pub async fn run(&self, bytes: &[u8]) -> Transcript {
        let mut janitor = ResourceJanitor::new(&self.temp_dir);
        match self.transcoder.decode(&mut janitor, bytes).await {
            Ok(decoded) => self.transcriber.transcribe(&decoded).await,
            Err(e) => {
                warn!("audio conversion failed: {e}");
                Transcript::failed(&e)
            }
        }
    }
}
