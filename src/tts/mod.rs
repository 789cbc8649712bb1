//! Text-to-speech.
//!
//! [`Synthesizer`] validates input and manages the output file;
//! a [`SpeechSynthesizer`] backend ([`edge::EdgeTtsSynthesizer`] in
//! production) renders the audio.

pub mod edge;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::audio::janitor::ResourceJanitor;
use crate::error::{NovaError, Result};

pub use edge::{EdgeTtsConfig, EdgeTtsSynthesizer};

/// Suffix of synthesized files.
const OUTPUT_SUFFIX: &str = ".mp3";

/// An external speech synthesis service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Short service name for logs.
    fn name(&self) -> &str;

    /// Render `text` in `voice` as MP3 into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails or produces no audio. A
    /// partially written `output` may remain; the caller removes it.
    async fn synthesize_to(&self, text: &str, voice: &str, output: &Path) -> Result<()>;
}

/// A finished MP3 file now owned by the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct SynthesizedAudio {
    path: PathBuf,
}

impl SynthesizedAudio {
    /// Location of the MP3 file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the path without deleting the file.
    pub fn into_path(self) -> PathBuf {
        self.path
    }

    /// Read the whole file.
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    /// Delete the file.
    pub async fn discard(self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Turns reply text into an MP3 file.
#[derive(Clone)]
pub struct Synthesizer {
    backend: Arc<dyn SpeechSynthesizer>,
    temp_dir: PathBuf,
    default_voice: String,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("backend", &self.backend.name())
            .field("temp_dir", &self.temp_dir)
            .field("default_voice", &self.default_voice)
            .finish()
    }
}

impl Synthesizer {
    /// Create a synthesizer writing files under `temp_dir`.
    pub fn new(
        backend: Arc<dyn SpeechSynthesizer>,
        temp_dir: impl Into<PathBuf>,
        default_voice: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            temp_dir: temp_dir.into(),
            default_voice: default_voice.into(),
        }
    }

    /// Voice used when the caller does not pick one.
    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    /// Synthesize `text`, returning a file the caller must clean up.
    ///
    /// # Errors
    ///
    /// Empty or whitespace-only text is rejected with
    /// [`NovaError::InvalidInput`] before the backend is contacted. Backend
    /// failures are propagated after the partial file is removed.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<SynthesizedAudio> {
        if text.trim().is_empty() {
            return Err(NovaError::InvalidInput("No text".into()));
        }
        let voice = voice.unwrap_or(&self.default_voice);

        let mut janitor = ResourceJanitor::new(&self.temp_dir);
        let path = janitor.acquire(OUTPUT_SUFFIX);
        if let Err(e) = self.backend.synthesize_to(text, voice, &path).await {
            warn!("{} synthesis failed: {e}", self.backend.name());
            return Err(e);
        }
        janitor.release(&path);
        info!(
            "synthesized {} chars with {voice} to {}",
            text.chars().count(),
            path.display()
        );
        Ok(SynthesizedAudio { path })
    }
}
