//! Browser upload to linear PCM conversion.
//!
//! [`AudioTranscoder::decode`] writes the uploaded container bytes to a
//! janitor-owned path and asks a [`ContainerConverter`] to produce a
//! 16-bit PCM WAV next to it. Both files belong to the caller's janitor.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::janitor::ResourceJanitor;
use crate::config::AudioConfig;
use crate::error::{NovaError, Result};

/// Suffix for the stored upload. Browsers record `audio/webm` by default.
const SOURCE_SUFFIX: &str = ".webm";
/// Suffix for the converted output.
const TARGET_SUFFIX: &str = ".wav";

/// Linear output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormat {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count.
    pub channels: u16,
}

impl Default for TargetFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

impl From<&AudioConfig> for TargetFormat {
    fn from(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
        }
    }
}

/// Converts a compressed container file into a linear WAV file.
#[async_trait]
pub trait ContainerConverter: Send + Sync {
    /// Convert `source` into `destination` using `target`.
    ///
    /// # Errors
    ///
    /// Returns [`NovaError::Transcode`] or [`NovaError::Timeout`] on failure.
    async fn convert(&self, source: &Path, destination: &Path, target: TargetFormat) -> Result<()>;
}

/// Converter backed by an `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegConverter {
    /// Use `program` with a per-conversion `timeout`.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Command-line arguments for one conversion.
    pub fn args(source: &Path, destination: &Path, target: TargetFormat) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(source.as_os_str().to_owned());
        args.extend(
            [
                "-ac".to_owned(),
                target.channels.to_string(),
                "-ar".to_owned(),
                target.sample_rate.to_string(),
                "-c:a".to_owned(),
                "pcm_s16le".to_owned(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(destination.as_os_str().to_owned());
        args
    }
}

impl From<&AudioConfig> for FfmpegConverter {
    fn from(config: &AudioConfig) -> Self {
        Self::new(&config.ffmpeg_path, config.timeout())
    }
}

#[async_trait]
impl ContainerConverter for FfmpegConverter {
    async fn convert(&self, source: &Path, destination: &Path, target: TargetFormat) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(Self::args(source, destination, target))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(NovaError::Transcode(format!(
                    "failed to run {}: {e}",
                    self.program.display()
                )));
            }
            Err(_) => {
                return Err(NovaError::Timeout(format!(
                    "audio conversion exceeded {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(NovaError::Transcode(if detail.is_empty() {
                format!("ffmpeg exited with {}", output.status)
            } else {
                format!("ffmpeg exited with {}: {detail}", output.status)
            }));
        }
        if !destination.exists() {
            return Err(NovaError::Transcode(
                "ffmpeg reported success but produced no output".into(),
            ));
        }
        Ok(())
    }
}

/// A converted linear file owned by a janitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    path: PathBuf,
    format: TargetFormat,
}

impl DecodedAudio {
    /// Wrap an existing linear file.
    pub fn new(path: impl Into<PathBuf>, format: TargetFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Location of the WAV file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layout requested from the converter.
    pub fn format(&self) -> TargetFormat {
        self.format
    }
}

/// Turns uploaded container bytes into [`DecodedAudio`].
#[derive(Clone)]
pub struct AudioTranscoder {
    converter: Arc<dyn ContainerConverter>,
    target: TargetFormat,
}

impl std::fmt::Debug for AudioTranscoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTranscoder")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl AudioTranscoder {
    /// Create a transcoder producing `target` through `converter`.
    pub fn new(converter: Arc<dyn ContainerConverter>, target: TargetFormat) -> Self {
        Self { converter, target }
    }

    /// Convert `bytes` into a linear file whose path is owned by `janitor`.
    ///
    /// # Errors
    ///
    /// Rejects empty input with [`NovaError::InvalidInput`]; otherwise
    /// propagates write and conversion failures. Files already written stay
    /// owned by `janitor` and are removed when it drops.
    pub async fn decode(&self, janitor: &mut ResourceJanitor, bytes: &[u8]) -> Result<DecodedAudio> {
        if bytes.is_empty() {
            return Err(NovaError::InvalidInput("empty audio upload".into()));
        }

        let source = janitor.acquire(SOURCE_SUFFIX);
        tokio::fs::write(&source, bytes).await?;
        debug!("stored {} byte upload at {}", bytes.len(), source.display());

        let destination = janitor.acquire(TARGET_SUFFIX);
        self.converter
            .convert(&source, &destination, self.target)
            .await?;
        info!(
            "converted upload to {} Hz / {} ch",
            self.target.sample_rate, self.target.channels
        );
        Ok(DecodedAudio::new(destination, self.target))
    }
}
