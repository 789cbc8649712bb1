//! Speech recognition capability.

use async_trait::async_trait;

use crate::error::Result;

/// Little-endian 16-bit PCM ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearAudio {
    /// Interleaved `i16` samples encoded little-endian.
    pub pcm: Vec<u8>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
}

impl LinearAudio {
    /// Encode samples as LINEAR16.
    pub fn from_samples(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let pcm = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self {
            pcm,
            sample_rate,
            channels,
        }
    }

    /// Audio length in seconds.
    pub fn duration_secs(&self) -> f32 {
        let frames = self.pcm.len() / 2 / usize::from(self.channels.max(1));
        frames as f32 / self.sample_rate.max(1) as f32
    }
}

/// An external speech-to-text service.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Short service name for logs.
    fn name(&self) -> &str;

    /// Recognize one utterance.
    ///
    /// Returns `Ok(None)` when the service produced no confident result.
    ///
    /// # Errors
    ///
    /// Returns an error when the service cannot be reached or rejects the request.
    async fn recognize(&self, audio: &LinearAudio) -> Result<Option<String>>;
}
