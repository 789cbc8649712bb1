//! Shared handler state.

use std::sync::Arc;
use std::time::Duration;

use crate::audio::transcode::{AudioTranscoder, FfmpegConverter, TargetFormat};
use crate::chat::responder::{ResponderOptions, StreamingResponder};
use crate::config::NovaConfig;
use crate::error::Result;
use crate::llm::gemini::{GeminiBackend, GeminiConfig};
use crate::session::store::{ExpiryPolicy, MemorySessionStore, SessionStore};
use crate::stt::google::{GoogleSpeechConfig, GoogleSpeechRecognizer};
use crate::stt::transcriber::{Transcriber, TranscriptionPipeline};
use crate::tts::Synthesizer;
use crate::tts::edge::{EdgeTtsConfig, EdgeTtsSynthesizer};

/// Everything the HTTP handlers need. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Conversation sessions keyed by chat id.
    pub sessions: Arc<dyn SessionStore>,
    /// Drives chat exchanges.
    pub responder: StreamingResponder,
    /// Renders reply text to MP3.
    pub synthesizer: Synthesizer,
    /// Upload to transcript.
    pub transcription: TranscriptionPipeline,
    /// Keep synthesized files after they are served.
    pub retain_tts_files: bool,
    /// How often to sweep expired sessions; `None` disables the sweeper.
    pub sweep_interval: Option<Duration>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("responder", &self.responder)
            .field("synthesizer", &self.synthesizer)
            .field("transcription", &self.transcription)
            .field("retain_tts_files", &self.retain_tts_files)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire production backends from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend HTTP client cannot be built.
    pub fn from_config(config: &NovaConfig) -> Result<Self> {
        let policy = ExpiryPolicy::from(&config.sessions);
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(
            config.llm.system_prompt.clone(),
            policy,
        ));

        let backend = Arc::new(GeminiBackend::new(GeminiConfig::from(&config.llm)));
        let responder = StreamingResponder::new(backend, ResponderOptions::from(&config.llm));

        let temp_dir = config.audio.resolved_temp_dir();
        let synthesizer = Synthesizer::new(
            Arc::new(EdgeTtsSynthesizer::new(EdgeTtsConfig::from(&config.tts))),
            &temp_dir,
            config.tts.voice.clone(),
        );

        let transcoder = AudioTranscoder::new(
            Arc::new(FfmpegConverter::from(&config.audio)),
            TargetFormat::from(&config.audio),
        );
        let recognizer = GoogleSpeechRecognizer::new(GoogleSpeechConfig::from(&config.stt))?;
        let transcription = TranscriptionPipeline::new(
            transcoder,
            Transcriber::new(Arc::new(recognizer)),
            &temp_dir,
        );

        Ok(Self {
            sessions,
            responder,
            synthesizer,
            transcription,
            retain_tts_files: config.tts.retain_output_files,
            sweep_interval: policy.idle_ttl,
        })
    }
}
