//! Configuration types for the nova gateway.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{NovaError, Result};

/// System instruction bound to every new conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Dr. Nova, a highly experienced, empathetic, and professional AI medical consultant.
Your goal is to assist users with medical questions, symptom analysis, and health advice.

Rules:
1. Tone: Professional, reassuring, clinical but accessible (like a top-tier human doctor).
2. Knowledge: Use advanced medical knowledge (pharmacology, pathology, anatomy).
3. Structure:
   - Acknowledge the symptoms.
   - Ask clarifying questions if needed.
   - Provide a differential diagnosis (potential causes).
   - Recommend treatments, home remedies, or medicines (generic names + common brands).
   - ALWAYS conclude with a disclaimer: \"I am an AI. Please consult a physical doctor for emergencies.\"
4. Formatting: Use Markdown. Use **Bold** for medicine names and headers. Use lists for symptoms/treatments.
";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NovaConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Generation backend settings.
    pub llm: LlmConfig,
    /// Speech recognition settings.
    pub stt: SttConfig,
    /// Speech synthesis settings.
    pub tts: TtsConfig,
    /// Upload transcoding settings.
    pub audio: AudioConfig,
    /// Session retention settings.
    pub sessions: SessionConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5000,
        }
    }
}

/// Generation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the Gemini API.
    pub base_url: String,
    /// Model name to request.
    pub model: String,
    /// API key. Usually supplied through `GEMINI_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// System instruction bound to new sessions.
    pub system_prompt: String,
    /// Upper bound for the initial request and for each wait between fragments.
    pub timeout_secs: u64,
    /// Capacity of the fragment channel between producer and HTTP body.
    pub stream_buffer: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            model: "gemini-2.0-flash".to_owned(),
            api_key: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            timeout_secs: 120,
            stream_buffer: 32,
        }
    }
}

impl LlmConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Speech recognition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Base URL of the Google Speech API.
    pub base_url: String,
    /// Cloud Speech-to-Text API key, from `GOOGLE_SPEECH_API_KEY`.
    ///
    /// Falls back to the generation key when unset; that key only works if
    /// its project has the Speech-to-Text API enabled.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// BCP-47 language code.
    pub language: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: "https://speech.googleapis.com".to_owned(),
            api_key: String::new(),
            language: "en-US".to_owned(),
            timeout_secs: 30,
        }
    }
}

impl SttConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Voice short name.
    pub voice: String,
    /// Websocket endpoint of the read-aloud service.
    pub endpoint: String,
    /// Upper bound for one synthesis turn, in seconds.
    pub timeout_secs: u64,
    /// Keep synthesized files on disk after they are served.
    pub retain_output_files: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice: "en-US-BrianNeural".to_owned(),
            endpoint: crate::tts::edge::DEFAULT_ENDPOINT.to_owned(),
            timeout_secs: 60,
            retain_output_files: false,
        }
    }
}

impl TtsConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Upload transcoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Target sample rate of the decoded container.
    pub sample_rate: u32,
    /// Target channel count of the decoded container.
    pub channels: u16,
    /// Upper bound for one conversion, in seconds.
    pub timeout_secs: u64,
    /// Directory for temporary audio files (None = OS temp dir).
    pub temp_dir: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_owned(),
            sample_rate: 16_000,
            channels: 1,
            timeout_secs: 60,
            temp_dir: None,
        }
    }
}

impl AudioConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Directory that temporary audio files are created in.
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Session retention configuration.
///
/// Both bounds are off by default, so sessions live for the whole process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Evict sessions idle for longer than this many seconds.
    pub idle_ttl_secs: Option<u64>,
    /// Keep at most this many sessions, evicting the least recently active.
    pub max_sessions: Option<usize>,
}

impl NovaConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| NovaError::Config(e.to_string()))
    }

    /// Load the file if it exists, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(
                "config file not found, using defaults: {}",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_default(path: &Path) -> Result<()> {
        Self::default().save_to_file(path)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NovaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognized: `GEMINI_API_KEY`, `GOOGLE_SPEECH_API_KEY`, `NOVA_HOST`, `NOVA_PORT`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(key) = non_empty("GOOGLE_SPEECH_API_KEY") {
            self.stt.api_key = key;
        }
        if self.stt.api_key.is_empty() {
            self.stt.api_key = self.llm.api_key.clone();
        }
        if let Some(host) = non_empty("NOVA_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("NOVA_PORT") {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("ignoring invalid NOVA_PORT value: {port}"),
            }
        }
    }

    /// Check values that would make the gateway unusable.
    ///
    /// # Errors
    ///
    /// Returns [`NovaError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(NovaError::Config("llm.model must not be empty".into()));
        }
        if self.llm.stream_buffer == 0 {
            return Err(NovaError::Config("llm.stream_buffer must be at least 1".into()));
        }
        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            return Err(NovaError::Config(
                "audio.sample_rate and audio.channels must be positive".into(),
            ));
        }
        if self.tts.voice.trim().is_empty() {
            return Err(NovaError::Config("tts.voice must not be empty".into()));
        }
        if self.sessions.idle_ttl_secs == Some(0) {
            return Err(NovaError::Config(
                "sessions.idle_ttl_secs must be positive (omit it to keep sessions forever)".into(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path.
    ///
    /// `NOVA_CONFIG` wins; otherwise `<config dir>/nova/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(path) = std::env::var_os("NOVA_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .map(|dir| dir.join("nova").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
