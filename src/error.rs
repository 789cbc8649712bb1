//! Error types for the nova gateway.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`NovaError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The caller supplied unusable input (empty text, empty upload).
    pub const INVALID_INPUT: &str = "INVALID_INPUT";

    /// The generation backend failed or returned an error.
    pub const GENERATION_FAILED: &str = "GENERATION_FAILED";

    /// Audio container conversion failed.
    pub const TRANSCODE_FAILED: &str = "TRANSCODE_FAILED";

    /// The speech recognition service failed.
    pub const STT_FAILED: &str = "STT_FAILED";

    /// The speech synthesis service failed.
    pub const TTS_FAILED: &str = "TTS_FAILED";

    /// An external call exceeded its time budget.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";

    /// A temporary file could not be written, read or removed.
    pub const IO_ERROR: &str = "IO_ERROR";

    /// The HTTP server could not be started.
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
}

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum NovaError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// The caller supplied unusable input.
    #[error("[{}] {}", error_codes::INVALID_INPUT, .0)]
    InvalidInput(String),

    /// Generation backend error.
    #[error("[{}] {}", error_codes::GENERATION_FAILED, .0)]
    Generation(String),

    /// Container conversion error.
    #[error("[{}] {}", error_codes::TRANSCODE_FAILED, .0)]
    Transcode(String),

    /// Speech-to-text error.
    #[error("[{}] {}", error_codes::STT_FAILED, .0)]
    Stt(String),

    /// Text-to-speech error.
    #[error("[{}] {}", error_codes::TTS_FAILED, .0)]
    Tts(String),

    /// An external call timed out.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    Timeout(String),

    /// I/O error on a temporary resource.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(String),

    /// Server startup error.
    #[error("[{}] {}", error_codes::SERVER_ERROR, .0)]
    Server(String),
}

impl NovaError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::InvalidInput(_) => error_codes::INVALID_INPUT,
            Self::Generation(_) => error_codes::GENERATION_FAILED,
            Self::Transcode(_) => error_codes::TRANSCODE_FAILED,
            Self::Stt(_) => error_codes::STT_FAILED,
            Self::Tts(_) => error_codes::TTS_FAILED,
            Self::Timeout(_) => error_codes::TIMEOUT_ERROR,
            Self::Io(_) => error_codes::IO_ERROR,
            Self::Server(_) => error_codes::SERVER_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(m)
            | Self::InvalidInput(m)
            | Self::Generation(m)
            | Self::Transcode(m)
            | Self::Stt(m)
            | Self::Tts(m)
            | Self::Timeout(m)
            | Self::Io(m)
            | Self::Server(m) => m,
        }
    }

    /// Whether the error was caused by the caller's input rather than a
    /// service or resource fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<std::io::Error> for NovaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NovaError>;
