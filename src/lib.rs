//! Nova: a voice consultation gateway.
//!
//! Three request flows share one process:
//!
//! - **Chat**: a per-id [`session`] history feeds a streaming generation
//!   backend ([`llm`]); [`chat::StreamingResponder`] relays fragments as
//!   they arrive and records the assistant turn.
//! - **Transcription**: an uploaded browser recording is converted to
//!   linear PCM ([`audio`]) and sent to a recognizer ([`stt`]). Temp files
//!   never outlive the request.
//! - **Synthesis**: reply text becomes an MP3 ([`tts`]).
//!
//! [`server`] exposes the flows over HTTP.
//!
//! ## Credentials
//!
//! Chat needs `GEMINI_API_KEY`. Transcription calls the Cloud
//! Speech-to-Text `speech:recognize` API, which needs its own key:
//! `GOOGLE_SPEECH_API_KEY`, or the Gemini key when its project has that API
//! enabled. Without a usable key every upload answers `{text: "", error}`.
//! Synthesis needs no credential.

pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod server;
pub mod session;
pub mod stt;
pub mod tts;

pub use config::NovaConfig;
pub use error::{NovaError, Result};
pub use server::{AppState, NovaServer};
