//! Generation capability: turn types, SSE decoding and backends.
//!
//! The [`provider::GenerationBackend`] trait is the seam between the chat
//! engine and any concrete model API. [`gemini::GeminiBackend`] is the
//! production implementation.

pub mod gemini;
pub mod message;
pub mod provider;
pub mod sse;

pub use gemini::{GeminiBackend, GeminiConfig};
pub use message::{Message, Role};
pub use provider::{FragmentStream, GenerationBackend, GenerationRequest};
