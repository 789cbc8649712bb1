//! Generation backend trait.
//!
//! A backend receives the system instruction and the full ordered turn
//! history (ending with the newest user turn) and returns a stream of
//! text fragments in arrival order.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::message::Message;
use crate::error::NovaError;

/// A boxed stream of text fragments. An `Err` item is a fault raised mid-stream.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, NovaError>> + Send>>;

/// Context handed to a backend for one turn.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Instruction bound to the session.
    pub system_instruction: &'a str,
    /// Every turn so far, oldest first. The last entry is the new user turn.
    pub history: &'a [Message],
}

/// An external text generation capability.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short backend name for logs (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Start an incremental generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started (connection refused,
    /// authentication or HTTP failure). Faults after the first fragment are
    /// delivered as `Err` items on the stream.
    async fn stream(&self, request: GenerationRequest<'_>) -> Result<FragmentStream, NovaError>;
}
