//! Drives one conversation turn and streams the model output.
//!
//! A spawned producer task owns the exchange: it locks the session, appends
//! the user turn, starts the backend stream and forwards each fragment onto
//! a bounded channel. The caller consumes the receiving end as a stream.
//!
//! Faults never surface as stream errors. The producer sends one final
//! fragment built by [`error_fragment`] and stops, so a consumer that writes
//! fragments straight into a `text/plain` body never has to switch protocol.
//! Consumers that need to tell content from errors check
//! [`is_error_fragment`].
//!
//! Dropping the receiving stream (client disconnect) stops the producer; it
//! no longer polls the backend and records whatever text was delivered. A
//! consumer that stays connected but stops reading is treated the same way
//! once a send has waited longer than the responder timeout, so a stalled
//! client cannot hold the session lock indefinitely.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::NovaError;
use crate::llm::message::Message;
use crate::llm::provider::{GenerationBackend, GenerationRequest};
use crate::session::store::SessionHandle;

/// Prefix of every error fragment.
pub const ERROR_MARKER_PREFIX: &str = "\n**Error:** ";

/// Build the fragment that reports `err` inside the text stream.
pub fn error_fragment(err: &NovaError) -> String {
    format!("{ERROR_MARKER_PREFIX}{}", err.message())
}

/// Whether a fragment is an error marker rather than model content.
pub fn is_error_fragment(fragment: &str) -> bool {
    fragment.starts_with(ERROR_MARKER_PREFIX)
}

/// Single-use stream of fragments for one exchange.
pub type ResponseStream = ReceiverStream<String>;

/// Tuning for [`StreamingResponder`].
#[derive(Debug, Clone, Copy)]
pub struct ResponderOptions {
    /// Bound on starting the backend call, on each wait for a fragment and
    /// on each wait for the consumer to accept one.
    pub timeout: Duration,
    /// Channel capacity between producer and consumer.
    pub buffer: usize,
}

impl Default for ResponderOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            buffer: 32,
        }
    }
}

impl From<&LlmConfig> for ResponderOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            timeout: config.timeout(),
            buffer: config.stream_buffer.max(1),
        }
    }
}

/// How an exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Cancelled,
    Stalled,
}

/// Streams generated replies and keeps session history in step.
#[derive(Clone)]
pub struct StreamingResponder {
    backend: Arc<dyn GenerationBackend>,
    options: ResponderOptions,
}

impl std::fmt::Debug for StreamingResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponder")
            .field("backend", &self.backend.name())
            .field("options", &self.options)
            .finish()
    }
}

impl StreamingResponder {
    /// Create a responder over `backend`.
    pub fn new(backend: Arc<dyn GenerationBackend>, options: ResponderOptions) -> Self {
        Self { backend, options }
    }

    /// Start one exchange on `session` and return its fragment stream.
    ///
    /// The user turn is appended before the backend is called. The assembled
    /// assistant turn is appended once the backend stream completes. Other
    /// exchanges on the same session wait until this one has finished.
    pub fn respond(&self, session: SessionHandle, user_message: impl Into<String>) -> ResponseStream {
        let (tx, rx) = mpsc::channel(self.options.buffer.max(1));
        let backend = Arc::clone(&self.backend);
        let timeout = self.options.timeout;
        let user_message = user_message.into();

        tokio::spawn(async move {
            run_exchange(backend, session, user_message, tx, timeout).await;
        });

        ReceiverStream::new(rx)
    }
}

async fn run_exchange(
    backend: Arc<dyn GenerationBackend>,
    session: SessionHandle,
    user_message: String,
    tx: mpsc::Sender<String>,
    timeout: Duration,
) {
    let mut session = session.lock_owned().await;
    session.push(Message::user(user_message));
    info!(
        session = session.id(),
        turns = session.turns().len(),
        backend = backend.name(),
        "starting exchange"
    );

    let request = GenerationRequest {
        system_instruction: session.system_instruction(),
        history: session.turns(),
    };
    let started = tokio::select! {
        _ = tx.closed() => None,
        started = tokio::time::timeout(timeout, backend.stream(request)) => Some(started),
    };

    let mut assembled = String::new();
    let outcome = match started {
        None => Outcome::Cancelled,
        Some(Err(_)) => {
            let err = NovaError::Timeout(format!(
                "generation did not start within {}s",
                timeout.as_secs()
            ));
            send_error(&tx, &err, timeout).await
        }
        Some(Ok(Err(err))) => send_error(&tx, &err, timeout).await,
        Some(Ok(Ok(mut fragments))) => loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => break Outcome::Cancelled,
                next = tokio::time::timeout(timeout, fragments.next()) => next,
            };
            match next {
                Err(_) => {
                    let err = NovaError::Timeout(format!(
                        "no output from the model for {}s",
                        timeout.as_secs()
                    ));
                    break send_error(&tx, &err, timeout).await;
                }
                Ok(None) => break Outcome::Completed,
                Ok(Some(Err(err))) => break send_error(&tx, &err, timeout).await,
                Ok(Some(Ok(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    debug!(len = text.len(), "forwarding fragment");
                    match tx.send_timeout(text.clone(), timeout).await {
                        Ok(()) => assembled.push_str(&text),
                        Err(SendTimeoutError::Closed(_)) => break Outcome::Cancelled,
                        Err(SendTimeoutError::Timeout(_)) => {
                            warn!("consumer stopped reading for {}s", timeout.as_secs());
                            break Outcome::Stalled;
                        }
                    }
                }
            }
        },
    };

    match outcome {
        Outcome::Completed | Outcome::Cancelled | Outcome::Stalled if !assembled.is_empty() => {
            session.push(Message::assistant(assembled));
        }
        _ => {}
    }
    info!(
        session = session.id(),
        outcome = ?outcome,
        turns = session.turns().len(),
        "exchange finished"
    );
}

/// Deliver an error marker; a vanished consumer turns the failure into a cancellation.
async fn send_error(tx: &mpsc::Sender<String>, err: &NovaError, timeout: Duration) -> Outcome {
    warn!("generation failed: {err}");
    match tx.send_timeout(error_fragment(err), timeout).await {
        Ok(()) => Outcome::Failed,
        Err(SendTimeoutError::Closed(_)) => Outcome::Cancelled,
        Err(SendTimeoutError::Timeout(_)) => Outcome::Stalled,
    }
}
