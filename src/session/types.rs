//! Conversation session state.
//!
//! # Examples
//!
//! ```
//! use nova::session::types::Session;
//! use nova::llm::Message;
//!
//! let mut session = Session::new("chat-1", "Be helpful.");
//! session.push(Message::user("hello"));
//! assert_eq!(session.turns().len(), 1);
//! assert_eq!(session.system_instruction(), "Be helpful.");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::message::Message;

/// Opaque caller-supplied session identifier.
pub type SessionId = String;

/// Identifier used when a request does not name a session.
pub const DEFAULT_SESSION_ID: &str = "default";

/// One conversation thread.
///
/// The system instruction is fixed at construction and the turn list is
/// append-only; fields are private so neither can be rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    system_instruction: String,
    turns: Vec<Message>,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl Session {
    /// Create an empty session bound to `system_instruction`.
    pub fn new(id: impl Into<SessionId>, system_instruction: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            system_instruction: system_instruction.into(),
            turns: Vec::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Instruction bound at creation.
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Turns in the order they were appended.
    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When a turn was last appended.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Append a turn.
    pub fn push(&mut self, message: Message) {
        self.turns.push(message);
        self.last_active = Utc::now();
    }
}
