//! Conversation turn types.
//!
//! # Examples
//!
//! ```
//! use nova::llm::message::{Message, Role};
//!
//! let turn = Message::user("I have a headache");
//! assert_eq!(turn.role, Role::User);
//! assert_eq!(turn.content, "I have a headache");
//! ```

use serde::{Deserialize, Serialize};

/// Who authored a turn.
///
/// The system instruction is not a turn; it is bound to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input.
    User,
    /// Model output.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this turn.
    pub role: Role,
    /// Plain text content.
    pub content: String,
}

impl Message {
    /// Create a turn with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}
