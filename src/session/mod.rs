//! Per-conversation state shared across requests.

pub mod store;
pub mod types;

pub use store::{ExpiryPolicy, MemorySessionStore, SessionHandle, SessionStore};
pub use types::{DEFAULT_SESSION_ID, Session, SessionId};
