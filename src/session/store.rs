//! Session storage trait and in-memory implementation.
//!
//! Defines the [`SessionStore`] trait and [`MemorySessionStore`], a
//! process-local map parameterized by an [`ExpiryPolicy`].
//!
//! Each session lives behind its own [`tokio::sync::Mutex`]. A caller that
//! holds the lock for a whole exchange (user turn → generation → assistant
//! turn) makes that exchange atomic with respect to other requests on the
//! same id, while different ids never contend.
//!
//! # Examples
//!
//! ```
//! use nova::session::store::{ExpiryPolicy, MemorySessionStore, SessionStore};
//!
//! # async fn example() {
//! let store = MemorySessionStore::new("Be helpful.", ExpiryPolicy::never());
//! let handle = store.get_or_create("chat-1").await;
//! assert!(handle.lock().await.turns().is_empty());
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use super::types::{Session, SessionId};
use crate::config::SessionConfig;

/// Shared, lockable handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// When stored sessions may be dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Drop sessions not touched for this long.
    pub idle_ttl: Option<Duration>,
    /// Keep at most this many sessions.
    pub max_sessions: Option<usize>,
}

impl ExpiryPolicy {
    /// Sessions live for the whole process.
    pub fn never() -> Self {
        Self::default()
    }

    /// Whether the policy can ever evict anything.
    pub fn is_unbounded(&self) -> bool {
        self.idle_ttl.is_none() && self.max_sessions.is_none()
    }
}

impl From<&SessionConfig> for ExpiryPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            idle_ttl: config
                .idle_ttl_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_sessions: config.max_sessions.filter(|n| *n > 0),
        }
    }
}

/// Async session storage backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the session for `id`, creating an empty one bound to the
    /// store's system instruction on first contact. Never fails.
    async fn get_or_create(&self, id: &str) -> SessionHandle;

    /// Return the session for `id` if it exists.
    async fn get(&self, id: &str) -> Option<SessionHandle>;

    /// Number of stored sessions.
    async fn len(&self) -> usize;

    /// Whether the store holds no sessions.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply the expiry policy now, returning how many sessions were dropped.
    async fn evict_expired(&self) -> usize;
}

#[derive(Debug)]
struct Entry {
    handle: SessionHandle,
    touched: Instant,
}

impl Entry {
    /// A session is in use while someone other than the map holds its handle.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.handle) > 1
    }
}

/// In-memory session store.
///
/// Cheaply cloneable; clones share the same map.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Entry>>>,
    system_instruction: Arc<str>,
    policy: ExpiryPolicy,
}

impl MemorySessionStore {
    /// Create an empty store binding new sessions to `system_instruction`.
    pub fn new(system_instruction: impl Into<String>, policy: ExpiryPolicy) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            system_instruction: Arc::from(system_instruction.into()),
            policy,
        }
    }

    /// The active expiry policy.
    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Drop expired entries from an already locked map, sparing `keep`.
    fn sweep(&self, sessions: &mut HashMap<SessionId, Entry>, keep: Option<&str>) -> usize {
        if self.policy.is_unbounded() {
            return 0;
        }
        let before = sessions.len();

        if let Some(ttl) = self.policy.idle_ttl {
            let now = Instant::now();
            sessions.retain(|id, entry| {
                Some(id.as_str()) == keep
                    || entry.in_use()
                    || now.duration_since(entry.touched) <= ttl
            });
        }

        if let Some(max) = self.policy.max_sessions
            && sessions.len() > max
        {
            let mut candidates: Vec<(SessionId, Instant)> = sessions
                .iter()
                .filter(|(id, entry)| Some(id.as_str()) != keep && !entry.in_use())
                .map(|(id, entry)| (id.clone(), entry.touched))
                .collect();
            candidates.sort_by_key(|(_, touched)| *touched);
            let excess = sessions.len() - max;
            for (id, _) in candidates.into_iter().take(excess) {
                sessions.remove(&id);
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!("evicted {evicted} expired session(s)");
        }
        evicted
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(&self, id: &str) -> SessionHandle {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let handle = match sessions.get_mut(id) {
            Some(entry) => {
                entry.touched = now;
                Arc::clone(&entry.handle)
            }
            None => {
                debug!("creating session {id}");
                let handle = Arc::new(Mutex::new(Session::new(
                    id,
                    self.system_instruction.as_ref(),
                )));
                sessions.insert(
                    id.to_owned(),
                    Entry {
                        handle: Arc::clone(&handle),
                        touched: now,
                    },
                );
                handle
            }
        };
        self.sweep(&mut sessions, Some(id));
        handle
    }

    async fn get(&self, id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(|entry| Arc::clone(&entry.handle))
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn evict_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.sweep(&mut sessions, None)
    }
}
