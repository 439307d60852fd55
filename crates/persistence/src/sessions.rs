//! TTL-bounded per-call session storage
//!
//! Sessions are keyed by call id. Every mutation refreshes the session's
//! expiry; reads do not. A second map resolves provider control identifiers
//! to call ids and outlives the sessions it points at.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use call_agent_config::SessionConfig;
use call_agent_core::{
    CallSession, ConversationTurn, NewTurn, SessionStatus, ToolResult,
};

use crate::StoreError;

/// Session storage interface
///
/// Absence on read is `Ok(None)`; mutating an absent session is
/// [`StoreError::NotFound`].
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Store a new session. Fails if a live session with the id exists.
    async fn create(&self, session: CallSession) -> Result<(), StoreError>;

    /// Fetch a snapshot of the session
    async fn get(&self, call_id: &str) -> Result<Option<CallSession>, StoreError>;

    async fn set_status(&self, call_id: &str, status: SessionStatus) -> Result<(), StoreError>;

    async fn set_speaking(&self, call_id: &str, speaking: bool) -> Result<(), StoreError>;

    /// Append a turn and return its assigned index
    async fn append_turn(&self, call_id: &str, turn: NewTurn) -> Result<u32, StoreError>;

    async fn set_pending_tool_results(
        &self,
        call_id: &str,
        results: HashMap<String, ToolResult>,
    ) -> Result<(), StoreError>;

    /// The most recent `n` turns, oldest first
    async fn context(&self, call_id: &str, n: usize) -> Result<Vec<ConversationTurn>, StoreError>;

    /// Remove the session, returning it if it was live
    async fn delete(&self, call_id: &str) -> Result<Option<CallSession>, StoreError>;

    async fn map_control_id(&self, control_id: &str, call_id: &str) -> Result<(), StoreError>;

    async fn resolve_control_id(&self, control_id: &str) -> Result<Option<String>, StoreError>;
}

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process session store
///
/// Each call id lives in its own map shard entry, so mutations of one call
/// never contend with another.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Expiring<CallSession>>,
    control_ids: DashMap<String, Expiring<String>>,
    ttl: Duration,
    control_id_ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, control_id_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            control_ids: DashMap::new(),
            ttl,
            control_id_ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.ttl_secs),
            Duration::from_secs(config.control_id_ttl_secs),
        )
    }

    /// Number of live sessions
    pub fn count(&self) -> usize {
        let now = Instant::now();
        self.sessions.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Drop expired sessions and control-id mappings, returning how many
    /// sessions were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, e| !e.is_expired(now));
        self.control_ids.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    /// Periodically purge expired entries until the returned sender is set
    pub fn start_cleanup_task(self: &Arc<Self>, every: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(every);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = store.purge_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = store.count(),
                                "Session cleanup removed expired sessions"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Apply `f` to a live session and refresh its TTL
    fn mutate<R>(
        &self,
        call_id: &str,
        f: impl FnOnce(&mut CallSession) -> R,
    ) -> Result<R, StoreError> {
        let now = Instant::now();
        let mut entry = match self.sessions.get_mut(call_id) {
            Some(entry) if !entry.is_expired(now) => entry,
            Some(entry) => {
                drop(entry);
                self.evict_if_expired(call_id);
                return Err(StoreError::NotFound(call_id.to_string()));
            }
            None => return Err(StoreError::NotFound(call_id.to_string())),
        };
        let out = f(&mut entry.value);
        entry.expires_at = now + self.ttl;
        Ok(out)
    }

    fn read<R>(&self, call_id: &str, f: impl FnOnce(&CallSession) -> R) -> Option<R> {
        let now = Instant::now();
        let expired = match self.sessions.get(call_id) {
            Some(entry) if !entry.is_expired(now) => return Some(f(&entry.value)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.evict_if_expired(call_id);
        }
        None
    }

    /// Remove the entry only if it is still expired under the shard lock, so
    /// a session created in between survives
    fn evict_if_expired(&self, call_id: &str) -> bool {
        self.sessions
            .remove_if(call_id, |_, e| e.is_expired(Instant::now()))
            .is_some()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: CallSession) -> Result<(), StoreError> {
        let now = Instant::now();
        let call_id = session.call_id.clone();
        match self.sessions.entry(call_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Err(StoreError::AlreadyExists(call_id));
                }
                occupied.insert(Expiring::new(session, self.ttl));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Expiring::new(session, self.ttl));
            }
        }
        tracing::debug!(call_id = %call_id, "Session created");
        Ok(())
    }

    async fn get(&self, call_id: &str) -> Result<Option<CallSession>, StoreError> {
        Ok(self.read(call_id, |s| s.clone()))
    }

    async fn set_status(&self, call_id: &str, status: SessionStatus) -> Result<(), StoreError> {
        self.mutate(call_id, |s| s.set_status(status))
    }

    async fn set_speaking(&self, call_id: &str, speaking: bool) -> Result<(), StoreError> {
        self.mutate(call_id, |s| s.set_speaking(speaking))
    }

    async fn append_turn(&self, call_id: &str, turn: NewTurn) -> Result<u32, StoreError> {
        self.mutate(call_id, |s| s.append_turn(turn))
    }

    async fn set_pending_tool_results(
        &self,
        call_id: &str,
        results: HashMap<String, ToolResult>,
    ) -> Result<(), StoreError> {
        self.mutate(call_id, |s| s.set_pending_tool_results(results))
    }

    async fn context(&self, call_id: &str, n: usize) -> Result<Vec<ConversationTurn>, StoreError> {
        Ok(self
            .read(call_id, |s| s.context_window(n).to_vec())
            .unwrap_or_default())
    }

    async fn delete(&self, call_id: &str) -> Result<Option<CallSession>, StoreError> {
        let now = Instant::now();
        Ok(self
            .sessions
            .remove(call_id)
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(_, e)| e.value))
    }

    async fn map_control_id(&self, control_id: &str, call_id: &str) -> Result<(), StoreError> {
        self.control_ids.insert(
            control_id.to_string(),
            Expiring::new(call_id.to_string(), self.control_id_ttl),
        );
        Ok(())
    }

    async fn resolve_control_id(&self, control_id: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let resolved = self
            .control_ids
            .get(control_id)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone());
        Ok(resolved)
    }
}
