//! Session registry and shutdown coordination
//!
//! Tracks every live session by id. The registry has its own lock, separate
//! from the log lock, so connection bookkeeping never waits on storage I/O.
//!
//! Shutdown:
//! 1. `request_shutdown` sets the stop flag under the registry lock, so no
//!    session registers afterwards
//! 2. The stop signal wakes every session blocked in a transport read
//! 3. `request_shutdown` returns once the live count reaches zero
//!
//! Only then may the caller release the backing store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use super::errors::{ServerError, ServerResult};

/// Unique session identifier
pub type SessionId = Uuid;

/// Bookkeeping for one live session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    pub accepted_at: DateTime<Utc>,
}

struct RegistryState {
    sessions: HashMap<SessionId, SessionInfo>,
    stopping: bool,
}

/// Thread-safe set of live sessions plus the stop signal.
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    live: watch::Sender<usize>,
    stop: watch::Sender<bool>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (live, _) = watch::channel(0);
        let (stop, _) = watch::channel(false);
        Self {
            state: Mutex::new(RegistryState {
                sessions: HashMap::new(),
                stopping: false,
            }),
            live,
            stop,
        }
    }

    // Each critical section is one map operation, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a session and returns the guard that removes it on drop.
    ///
    /// # Errors
    ///
    /// `ShuttingDown` once `request_shutdown` has been called.
    pub fn register(self: &Arc<Self>, peer: Option<SocketAddr>) -> ServerResult<SessionGuard> {
        let mut state = self.lock();
        if state.stopping {
            return Err(ServerError::ShuttingDown);
        }

        let info = SessionInfo {
            id: Uuid::new_v4(),
            peer,
            accepted_at: Utc::now(),
        };
        let id = info.id;
        state.sessions.insert(id, info);
        self.live.send_replace(state.sessions.len());

        Ok(SessionGuard {
            registry: Arc::clone(self),
            id,
            released: false,
        })
    }

    /// Removes a session. Returns false if it was not registered.
    pub fn deregister(&self, id: SessionId) -> bool {
        let mut state = self.lock();
        let removed = state.sessions.remove(&id).is_some();
        if removed {
            self.live.send_replace(state.sessions.len());
        }
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().sessions.contains_key(&id)
    }

    /// Copies of every live session's bookkeeping.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.lock().sessions.values().cloned().collect()
    }

    /// Whether shutdown has been requested.
    pub fn is_stopping(&self) -> bool {
        self.lock().stopping
    }

    /// Receiver that flips to `true` when shutdown is requested.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    /// Stops admitting sessions, signals live ones to close, and waits until
    /// every one of them has deregistered.
    pub async fn request_shutdown(&self) {
        {
            let mut state = self.lock();
            state.stopping = true;
        }
        self.stop.send_replace(true);

        let mut live = self.live.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = live.wait_for(|count| *count == 0).await;
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("live", &self.len())
            .field("stopping", &self.is_stopping())
            .finish()
    }
}

/// Keeps a session registered; deregisters exactly once when dropped.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
    released: bool,
}

impl SessionGuard {
    /// The registered session's id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Deregisters now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.deregister(self.id);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
