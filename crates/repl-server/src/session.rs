//! Session store: per-session mutable state and execution ordering.
//!
//! Sessions are created by `clone` and removed by `close` or shutdown.
//! Each session owns a symbolic key → value state map. Messages addressed
//! to the same session take turns: a turn is reserved synchronously when the
//! message is admitted, and a message only runs once the previous holder has
//! released the session. Distinct sessions never wait on each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::SessionError;

/// State held by one session.
pub type SessionState = BTreeMap<String, Value>;

/// A mutable state container addressed by an opaque id.
///
/// Extensions read and write entries through the accessors below; the lock
/// is never held across an await point.
#[derive(Debug)]
pub struct Session {
    id: String,
    ephemeral: bool,
    state: Mutex<SessionState>,
    /// Released when the most recently admitted message finishes.
    baton: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Session {
    fn new(id: String, state: SessionState, ephemeral: bool) -> Self {
        Self {
            id,
            ephemeral,
            state: Mutex::new(state),
            baton: Mutex::new(None),
        }
    }

    /// A throwaway session for messages that name no session. It is never
    /// stored and disappears with the message.
    pub fn ephemeral() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), SessionState::new(), true)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.state.lock().get(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.state.lock().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state.lock().remove(key)
    }

    /// Copy of the whole state map.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Run `f` with exclusive access to the state map.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Reserve the next turn on this session. Must be called in arrival
    /// order; the returned [`Turn`] resolves once every earlier turn is done.
    pub fn take_turn(&self) -> Turn {
        let (release, next) = oneshot::channel();
        let previous = self.baton.lock().replace(next);
        Turn { previous, release }
    }
}

/// A reserved place in a session's execution order.
#[derive(Debug)]
pub struct Turn {
    previous: Option<oneshot::Receiver<()>>,
    release: oneshot::Sender<()>,
}

impl Turn {
    /// Wait for every earlier turn to finish.
    pub async fn acquire(self) -> ExecutionRight {
        if let Some(previous) = self.previous {
            // An Err only means the previous holder dropped its right, which
            // is exactly the signal we wait for.
            let _ = previous.await;
        }
        ExecutionRight {
            _release: self.release,
        }
    }
}

/// Exclusive right to run a handler for one session. Dropping it lets the
/// next admitted message proceed.
#[derive(Debug)]
pub struct ExecutionRight {
    _release: oneshot::Sender<()>,
}

/// Owns every live session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<BTreeMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session, copying `parent`'s state when given.
    pub fn create(&self, parent: Option<&str>) -> Result<String, SessionError> {
        let state = match parent {
            Some(parent_id) => self.get(parent_id)?.snapshot(),
            None => SessionState::new(),
        };

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), state, false));
        self.sessions.write().insert(id.clone(), session);

        match parent {
            Some(parent_id) => info!("Session created: {id} (cloned from {parent_id})"),
            None => info!("Session created: {id}"),
        }
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))
    }

    /// Remove a session. Messages already holding it finish normally; any
    /// message naming it afterwards is rejected.
    pub fn close(&self, id: &str) -> Result<(), SessionError> {
        if self.sessions.write().remove(id).is_none() {
            return Err(SessionError::UnknownSession(id.to_string()));
        }
        info!("Session closed: {id}");
        Ok(())
    }

    /// Ids of every live session, sorted.
    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drop every session (server shutdown). Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.sessions.write());
        debug!("Closed {} session(s)", drained.len());
        drained.len()
    }
}
