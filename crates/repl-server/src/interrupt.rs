//! In-flight message tracking for cooperative interruption.
//!
//! Every admitted message is registered under `(session, id)` with its own
//! cancellation token. `interrupt` cancels tokens; long-running handlers
//! observe them at safe points. Interruption is best-effort.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Key = (Option<String>, String);

#[derive(Debug)]
struct Entry {
    seq: u64,
    token: CancellationToken,
}

/// Registry of messages that have been admitted but not finished.
#[derive(Debug, Default)]
pub struct InFlight {
    entries: DashMap<Key, Entry>,
    next_seq: AtomicU64,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a message until the returned guard is dropped.
    ///
    /// A client reusing an id that is still in flight replaces the earlier
    /// registration; only the newer message can then be interrupted by id.
    pub fn register(self: &Arc<Self>, session: Option<&str>, id: &str) -> InFlightGuard {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let key = (session.map(str::to_owned), id.to_owned());

        let replaced = self.entries.insert(
            key.clone(),
            Entry {
                seq,
                token: token.clone(),
            },
        );
        if replaced.is_some() {
            debug!("Message id {id} re-registered while still in flight");
        }

        InFlightGuard {
            registry: Arc::clone(self),
            key,
            seq,
            token,
        }
    }

    /// Cancel the message `id` of `session`. Returns false if it is not in
    /// flight.
    pub fn interrupt(&self, session: Option<&str>, id: &str) -> bool {
        let key = (session.map(str::to_owned), id.to_owned());
        match self.entries.get(&key) {
            Some(entry) => {
                entry.token.cancel();
                debug!("Interrupted message {id}");
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight message of `session` other than `except`.
    /// Returns how many were cancelled.
    pub fn interrupt_session(&self, session: Option<&str>, except: Option<&str>) -> usize {
        let mut cancelled = 0;
        for entry in self.entries.iter() {
            let (owner, id) = entry.key();
            if owner.as_deref() == session && except != Some(id.as_str()) {
                entry.token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Cancel everything (server shutdown).
    pub fn cancel_all(&self) -> usize {
        for entry in self.entries.iter() {
            entry.token.cancel();
        }
        self.entries.len()
    }

    /// Ids currently in flight for `session`, sorted.
    pub fn ids(&self, session: Option<&str>) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0.as_deref() == session)
            .map(|entry| entry.key().1.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn release(&self, key: &Key, seq: u64) {
        self.entries.remove_if(key, |_, entry| entry.seq == seq);
    }
}

/// Keeps a message registered as in flight; deregisters on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlight>,
    key: Key,
    seq: u64,
    token: CancellationToken,
}

impl InFlightGuard {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.seq);
    }
}
