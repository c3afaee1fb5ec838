//! ExtensionRegistry: descriptors and extension instances, in registration
//! order.
//!
//! Registration order is the resolver's tie-break, so it is preserved
//! exactly. Every op is claimed by at most one extension; a second claim is
//! rejected when it is registered, not resolved by precedence.

use std::collections::HashMap;
use std::sync::Arc;

use repl_protocol::Descriptor;
use tracing::info;

use crate::error::ChainError;
use crate::extension::{Extension, ExtensionDyn};
use crate::resolver;

/// One registered extension.
pub(crate) struct Registered {
    pub(crate) id: String,
    pub(crate) descriptor: Descriptor,
    pub(crate) observes_all: bool,
    pub(crate) extension: Arc<dyn ExtensionDyn>,
}

#[derive(Default)]
pub struct ExtensionRegistry {
    entries: Vec<Registered>,
    /// op → id of the extension handling it
    providers: HashMap<String, String>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension under `id`.
    ///
    /// Fails without modifying the registry if the id is taken or any of the
    /// extension's ops is already handled by another extension.
    pub fn register<E: Extension>(
        &mut self,
        id: impl Into<String>,
        extension: E,
    ) -> Result<(), ChainError> {
        let entry = self.check(id.into(), extension)?;
        self.insert(self.entries.len(), entry);
        Ok(())
    }

    /// Register ahead of every existing entry (used for the baseline
    /// session extension).
    pub(crate) fn register_first<E: Extension>(
        &mut self,
        id: impl Into<String>,
        extension: E,
    ) -> Result<(), ChainError> {
        let entry = self.check(id.into(), extension)?;
        self.insert(0, entry);
        Ok(())
    }

    /// Descriptor registered under `id`.
    pub fn lookup(&self, id: &str) -> Option<&Descriptor> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| &e.descriptor)
    }

    /// Every `(id, descriptor)` in registration order.
    pub fn all(&self) -> impl Iterator<Item = (&str, &Descriptor)> {
        self.entries.iter().map(|e| (e.id.as_str(), &e.descriptor))
    }

    /// Id of the extension handling `op`.
    pub fn provider(&self, op: &str) -> Option<&str> {
        self.providers.get(op).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in processing order, without building a chain.
    pub fn resolve(&self) -> Result<Vec<&str>, ChainError> {
        let order = resolver::resolve(self.all())?;
        Ok(order.into_iter().map(|i| self.entries[i].id.as_str()).collect())
    }

    pub(crate) fn into_entries(self) -> Vec<Registered> {
        self.entries
    }

    // ── Internal ──────────────────────────────────────────────────────────

    fn check<E: Extension>(&self, id: String, extension: E) -> Result<Registered, ChainError> {
        if self.contains(&id) {
            return Err(ChainError::DuplicateExtension(id));
        }

        let descriptor = extension.descriptor();
        for op in descriptor.ops() {
            if let Some(existing) = self.providers.get(op) {
                return Err(ChainError::DuplicateOperation {
                    op: op.to_string(),
                    existing: existing.clone(),
                    extension: id,
                });
            }
        }

        Ok(Registered {
            id,
            descriptor,
            observes_all: extension.observes_all(),
            extension: Arc::new(extension),
        })
    }

    fn insert(&mut self, index: usize, entry: Registered) {
        for op in entry.descriptor.ops() {
            self.providers.insert(op.to_string(), entry.id.clone());
        }
        info!(
            "Registered extension: {} (handles: {})",
            entry.id,
            entry.descriptor.ops().collect::<Vec<_>>().join(", ")
        );
        self.entries.insert(index, entry);
    }
}
