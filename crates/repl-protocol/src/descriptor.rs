//! Extension descriptors: the machine-readable declaration of which ops an
//! extension handles and which ops must be composed ahead of it.
//!
//! The same structure drives chain construction and the `describe` op's
//! documentation output.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Documentation for a single op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpDoc {
    pub doc: String,
    /// Required parameters → description.
    #[serde(default)]
    pub requires: BTreeMap<String, String>,
    /// Optional parameters → description.
    #[serde(default)]
    pub optional: BTreeMap<String, String>,
    /// Returned fields → description.
    #[serde(default)]
    pub returns: BTreeMap<String, String>,
}

impl OpDoc {
    pub fn new(doc: impl Into<String>) -> Self {
        Self {
            doc: doc.into(),
            ..Self::default()
        }
    }

    pub fn requires(mut self, param: impl Into<String>, doc: impl Into<String>) -> Self {
        self.requires.insert(param.into(), doc.into());
        self
    }

    pub fn optional(mut self, param: impl Into<String>, doc: impl Into<String>) -> Self {
        self.optional.insert(param.into(), doc.into());
        self
    }

    pub fn returns(mut self, field: impl Into<String>, doc: impl Into<String>) -> Self {
        self.returns.insert(field.into(), doc.into());
        self
    }
}

/// Per-extension metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Ops whose provider must sit ahead of this extension. Unsatisfied
    /// entries abort chain construction.
    #[serde(default)]
    pub requires: BTreeSet<String>,
    /// Like `requires`, but silently ignored when no provider exists.
    #[serde(default)]
    pub expects: BTreeSet<String>,
    /// Ops this extension answers.
    #[serde(default)]
    pub handles: BTreeMap<String, OpDoc>,
}

impl Descriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requires(mut self, op: impl Into<String>) -> Self {
        self.requires.insert(op.into());
        self
    }

    pub fn expects(mut self, op: impl Into<String>) -> Self {
        self.expects.insert(op.into());
        self
    }

    pub fn handles(mut self, op: impl Into<String>, doc: OpDoc) -> Self {
        self.handles.insert(op.into(), doc);
        self
    }

    pub fn handles_op(&self, op: &str) -> bool {
        self.handles.contains_key(op)
    }

    pub fn ops(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }
}
