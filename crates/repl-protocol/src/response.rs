//! Outbound responses and their status sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The non-exclusive set of outcome tokens attached to a response.
///
/// Several conditions may hold at once (`done` together with an error token
/// is common), so the cardinality of the set is part of what clients see.
/// Serialized as a sorted JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(BTreeSet<String>);

impl Status {
    // ── Engine tokens ───────────────────────────────────────────────────
    pub const DONE: &str = "done";
    pub const ERROR: &str = "error";
    pub const UNKNOWN_OP: &str = "unknown-op";
    pub const UNKNOWN_SESSION: &str = "unknown-session";
    pub const HANDLER_ERROR: &str = "handler-error";
    pub const MISSING_PARAM: &str = "missing-param";
    pub const MALFORMED_MESSAGE: &str = "malformed-message";
    pub const SHUTTING_DOWN: &str = "shutting-down";

    // ── Interruption ────────────────────────────────────────────────────
    pub const INTERRUPTED: &str = "interrupted";
    pub const SESSION_IDLE: &str = "session-idle";
    pub const INTERRUPT_ID_MISMATCH: &str = "interrupt-id-mismatch";

    // ── Completion / namespaces ─────────────────────────────────────────
    pub const COMPLETION_ERROR: &str = "completion-error";
    pub const NAMESPACE_NOT_FOUND: &str = "namespace-not-found";
    pub const UNKNOWN_COMPLETE_FN: &str = "unknown-complete-fn";

    pub fn new() -> Self {
        Self::default()
    }

    /// Build a status set from a list of tokens.
    pub fn of<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    pub fn insert(&mut self, token: impl Into<String>) -> bool {
        self.0.insert(token.into())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    /// Add every token of `other` to this set.
    pub fn extend(&mut self, other: &Status) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_done(&self) -> bool {
        self.contains(Self::DONE)
    }

    pub fn is_error(&self) -> bool {
        self.contains(Self::ERROR)
    }
}

impl<S: Into<String>> FromIterator<S> for Status {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::of(iter)
    }
}

/// A response to one message. A message may produce any number of these,
/// all carrying the message's `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Status::is_empty")]
    pub status: Status,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Response {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session: None,
            status: Status::new(),
            fields: Map::new(),
        }
    }

    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }

    pub fn with_status<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            self.status.insert(token);
        }
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn has_status(&self, token: &str) -> bool {
        self.status.contains(token)
    }
}
