//! `completions`: symbol completion against the namespace index.
//!
//! The matching strategy is injected at construction. A request may name a
//! different one with `complete-fn`, but only from the extension's explicit
//! allow-list; clients can never select arbitrary code.

use std::collections::BTreeMap;
use std::sync::Arc;

use repl_protocol::{Descriptor, OpDoc, Ops, Status};
use repl_server::{Extension, Next, OpError, Request};
use serde_json::{Value, json};

use crate::namespace::{CURRENT_NS_KEY, NamespaceIndex};

/// Decides whether `candidate` completes `prefix`.
pub type MatchFn = fn(prefix: &str, candidate: &str) -> bool;

fn prefix_match(prefix: &str, candidate: &str) -> bool {
    candidate.starts_with(prefix)
}

fn substring_match(prefix: &str, candidate: &str) -> bool {
    candidate.contains(prefix)
}

/// Allow-list of named matching strategies plus the default.
#[derive(Debug, Clone)]
pub struct CompletionStrategies {
    default: MatchFn,
    allowed: BTreeMap<String, MatchFn>,
}

impl CompletionStrategies {
    /// `prefix` (default) and `substring`.
    pub fn builtin() -> Self {
        Self::new(prefix_match)
            .allow("prefix", prefix_match)
            .allow("substring", substring_match)
    }

    /// Only `default`, no per-request overrides.
    pub fn new(default: MatchFn) -> Self {
        Self {
            default,
            allowed: BTreeMap::new(),
        }
    }

    pub fn allow(mut self, name: impl Into<String>, strategy: MatchFn) -> Self {
        self.allowed.insert(name.into(), strategy);
        self
    }

    pub fn default_strategy(&self) -> MatchFn {
        self.default
    }

    pub fn get(&self, name: &str) -> Option<MatchFn> {
        self.allowed.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.allowed.keys().map(String::as_str)
    }
}

impl Default for CompletionStrategies {
    fn default() -> Self {
        Self::builtin()
    }
}

pub struct CompletionExtension {
    index: Arc<NamespaceIndex>,
    strategies: CompletionStrategies,
}

impl CompletionExtension {
    pub fn new(index: Arc<NamespaceIndex>, strategies: CompletionStrategies) -> Self {
        Self { index, strategies }
    }
}

impl Extension for CompletionExtension {
    fn descriptor(&self) -> Descriptor {
        let strategies = self.strategies.names().collect::<Vec<_>>().join(", ");
        Descriptor::new().requires(Ops::CLONE).handles(
            Ops::COMPLETIONS,
            OpDoc::new("Complete a symbol prefix against a namespace.")
                .requires("prefix", "Text to complete.")
                .optional("ns", "Namespace to complete in. Defaults to the session's current namespace.")
                .optional("complete-fn", format!("Matching strategy, one of: {strategies}."))
                .returns("completions", "Ordered list of {candidate, ns, type} maps."),
        )
    }

    async fn handle(&self, req: &mut Request, _next: Next<'_>) -> Result<(), OpError> {
        let ns = req
            .message()
            .get_str("ns")
            .map(str::to_owned)
            .or_else(|| req.session().get_str(CURRENT_NS_KEY));

        let Some((ns, symbols)) = ns.and_then(|ns| self.index.get(&ns).map(|s| (ns, s))) else {
            req.respond([Status::DONE, Status::COMPLETION_ERROR, Status::NAMESPACE_NOT_FOUND]);
            return Ok(());
        };

        let matches = match req.message().get_str("complete-fn") {
            None => self.strategies.default_strategy(),
            Some(name) => match self.strategies.get(name) {
                Some(strategy) => strategy,
                None => {
                    req.send(
                        req.response()
                            .with_status([Status::DONE, Status::COMPLETION_ERROR, Status::UNKNOWN_COMPLETE_FN])
                            .with_field("complete-fn", name),
                    );
                    return Ok(());
                }
            },
        };

        let prefix = req.require_str("prefix")?;
        let completions: Vec<Value> = symbols
            .iter()
            .filter(|symbol| matches(prefix, &symbol.name))
            .map(|symbol| json!({ "candidate": symbol.name, "ns": ns, "type": symbol.kind }))
            .collect();

        req.send(
            req.response()
                .with_status([Status::DONE])
                .with_field("completions", completions),
        );
        Ok(())
    }
}
