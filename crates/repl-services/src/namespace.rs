//! Namespace index and the `in-ns` op.

use std::collections::BTreeMap;
use std::sync::Arc;

use repl_protocol::{Descriptor, OpDoc, Ops, Status};
use repl_server::{Extension, Next, OpError, Request};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Session state key holding the session's current namespace.
pub const CURRENT_NS_KEY: &str = "ns";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    Function,
    Macro,
    Var,
    SpecialForm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Symbols known per namespace. Symbols are kept sorted by name.
#[derive(Debug, Clone, Default)]
pub struct NamespaceIndex {
    namespaces: BTreeMap<String, Vec<Symbol>>,
}

impl NamespaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in index: a `core` namespace of common sequence and
    /// control functions.
    pub fn core() -> Self {
        use SymbolKind::*;

        let symbols = [
            ("apply", Function),
            ("assoc", Function),
            ("concat", Function),
            ("cond", Macro),
            ("conj", Function),
            ("def", SpecialForm),
            ("defn", Macro),
            ("dissoc", Function),
            ("filter", Function),
            ("filterv", Function),
            ("first", Function),
            ("fn", SpecialForm),
            ("get", Function),
            ("if", SpecialForm),
            ("into", Function),
            ("keep", Function),
            ("let", SpecialForm),
            ("map", Function),
            ("map-indexed", Function),
            ("mapcat", Function),
            ("mapv", Function),
            ("max", Function),
            ("merge", Function),
            ("min", Function),
            ("reduce", Function),
            ("remove", Function),
            ("rest", Function),
            ("when", Macro),
            ("*ns*", Var),
        ];

        Self::new().with_namespace(
            "core",
            symbols.into_iter().map(|(name, kind)| Symbol::new(name, kind)),
        )
    }

    pub fn with_namespace(
        mut self,
        name: impl Into<String>,
        symbols: impl IntoIterator<Item = Symbol>,
    ) -> Self {
        self.insert(name, symbols);
        self
    }

    /// Add or replace a namespace.
    pub fn insert(&mut self, name: impl Into<String>, symbols: impl IntoIterator<Item = Symbol>) {
        let mut symbols: Vec<Symbol> = symbols.into_iter().collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));
        symbols.dedup_by(|a, b| a.name == b.name);
        self.namespaces.insert(name.into(), symbols);
    }

    pub fn get(&self, name: &str) -> Option<&[Symbol]> {
        self.namespaces.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }
}

/// `in-ns`: set the session's current namespace.
pub struct InNsExtension {
    index: Arc<NamespaceIndex>,
}

impl InNsExtension {
    pub fn new(index: Arc<NamespaceIndex>) -> Self {
        Self { index }
    }
}

impl Extension for InNsExtension {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new().requires(Ops::CLONE).handles(
            Ops::IN_NS,
            OpDoc::new("Switch the session's current namespace.")
                .requires("ns", "Namespace to switch to.")
                .returns("ns", "The session's current namespace."),
        )
    }

    async fn handle(&self, req: &mut Request, _next: Next<'_>) -> Result<(), OpError> {
        let ns = req.require_str("ns")?.to_owned();
        if !self.index.contains(&ns) {
            req.send(
                req.response()
                    .with_status([Status::DONE, Status::ERROR, Status::NAMESPACE_NOT_FOUND])
                    .with_field("ns", ns),
            );
            return Ok(());
        }

        debug!("Session {} switched to namespace {ns}", req.session().id());
        req.session().set(CURRENT_NS_KEY, ns.clone());
        req.send(req.response().with_status([Status::DONE]).with_field("ns", ns));
        Ok(())
    }
}
