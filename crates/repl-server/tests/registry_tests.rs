//! Registry and resolver tests: op ownership, stable ordering, missing
//! dependencies and cycles.

use proptest::prelude::*;
use repl_protocol::{Descriptor, OpDoc, Status};
use repl_server::resolver::resolve;
use repl_server::{ChainError, Extension, ExtensionRegistry, Next, OpError, Request};

/// Answers `{done}` for every op it declares.
struct Answering {
    descriptor: Descriptor,
}

impl Answering {
    fn handles(ops: &[&str]) -> Self {
        let descriptor = ops.iter().fold(Descriptor::new(), |d, op| {
            d.handles(*op, OpDoc::new(format!("Handles {op}.")))
        });
        Self { descriptor }
    }

    fn requires(mut self, op: &str) -> Self {
        self.descriptor = self.descriptor.requires(op);
        self
    }

    fn expects(mut self, op: &str) -> Self {
        self.descriptor = self.descriptor.expects(op);
        self
    }
}

impl Extension for Answering {
    fn descriptor(&self) -> Descriptor {
        self.descriptor.clone()
    }

    async fn handle(&self, req: &mut Request, _next: Next<'_>) -> Result<(), OpError> {
        req.respond([Status::DONE]);
        Ok(())
    }
}

fn descriptor(handles: &[&str], requires: &[&str]) -> Descriptor {
    let d = handles
        .iter()
        .fold(Descriptor::new(), |d, op| d.handles(*op, OpDoc::new("")));
    requires.iter().fold(d, |d, op| d.requires(*op))
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn duplicate_op_is_rejected() {
    let mut registry = ExtensionRegistry::new();
    registry.register("first", Answering::handles(&["ping"])).unwrap();

    let err = registry.register("second", Answering::handles(&["ping"])).unwrap_err();
    assert_eq!(
        err,
        ChainError::DuplicateOperation {
            op: "ping".into(),
            existing: "first".into(),
            extension: "second".into(),
        }
    );
}

#[test]
fn failed_registration_leaves_registry_unchanged() {
    let mut registry = ExtensionRegistry::new();
    registry.register("first", Answering::handles(&["ping"])).unwrap();

    assert!(registry.register("second", Answering::handles(&["pong", "ping"])).is_err());
    assert_eq!(registry.len(), 1);
    assert!(!registry.contains("second"));
    assert_eq!(registry.provider("pong"), None);
    assert_eq!(registry.provider("ping"), Some("first"));
}

#[test]
fn duplicate_extension_id_is_rejected() {
    let mut registry = ExtensionRegistry::new();
    registry.register("pinger", Answering::handles(&["ping"])).unwrap();

    let err = registry.register("pinger", Answering::handles(&["pong"])).unwrap_err();
    assert_eq!(err, ChainError::DuplicateExtension("pinger".into()));
}

#[test]
fn lookup_and_all_follow_registration_order() {
    let mut registry = ExtensionRegistry::new();
    registry.register("b", Answering::handles(&["b-op"])).unwrap();
    registry.register("a", Answering::handles(&["a-op"]).requires("b-op")).unwrap();

    let ids: Vec<&str> = registry.all().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["b", "a"]);

    let a = registry.lookup("a").unwrap();
    assert!(a.handles_op("a-op"));
    assert!(a.requires.contains("b-op"));
    assert!(registry.lookup("missing").is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn provider_precedes_dependent() {
    let mut registry = ExtensionRegistry::new();
    registry.register("completion", Answering::handles(&["completions"]).requires("clone")).unwrap();
    registry.register("session", Answering::handles(&["clone", "close"])).unwrap();

    assert_eq!(registry.resolve().unwrap(), vec!["session", "completion"]);
}

#[test]
fn ties_break_by_registration_order() {
    let mut registry = ExtensionRegistry::new();
    registry.register("c", Answering::handles(&["c-op"])).unwrap();
    registry.register("a", Answering::handles(&["a-op"]).requires("b-op")).unwrap();
    registry.register("b", Answering::handles(&["b-op"])).unwrap();
    registry.register("d", Answering::handles(&["d-op"])).unwrap();

    assert_eq!(registry.resolve().unwrap(), vec!["c", "b", "a", "d"]);
}

#[test]
fn unconstrained_extensions_keep_registration_order() {
    let mut registry = ExtensionRegistry::new();
    for id in ["x", "y", "z"] {
        registry.register(id, Answering::handles(&[format!("{id}-op").as_str()])).unwrap();
    }
    assert_eq!(registry.resolve().unwrap(), vec!["x", "y", "z"]);
}

#[test]
fn missing_requirement_names_the_op() {
    let mut registry = ExtensionRegistry::new();
    registry.register("printer", Answering::handles(&["print"]).requires("eval")).unwrap();

    assert_eq!(
        registry.resolve().unwrap_err(),
        ChainError::MissingDependency {
            op: "eval".into(),
            required_by: "printer".into(),
        }
    );
}

#[test]
fn missing_expectation_is_ignored() {
    let mut registry = ExtensionRegistry::new();
    registry.register("printer", Answering::handles(&["print"]).expects("eval")).unwrap();
    assert_eq!(registry.resolve().unwrap(), vec!["printer"]);
}

#[test]
fn satisfied_expectation_orders_like_requires() {
    let mut registry = ExtensionRegistry::new();
    registry.register("printer", Answering::handles(&["print"]).expects("eval")).unwrap();
    registry.register("evaluator", Answering::handles(&["eval"])).unwrap();
    assert_eq!(registry.resolve().unwrap(), vec!["evaluator", "printer"]);
}

#[test]
fn requiring_own_op_adds_no_constraint() {
    let mut registry = ExtensionRegistry::new();
    registry.register("self", Answering::handles(&["ping"]).requires("ping")).unwrap();
    assert_eq!(registry.resolve().unwrap(), vec!["self"]);
}

#[test]
fn two_extension_cycle_is_reported() {
    let mut registry = ExtensionRegistry::new();
    registry.register("a", Answering::handles(&["a-op"]).requires("b-op")).unwrap();
    registry.register("b", Answering::handles(&["b-op"]).requires("a-op")).unwrap();

    match registry.resolve().unwrap_err() {
        ChainError::CyclicDependency { extensions } => {
            assert_eq!(extensions, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn cycle_report_excludes_bystanders() {
    let mut registry = ExtensionRegistry::new();
    registry.register("free", Answering::handles(&["free-op"])).unwrap();
    registry.register("waiting", Answering::handles(&["w-op"]).requires("x-op")).unwrap();
    registry.register("x", Answering::handles(&["x-op"]).requires("z-op")).unwrap();
    registry.register("y", Answering::handles(&["y-op"]).requires("x-op")).unwrap();
    registry.register("z", Answering::handles(&["z-op"]).requires("y-op")).unwrap();

    let ChainError::CyclicDependency { extensions } = registry.resolve().unwrap_err() else {
        panic!("expected a cycle");
    };
    let mut members = extensions.clone();
    members.sort();
    assert_eq!(members, vec!["x", "y", "z"]);
}

#[test]
fn resolve_accepts_bare_descriptors() {
    let session = descriptor(&["clone"], &[]);
    let completion = descriptor(&["completions"], &["clone"]);
    let order = resolve([("completion", &completion), ("session", &session)]).unwrap();
    assert_eq!(order, vec![1, 0]);
}

/// A random acyclic graph: a hidden rank permutation fixes the edge
/// direction, registration order is the index order.
fn acyclic_graph() -> impl Strategy<Value = Vec<Descriptor>> {
    (1usize..=8)
        .prop_flat_map(|n| {
            (
                Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
                prop::collection::vec(0u8..6, n * n),
                prop::collection::vec(any::<bool>(), n),
            )
        })
        .prop_map(|(ranks, edges, dangling)| {
            let n = ranks.len();
            (0..n)
                .map(|i| {
                    let mut d = Descriptor::new().handles(format!("op-{i}"), OpDoc::new(""));
                    for j in (0..n).filter(|&j| ranks[j] < ranks[i]) {
                        d = match edges[i * n + j] {
                            0 => d.requires(format!("op-{j}")),
                            1 => d.expects(format!("op-{j}")),
                            _ => d,
                        };
                    }
                    if dangling[i] {
                        d = d.expects("op-nobody");
                    }
                    d
                })
                .collect()
        })
}

proptest! {
    #[test]
    fn property_acyclic_graphs_respect_every_edge(descriptors in acyclic_graph()) {
        let n = descriptors.len();
        let ids: Vec<String> = (0..n).map(|i| format!("ext-{i}")).collect();
        let order = resolve(ids.iter().map(String::as_str).zip(descriptors.iter())).unwrap();

        prop_assert_eq!(order.len(), n);
        let mut position = vec![0; n];
        for (pos, &index) in order.iter().enumerate() {
            position[index] = pos;
        }
        for (i, d) in descriptors.iter().enumerate() {
            for op in d.requires.iter().chain(d.expects.iter()) {
                if let Some(j) = op.strip_prefix("op-").and_then(|s| s.parse::<usize>().ok()) {
                    prop_assert!(position[j] < position[i], "{} must precede ext-{}", op, i);
                }
            }
        }
    }

    #[test]
    fn property_resolution_is_deterministic(descriptors in acyclic_graph()) {
        let ids: Vec<String> = (0..descriptors.len()).map(|i| format!("ext-{i}")).collect();
        let first = resolve(ids.iter().map(String::as_str).zip(descriptors.iter())).unwrap();
        let second = resolve(ids.iter().map(String::as_str).zip(descriptors.iter())).unwrap();
        prop_assert_eq!(first, second);
    }
}
