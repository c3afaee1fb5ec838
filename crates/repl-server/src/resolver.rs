//! Dependency resolution: linearizes extensions so every op provider sits
//! ahead of the extensions that require or expect it.

use std::collections::{BTreeSet, HashMap};

use repl_protocol::Descriptor;
use tracing::debug;

use crate::error::ChainError;

/// Order `extensions` (given in registration order) so that for every
/// satisfied `requires`/`expects` entry the provider comes first.
///
/// Returns indices into the input. Among extensions with no outstanding
/// constraint the earliest registered is always taken next, so the result is
/// stable. An extension naming one of its own ops adds no constraint.
pub fn resolve<'a, I>(extensions: I) -> Result<Vec<usize>, ChainError>
where
    I: IntoIterator<Item = (&'a str, &'a Descriptor)>,
{
    let nodes: Vec<(&str, &Descriptor)> = extensions.into_iter().collect();

    let mut providers: HashMap<&str, usize> = HashMap::new();
    for (index, (_, descriptor)) in nodes.iter().enumerate() {
        for op in descriptor.ops() {
            providers.entry(op).or_insert(index);
        }
    }

    // prerequisites[i]: extensions that must precede i
    // dependents[i]: extensions waiting on i
    let mut prerequisites: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];

    for (index, (id, descriptor)) in nodes.iter().enumerate() {
        for op in &descriptor.requires {
            let provider = providers.get(op.as_str()).copied().ok_or_else(|| {
                ChainError::MissingDependency {
                    op: op.clone(),
                    required_by: id.to_string(),
                }
            })?;
            if provider != index {
                prerequisites[index].insert(provider);
                dependents[provider].insert(index);
            }
        }
        for op in &descriptor.expects {
            match providers.get(op.as_str()) {
                Some(&provider) if provider != index => {
                    prerequisites[index].insert(provider);
                    dependents[provider].insert(index);
                }
                Some(_) => {}
                None => debug!("{id} expects op {op:?}, which no extension handles"),
            }
        }
    }

    // Kahn's algorithm with the ready set ordered by registration index.
    let mut remaining: Vec<usize> = prerequisites.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < nodes.len() {
        let cycle = find_cycle(&prerequisites, &remaining);
        return Err(ChainError::CyclicDependency {
            extensions: cycle.into_iter().map(|i| nodes[i].0.to_string()).collect(),
        });
    }

    Ok(order)
}

/// Extract one concrete cycle from the nodes Kahn's algorithm could not
/// place. Every such node has an unplaced prerequisite, so walking
/// prerequisites must revisit a node. Returned provider-first, starting at
/// the earliest registered member.
fn find_cycle(prerequisites: &[BTreeSet<usize>], remaining: &[usize]) -> Vec<usize> {
    let Some(start) = (0..remaining.len()).find(|&i| remaining[i] > 0) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(&previous) = prerequisites[current].iter().find(|&&p| remaining[p] > 0) else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&n| n == previous) {
            let mut cycle = path.split_off(pos);
            cycle.reverse();
            if let Some(min_pos) = cycle.iter().enumerate().min_by_key(|(_, n)| **n).map(|(p, _)| p) {
                cycle.rotate_left(min_pos);
            }
            return cycle;
        }
        path.push(previous);
        current = previous;
    }
}
