//! Reachability and removal checks over a [`LockGraph`].

use crate::error::ValidationError;
use crate::graph::{LockGraph, NodeId};
use crate::pool::Pool;
use crate::semver::Constraint;
use std::collections::HashMap;
use tracing::debug;

// =============================================================================
// Reachability
// =============================================================================

/// Fail on the first locked package nothing needs.
///
/// Packages without any dependent are reported first, in lock order. Packages
/// that only have dependents outside the root's reach (orphan cycles) are
/// reported after that.
pub fn check_unused(graph: &LockGraph) -> Result<(), ValidationError> {
    for (id, record) in graph.locked() {
        if graph.dependents(id).is_empty() {
            debug!(package = %record, "no dependents");
            return Err(unused(graph, id));
        }
    }

    let reachable = graph.reachable();
    if let Some((id, record)) = graph.locked().find(|(id, _)| !reachable[*id]) {
        debug!(package = %record, "not reachable from the root");
        return Err(unused(graph, id));
    }
    Ok(())
}

fn unused(graph: &LockGraph, id: NodeId) -> ValidationError {
    let record = graph.node(id);
    ValidationError::UnusedPackage {
        name: record.pretty_name.clone(),
        version: record.version.normalized(),
    }
}

// =============================================================================
// Removal
// =============================================================================

/// The widened requirement on one target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRequirement {
    /// Lowercase target name.
    pub target: String,
    pub pretty_target: String,
    /// Compacted union of every requirer's constraint.
    pub constraint: Constraint,
    pub requirers: Vec<NodeId>,
}

/// Group every edge by target in first-seen order and widen each group by
/// union.
pub fn effective_requirements(graph: &LockGraph) -> Vec<EffectiveRequirement> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, edge) in graph.edges().iter().enumerate() {
        groups
            .entry(edge.target.as_str())
            .or_insert_with(|| {
                order.push(edge.target.as_str());
                Vec::new()
            })
            .push(index);
    }

    order
        .into_iter()
        .map(|target| {
            let edges: Vec<_> = groups[target].iter().map(|&i| &graph.edges()[i]).collect();
            let mut requirers: Vec<NodeId> = Vec::with_capacity(edges.len());
            for edge in &edges {
                if !requirers.contains(&edge.source) {
                    requirers.push(edge.source);
                }
            }
            EffectiveRequirement {
                target: target.to_string(),
                pretty_target: edges[0].pretty_target.clone(),
                constraint: Constraint::union(edges.iter().map(|e| e.constraint.clone())).compact(),
                requirers,
            }
        })
        .collect()
}

/// Fail on the first effective requirement the pool cannot satisfy.
pub fn check_removed(graph: &LockGraph, pool: &Pool<'_>) -> Result<(), ValidationError> {
    for requirement in effective_requirements(graph) {
        let candidates = pool.what_provides(&requirement.target, &requirement.constraint)?;
        if candidates.is_empty() {
            debug!(
                target = %requirement.pretty_target,
                constraint = %requirement.constraint,
                requirers = requirement.requirers.len(),
                "requirement has no candidate"
            );
            return Err(ValidationError::RemovedPackage {
                name: requirement.pretty_target,
                constraint: requirement.constraint.to_string(),
            });
        }
    }
    Ok(())
}
