//! Partial validation scope: which locked packages are checked against the
//! live repositories and which against the previously trusted lock.

use crate::error::ValidationError;
use crate::graph::{LockGraph, NodeId, ROOT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Name used for the touched list in input errors.
pub const TOUCHED_DOCUMENT: &str = "touched packages";

/// Which packages besides the touched ones are validated against the live
/// repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PartialValidationMode {
    /// Only the touched packages.
    #[default]
    #[serde(rename = "only-listed")]
    OnlyListed,
    /// The touched packages and everything they require, transitively.
    #[serde(rename = "with-dependencies")]
    ListedWithTransitiveDeps,
    /// Like [`ListedWithTransitiveDeps`](Self::ListedWithTransitiveDeps), but
    /// the walk never enters a package the root requires directly unless it
    /// was touched itself.
    #[serde(rename = "with-dependencies-no-root-require")]
    ListedWithTransitiveDepsNoRootRequire,
}

impl PartialValidationMode {
    pub const ALL: [PartialValidationMode; 3] = [
        PartialValidationMode::OnlyListed,
        PartialValidationMode::ListedWithTransitiveDeps,
        PartialValidationMode::ListedWithTransitiveDepsNoRootRequire,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartialValidationMode::OnlyListed => "only-listed",
            PartialValidationMode::ListedWithTransitiveDeps => "with-dependencies",
            PartialValidationMode::ListedWithTransitiveDepsNoRootRequire => {
                "with-dependencies-no-root-require"
            }
        }
    }
}

impl fmt::Display for PartialValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartialValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown mode \"{}\", expected one of: {}", s, names.join(", "))
            })
    }
}

/// Partition of the lock's package names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationScope {
    /// Lowercase names validated against the live repositories.
    pub live: BTreeSet<String>,
    /// Lowercase names validated against the trusted lock.
    pub trusted: BTreeSet<String>,
}

impl ValidationScope {
    pub fn is_live(&self, name: &str) -> bool {
        self.live.contains(name)
    }

    pub fn is_trusted(&self, name: &str) -> bool {
        self.trusted.contains(name)
    }
}

/// Compute the scope of a partial validation over the new lock's graph.
///
/// Touched names that are not locked are ignored.
pub fn resolve_scope<S: AsRef<str>>(
    graph: &LockGraph,
    touched: &[S],
    mode: PartialValidationMode,
) -> Result<ValidationScope, ValidationError> {
    if touched.is_empty() {
        return Err(ValidationError::malformed(
            TOUCHED_DOCUMENT,
            "at least one package must be listed",
        ));
    }

    let mut starts: Vec<NodeId> = Vec::with_capacity(touched.len());
    for name in touched {
        let name: &str = name.as_ref();
        match graph.lookup(name) {
            Some(id) if id != ROOT => {
                if !starts.contains(&id) {
                    starts.push(id);
                }
            }
            _ => debug!(package = name, "touched package is not locked"),
        }
    }

    let visited = match mode {
        PartialValidationMode::OnlyListed => {
            let mut visited = vec![false; graph.len()];
            for &id in &starts {
                visited[id] = true;
            }
            visited
        }
        PartialValidationMode::ListedWithTransitiveDeps => graph.walk(&starts, |id| id != ROOT),
        PartialValidationMode::ListedWithTransitiveDepsNoRootRequire => {
            let pinned: HashSet<NodeId> = graph
                .outgoing(ROOT)
                .flat_map(|edge| graph.resolve(&edge.target))
                .collect();
            graph.walk(&starts, |id| id != ROOT && !pinned.contains(&id))
        }
    };

    let mut scope = ValidationScope::default();
    for (id, record) in graph.locked() {
        if visited[id] {
            scope.live.insert(record.name.clone());
        } else {
            scope.trusted.insert(record.name.clone());
        }
    }
    debug!(
        mode = %mode,
        live = scope.live.len(),
        trusted = scope.trusted.len(),
        "resolved partial scope"
    );
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::package::PackageRecord;
    use crate::ErrorKind;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// root → a, root → c; a → b → c; d is required by nobody
    fn graph() -> LockGraph {
        let manifest = Manifest::from_value(&json!({
            "require": {"vendor/a": "^1.0", "vendor/c": "^1.0"}
        }))
        .unwrap();
        let locked: Vec<Value> = vec![
            json!({"name": "vendor/a", "version": "1.0.0", "require": {"vendor/b": "^1.0"}}),
            json!({"name": "vendor/b", "version": "1.0.0", "require": {"vendor/c": "^1.0"}}),
            json!({"name": "vendor/c", "version": "1.0.0", "require": {"vendor/e": "^1.0"}}),
            json!({"name": "vendor/d", "version": "1.0.0"}),
            json!({"name": "vendor/e", "version": "1.0.0"}),
        ];
        let locked: Vec<_> = locked
            .iter()
            .map(|v| Arc::new(PackageRecord::from_value(v).unwrap()))
            .collect();
        LockGraph::build(&manifest.root, &locked)
    }

    fn live(mode: PartialValidationMode, touched: &[&str]) -> Vec<String> {
        resolve_scope(&graph(), touched, mode)
            .unwrap()
            .live
            .into_iter()
            .collect()
    }

    #[test]
    fn test_only_listed() {
        assert_eq!(live(PartialValidationMode::OnlyListed, &["vendor/a"]), vec!["vendor/a"]);
    }

    #[test]
    fn test_with_dependencies() {
        assert_eq!(
            live(PartialValidationMode::ListedWithTransitiveDeps, &["vendor/a"]),
            vec!["vendor/a", "vendor/b", "vendor/c", "vendor/e"]
        );
    }

    #[test]
    fn test_with_dependencies_stops_at_root_requirements() {
        assert_eq!(
            live(PartialValidationMode::ListedWithTransitiveDepsNoRootRequire, &["vendor/a"]),
            vec!["vendor/a", "vendor/b"]
        );
        assert_eq!(
            live(
                PartialValidationMode::ListedWithTransitiveDepsNoRootRequire,
                &["vendor/b", "vendor/c"]
            ),
            vec!["vendor/b", "vendor/c", "vendor/e"]
        );
    }

    #[test]
    fn test_shared_dependency_of_a_root_requirement_stays_live() {
        // root → a, root → c; a → d, c → d
        let manifest = Manifest::from_value(&json!({
            "require": {"vendor/a": "^1.0", "vendor/c": "^1.0"}
        }))
        .unwrap();
        let locked: Vec<_> = [
            json!({"name": "vendor/a", "version": "1.0.0", "require": {"vendor/d": "^1.0"}}),
            json!({"name": "vendor/c", "version": "1.0.0", "require": {"vendor/d": "^1.0"}}),
            json!({"name": "vendor/d", "version": "1.0.0"}),
        ]
        .iter()
        .map(|v| Arc::new(PackageRecord::from_value(v).unwrap()))
        .collect();
        let graph = LockGraph::build(&manifest.root, &locked);

        // only the root-pinned node is skipped, not everything below it
        let scope = resolve_scope(
            &graph,
            &["vendor/a"],
            PartialValidationMode::ListedWithTransitiveDepsNoRootRequire,
        )
        .unwrap();
        assert_eq!(scope.live.into_iter().collect::<Vec<_>>(), vec!["vendor/a", "vendor/d"]);
        assert_eq!(scope.trusted.into_iter().collect::<Vec<_>>(), vec!["vendor/c"]);
    }

    #[test]
    fn test_scope_partitions_the_lock() {
        let graph = graph();
        let all: BTreeSet<String> = graph.locked().map(|(_, r)| r.name.clone()).collect();
        for mode in PartialValidationMode::ALL {
            let lists: [&[&str]; 3] = [
                &["vendor/a"],
                &["vendor/d", "VENDOR/E"],
                &["vendor/unknown"],
            ];
            for touched in lists {
                let scope = resolve_scope(&graph, touched, mode).unwrap();
                assert!(scope.live.is_disjoint(&scope.trusted), "{} {:?}", mode, touched);
                let union: BTreeSet<String> = scope.live.union(&scope.trusted).cloned().collect();
                assert_eq!(union, all, "{} {:?}", mode, touched);
            }
        }
    }

    #[test]
    fn test_unknown_touched_names_are_ignored() {
        assert!(
            live(PartialValidationMode::ListedWithTransitiveDeps, &["vendor/unknown"]).is_empty()
        );
    }

    #[test]
    fn test_empty_touched_list_is_rejected() {
        let touched: [&str; 0] = [];
        let err = resolve_scope(&graph(), &touched, PartialValidationMode::OnlyListed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_mode_names() {
        for mode in PartialValidationMode::ALL {
            assert_eq!(mode.as_str().parse::<PartialValidationMode>(), Ok(mode));
        }
        assert!("everything".parse::<PartialValidationMode>().is_err());
        assert_eq!(
            serde_json::to_value(PartialValidationMode::ListedWithTransitiveDepsNoRootRequire)
                .unwrap(),
            json!("with-dependencies-no-root-require")
        );
    }
}
