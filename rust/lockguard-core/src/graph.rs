//! Requirement graph over the root and the locked packages.
//!
//! Nodes live in an arena indexed by [`NodeId`]; node 0 is always the root.
//! Edges live in a second arena, indexed by target name and by source node.
//! Platform packages never become edge targets.

use crate::manifest::RootPackage;
use crate::package::{is_platform_package, Link, PackageRecord};
use crate::semver::Constraint;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

pub type NodeId = usize;

/// The synthetic root node.
pub const ROOT: NodeId = 0;

/// One `require` entry of the root or of a locked package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementEdge {
    pub source: NodeId,
    /// Lowercase target name.
    pub target: String,
    pub pretty_target: String,
    pub constraint: Constraint,
    pub pretty_constraint: String,
}

impl RequirementEdge {
    fn from_link(source: NodeId, link: &Link) -> Self {
        Self {
            source,
            target: link.target.clone(),
            pretty_target: link.pretty_target.clone(),
            constraint: link.constraint.clone(),
            pretty_constraint: link.pretty_constraint.clone(),
        }
    }
}

/// Read-only requirement graph built once per validation run.
#[derive(Debug, Clone)]
pub struct LockGraph {
    nodes: Vec<Arc<PackageRecord>>,
    edges: Vec<RequirementEdge>,
    by_name: HashMap<String, NodeId>,
    edges_by_target: HashMap<String, Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
    /// Nodes declaring a provide or replace, keyed by the provided name.
    providers: HashMap<String, Vec<NodeId>>,
}

impl LockGraph {
    /// Build the graph from the root (`require` and `require-dev`) and the
    /// locked records in lock order.
    pub fn build(root: &RootPackage, locked: &[Arc<PackageRecord>]) -> Self {
        let mut graph = Self {
            nodes: Vec::with_capacity(locked.len() + 1),
            edges: Vec::new(),
            by_name: HashMap::with_capacity(locked.len() + 1),
            edges_by_target: HashMap::new(),
            outgoing: Vec::with_capacity(locked.len() + 1),
            providers: HashMap::new(),
        };

        graph.add_node(Arc::clone(&root.record), root.all_requires());
        for record in locked {
            graph.add_node(Arc::clone(record), record.requires.iter());
        }
        graph
    }

    fn add_node<'l>(
        &mut self,
        record: Arc<PackageRecord>,
        requires: impl Iterator<Item = &'l Link>,
    ) {
        let id = self.nodes.len();
        self.by_name.entry(record.name.clone()).or_insert(id);
        for link in record.provided_links() {
            let providers = self.providers.entry(link.target.clone()).or_default();
            if providers.last() != Some(&id) {
                providers.push(id);
            }
        }

        let mut outgoing = Vec::new();
        for link in requires.filter(|link| !is_platform_package(&link.target)) {
            let index = self.edges.len();
            self.edges.push(RequirementEdge::from_link(id, link));
            self.edges_by_target.entry(link.target.clone()).or_default().push(index);
            outgoing.push(index);
        }
        self.outgoing.push(outgoing);
        self.nodes.push(record);
    }

    pub fn node(&self, id: NodeId) -> &Arc<PackageRecord> {
        &self.nodes[id]
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Locked packages in lock order.
    pub fn locked(&self) -> impl Iterator<Item = (NodeId, &Arc<PackageRecord>)> {
        self.nodes.iter().enumerate().skip(1)
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn edges(&self) -> &[RequirementEdge] {
        &self.edges
    }

    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &RequirementEdge> {
        self.outgoing[id].iter().map(move |&index| &self.edges[index])
    }

    /// Edges whose target is `name`.
    pub fn incoming(&self, name: &str) -> impl Iterator<Item = &RequirementEdge> {
        self.edges_by_target
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&index| &self.edges[index])
    }

    /// Nodes a requirement on `target` can land on: the node of that name and
    /// the nodes providing or replacing it.
    pub fn resolve(&self, target: &str) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.by_name.get(target).copied().into_iter().collect();
        if let Some(providers) = self.providers.get(target) {
            for &id in providers {
                if !nodes.contains(&id) {
                    nodes.push(id);
                }
            }
        }
        nodes
    }

    /// Nodes requiring `id` directly, by its name or by a name it provides or
    /// replaces. A node requiring itself does not count.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        let record = &self.nodes[id];
        let names = std::iter::once(record.name.as_str())
            .chain(record.provided_links().map(|link| link.target.as_str()));

        let mut seen = HashSet::new();
        let mut dependents = Vec::new();
        for name in names {
            for edge in self.incoming(name) {
                if edge.source != id && seen.insert(edge.source) {
                    dependents.push(edge.source);
                }
            }
        }
        dependents
    }

    /// Breadth-first walk along requirement edges from `starts`.
    ///
    /// `enter` decides whether the walk may step into a node; start nodes are
    /// always visited. Returns a visited flag per node.
    pub fn walk<F>(&self, starts: &[NodeId], mut enter: F) -> Vec<bool>
    where
        F: FnMut(NodeId) -> bool,
    {
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        for &start in starts {
            if !visited[start] {
                visited[start] = true;
                queue.push_back(start);
            }
        }

        while let Some(id) = queue.pop_front() {
            for edge in self.outgoing(id) {
                for next in self.resolve(&edge.target) {
                    if !visited[next] && enter(next) {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
        visited
    }

    /// Nodes reachable from the root.
    pub fn reachable(&self) -> Vec<bool> {
        self.walk(&[ROOT], |_| true)
    }
}
