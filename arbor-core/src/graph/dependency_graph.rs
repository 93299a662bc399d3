//! Dependency Graph
//!
//! One `DependencyGraph` exists per live version. Edges point from a
//! dependency to each of its dependents, and both directions are indexed so
//! traversal is cheap either way.
//!
//! Nodes without any edges are never stored. Two graphs with the same edge
//! set therefore compare equal regardless of how they were built.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::maintenance::DependencySource;
use super::node::{NodeEdges, NodeKey};
use crate::state::TreeState;

/// Directed graph from nodes to the selectors that depend on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: HashMap<NodeKey, NodeEdges>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph by asking `source` for the dependencies of every
    /// selector in `selectors`, as read against `tree`.
    ///
    /// Stores only do this at initialization; afterwards graphs are derived
    /// incrementally from their predecessor.
    pub fn from_scratch<'a, I>(selectors: I, tree: &TreeState, source: &dyn DependencySource) -> Self
    where
        I: IntoIterator<Item = &'a NodeKey>,
    {
        let mut graph = Self::new();
        for selector in selectors {
            if let Some(deps) = source.dependencies_of(selector, tree) {
                graph.set_dependencies(selector, deps);
            }
        }
        graph
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    pub fn add_edge(&mut self, dependency: &NodeKey, dependent: &NodeKey) {
        self.nodes
            .entry(dependency.clone())
            .or_default()
            .add_dependent(dependent.clone());
        self.nodes
            .entry(dependent.clone())
            .or_default()
            .add_dependency(dependency.clone());
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: &NodeKey, dependent: &NodeKey) {
        if let Some(edges) = self.nodes.get_mut(dependency) {
            edges.remove_dependent(dependent);
        }
        if let Some(edges) = self.nodes.get_mut(dependent) {
            edges.remove_dependency(dependency);
        }
        self.prune(dependency);
        self.prune(dependent);
    }

    /// Replace the dependency set of `node`, patching only the edges that
    /// differ. Returns true if any edge changed.
    pub fn set_dependencies<I>(&mut self, node: &NodeKey, deps: I) -> bool
    where
        I: IntoIterator<Item = NodeKey>,
    {
        let next: HashSet<NodeKey> = deps.into_iter().collect();
        let previous = self
            .nodes
            .get(node)
            .map(|edges| edges.dependencies().clone())
            .unwrap_or_default();

        let mut changed = false;
        for stale in previous.difference(&next) {
            self.remove_edge(stale, node);
            changed = true;
        }
        for added in next.difference(&previous) {
            self.add_edge(added, node);
            changed = true;
        }
        changed
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node: &NodeKey) {
        if let Some(edges) = self.nodes.remove(node) {
            for dep in edges.dependencies() {
                if let Some(upstream) = self.nodes.get_mut(dep) {
                    upstream.remove_dependent(node);
                }
                self.prune(dep);
            }
            for dependent in edges.dependents() {
                if let Some(downstream) = self.nodes.get_mut(dependent) {
                    downstream.remove_dependency(node);
                }
                self.prune(dependent);
            }
        }
    }

    fn prune(&mut self, node: &NodeKey) {
        if self.nodes.get(node).is_some_and(NodeEdges::is_isolated) {
            self.nodes.remove(node);
        }
    }

    /// Nodes `node` reads from.
    pub fn dependencies(&self, node: &NodeKey) -> Option<&HashSet<NodeKey>> {
        self.nodes.get(node).map(NodeEdges::dependencies)
    }

    /// Nodes that read from `node`.
    pub fn dependents(&self, node: &NodeKey) -> Option<&HashSet<NodeKey>> {
        self.nodes.get(node).map(NodeEdges::dependents)
    }

    /// True if the node has at least one edge.
    pub fn contains(&self, node: &NodeKey) -> bool {
        self.nodes.contains_key(node)
    }

    /// Number of nodes with at least one edge.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|edges| edges.dependents().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every edge as a `(dependency, dependent)` pair, in sorted order.
    pub fn edges(&self) -> BTreeSet<(NodeKey, NodeKey)> {
        self.nodes
            .iter()
            .flat_map(|(node, edges)| {
                edges
                    .dependents()
                    .iter()
                    .map(move |dependent| (node.clone(), dependent.clone()))
            })
            .collect()
    }

    /// Collect `roots` and every node reachable from them by following
    /// dependent edges. Each node appears once, roots first, then in
    /// breadth-first order.
    pub fn downstream<'a, I>(&self, roots: I) -> Vec<NodeKey>
    where
        I: IntoIterator<Item = &'a NodeKey>,
    {
        self.walk(roots, NodeEdges::dependents)
    }

    /// Collect `roots` and every node they transitively read from.
    pub fn upstream<'a, I>(&self, roots: I) -> Vec<NodeKey>
    where
        I: IntoIterator<Item = &'a NodeKey>,
    {
        self.walk(roots, NodeEdges::dependencies)
    }

    fn walk<'a, I>(&self, roots: I, next: fn(&NodeEdges) -> &HashSet<NodeKey>) -> Vec<NodeKey>
    where
        I: IntoIterator<Item = &'a NodeKey>,
    {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<NodeKey> = roots.into_iter().cloned().collect();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.clone()) {
                continue;
            }
            if let Some(edges) = self.nodes.get(&node) {
                queue.extend(next(edges).iter().cloned());
            }
            order.push(node);
        }

        order
    }

    /// Order `nodes` so that dependencies come before their dependents,
    /// considering only edges between members of `nodes`.
    ///
    /// Nodes caught in a cycle cannot be ordered; they are appended at the
    /// end in their input order rather than dropped.
    pub fn topological_order(&self, nodes: &[NodeKey]) -> Vec<NodeKey> {
        let members: HashSet<&NodeKey> = nodes.iter().collect();
        let mut in_degree: HashMap<&NodeKey, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::with_capacity(nodes.len());

        for node in nodes {
            let degree = self
                .dependencies(node)
                .map(|deps| deps.iter().filter(|d| members.contains(d)).count())
                .unwrap_or(0);
            in_degree.insert(node, degree);
            if degree == 0 {
                queue.push_back(node);
            }
        }

        // Kahn's algorithm
        while let Some(node) = queue.pop_front() {
            result.push(node.clone());
            if let Some(dependents) = self.dependents(node) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if result.len() < nodes.len() {
            let placed: HashSet<NodeKey> = result.iter().cloned().collect();
            for node in nodes {
                if !placed.contains(node) {
                    tracing::warn!(node = %node, "dependency cycle, ordering by input");
                    result.push(node.clone());
                }
            }
        }

        result
    }
}
