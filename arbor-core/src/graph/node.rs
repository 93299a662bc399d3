//! Graph Nodes
//!
//! This module defines the keys and per-node edge sets that live in the
//! dependency graph.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Identifier for an atom or selector.
///
/// Keys are cheap to clone and stable for the lifetime of the node's
/// registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(Arc<str>);

impl NodeKey {
    /// Create a key from a name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Get the key's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for NodeKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// The kind of node registered with a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A writable state cell. Atoms are the roots of the graph: they have
    /// dependents but never dependencies.
    Atom,

    /// A derived, possibly asynchronous computation over atoms and other
    /// selectors.
    Selector,
}

/// Edges incident to one node in the dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeEdges {
    /// Nodes this node reads from (upstream).
    dependencies: HashSet<NodeKey>,

    /// Nodes that read from this node (downstream).
    dependents: HashSet<NodeKey>,
}

impl NodeEdges {
    /// Add a dependency (a node that this node reads from).
    pub fn add_dependency(&mut self, key: NodeKey) -> bool {
        self.dependencies.insert(key)
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, key: &NodeKey) -> bool {
        self.dependencies.remove(key)
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &HashSet<NodeKey> {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, key: NodeKey) -> bool {
        self.dependents.insert(key)
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, key: &NodeKey) -> bool {
        self.dependents.remove(key)
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &HashSet<NodeKey> {
        &self.dependents
    }

    /// True when the node has no edges in either direction.
    pub fn is_isolated(&self) -> bool {
        self.dependencies.is_empty() && self.dependents.is_empty()
    }
}
