//! Incremental Graph Maintenance
//!
//! A version's graph is derived from its predecessor's graph plus the set of
//! nodes that changed, never recomputed from scratch.
//!
//! # Algorithm
//!
//! 1. Start from the dirty roots: the atoms written by a transaction, or the
//!    single selector whose asynchronous computation just resolved.
//! 2. Walk downward through the predecessor's dependent edges to collect
//!    every selector whose declared dependencies might have changed.
//! 3. Sort the collected nodes topologically so upstream selectors are
//!    re-derived before the selectors that read them.
//! 4. Ask the [`DependencySource`] for each node's dependencies exactly once
//!    and patch only the edges that differ.
//!
//! A selector reached from several changed roots is still re-derived once
//! per update: batch semantics, not dependency-count semantics.
//!
//! Changes to the component-subscription table alone do not touch the
//! graph. Pruning nodes no live component depends on (walking upward from a
//! component's subscriptions, then downward from abandoned nodes) is left as
//! an extension point.

use std::collections::HashSet;

use smallvec::SmallVec;

use super::dependency_graph::DependencyGraph;
use super::node::NodeKey;
use crate::state::TreeState;

/// A selector's declared dependency set.
pub type Dependencies = SmallVec<[NodeKey; 4]>;

/// The selector-evaluation layer's view of dependencies.
///
/// Implementations report which nodes a selector reads when evaluated
/// against `tree`. Returning `None` keeps whatever edges the predecessor
/// graph already recorded for that node, which is also the right answer
/// for atoms.
pub trait DependencySource: Send + Sync {
    fn dependencies_of(&self, selector: &NodeKey, tree: &TreeState) -> Option<Dependencies>;
}

impl<F> DependencySource for F
where
    F: Fn(&NodeKey, &TreeState) -> Option<Dependencies> + Send + Sync,
{
    fn dependencies_of(&self, selector: &NodeKey, tree: &TreeState) -> Option<Dependencies> {
        self(selector, tree)
    }
}

/// Source that never re-declares anything.
///
/// Edges then only change when the selector layer records them through
/// `Store::save_dependencies`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainDependencies;

impl DependencySource for RetainDependencies {
    fn dependencies_of(&self, _selector: &NodeKey, _tree: &TreeState) -> Option<Dependencies> {
        None
    }
}

/// What changed between the predecessor version and the new one.
#[derive(Debug, Clone, Copy)]
pub enum GraphUpdate<'a> {
    /// A synchronous transaction wrote these nodes.
    Writes(&'a HashSet<NodeKey>),

    /// An asynchronous selector computation resolved.
    Resolution(&'a NodeKey),
}

impl GraphUpdate<'_> {
    fn roots(&self) -> Vec<&NodeKey> {
        match self {
            GraphUpdate::Writes(dirty) => {
                let mut roots: Vec<&NodeKey> = dirty.iter().collect();
                // Deterministic traversal regardless of hash order.
                roots.sort();
                roots
            }
            GraphUpdate::Resolution(selector) => vec![*selector],
        }
    }
}

/// Output of [`derive_graph`].
#[derive(Debug, Clone)]
pub struct DerivedGraph {
    /// The new version's graph.
    pub graph: DependencyGraph,

    /// Nodes whose dependencies were re-declared, in evaluation order.
    pub reevaluated: Vec<NodeKey>,
}

/// Derive the graph for a new version from its predecessor.
///
/// Pure apart from the calls into `source`; the predecessor is untouched.
pub fn derive_graph(
    prior: &DependencyGraph,
    update: GraphUpdate<'_>,
    tree: &TreeState,
    source: &dyn DependencySource,
) -> DerivedGraph {
    let roots = update.roots();
    let affected = prior.downstream(roots);
    let order = prior.topological_order(&affected);

    let mut graph = prior.clone();
    let mut reevaluated = Vec::new();

    for node in order {
        if let Some(deps) = source.dependencies_of(&node, tree) {
            if graph.set_dependencies(&node, deps) {
                tracing::trace!(node = %node, "dependencies changed");
            }
            reevaluated.push(node);
        }
    }

    DerivedGraph { graph, reevaluated }
}
