//! Dependency Graph
//!
//! This module implements the per-version graph that links atoms and
//! selectors to the selectors that read them.
//!
//! # Overview
//!
//! - Nodes are atoms (writable cells) or selectors (derived computations)
//! - Edges represent dependencies: if `s` reads `a`, there is an edge from
//!   `a` to `s`
//!
//! Every live version owns one graph. A new version's graph is derived from
//! its predecessor by [`derive_graph`], which walks downward from the nodes
//! that changed and re-derives only the selectors it reaches.
//!
//! # Design Decisions
//!
//! 1. Graphs are plain values. The store shares them behind `Arc` and never
//!    mutates one that a reader might hold.
//!
//! 2. Both forward (dependencies) and reverse (dependents) edges are kept so
//!    traversal is cheap in either direction.
//!
//! 3. Maintenance is a pure function of (prior graph, dirty nodes), so it can
//!    be tested without a store.

mod dependency_graph;
mod maintenance;
mod node;

pub use dependency_graph::DependencyGraph;
pub use maintenance::{
    derive_graph, Dependencies, DependencySource, DerivedGraph, GraphUpdate, RetainDependencies,
};
pub use node::{NodeEdges, NodeKey, NodeKind};
