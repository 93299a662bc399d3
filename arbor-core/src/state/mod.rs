//! Snapshots and Bookkeeping
//!
//! This module holds the data the store manages: versioned, immutable
//! [`TreeState`] snapshots and the mutable per-root [`StoreState`].
//!
//! # Concepts
//!
//! ## Tree State
//!
//! One snapshot of every node value at a given [`Version`]. A snapshot is
//! never modified after construction; a transaction produces a new one with
//! a new version, so a reader holding a snapshot never observes a
//! half-applied write.
//!
//! ## Store State
//!
//! The mutable side: the current and pending snapshots, registered nodes,
//! one dependency graph per live version, component and transaction
//! subscriptions, queued notifications, and suspended readers.

mod resolver;
mod store_state;
mod subscriber;
mod tree;
mod value;
mod version;

pub use resolver::{Resolver, SuspendedResolvers, Wakeup};
pub use store_state::{QueuedCallback, StoreState};
pub use subscriber::{ComponentCallback, ComponentId, Handler, SubscriptionId};
pub use tree::{TransactionMetadata, TreeState};
pub use value::{LoadError, Loadable, LoadingId, Value};
pub use version::{IdAllocator, Version};

/// Allocate a version and build an empty snapshot for it.
pub fn make_empty_tree_state(ids: &IdAllocator) -> TreeState {
    TreeState::empty(ids)
}

/// Build a store state around `tree`.
pub fn make_store_state(tree: TreeState) -> StoreState {
    StoreState::from_tree(tree)
}

/// Build a store state around a fresh empty tree at version 0.
pub fn make_empty_store_state() -> StoreState {
    StoreState::empty()
}
