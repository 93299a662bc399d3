//! Arbor Core
//!
//! This crate provides the state-propagation runtime behind the Arbor
//! reactive state library. It implements:
//!
//! - Immutable, versioned snapshots of node values
//! - Per-root bookkeeping for subscriptions, queued notifications and
//!   suspended readers
//! - A per-version dependency graph maintained incrementally
//! - The transaction protocol that moves a root from one snapshot to the next
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node identities and the dependency graph with its maintenance
//! - `state`: Snapshots, the per-root state container and identifiers
//! - `store`: The store façade and transaction protocol
//! - `config`: Root configuration
//! - `error`: Error taxonomy
//!
//! # Example
//!
//! ```rust
//! use arbor_core::{NodeKey, NotifyMode, Store, Value};
//!
//! let store = Store::new();
//! store.register_atom("count").unwrap();
//!
//! let component = store.allocate_component_id();
//! let _subscription = store
//!     .subscribe_component(component, NodeKey::new("count"), "Counter", |tree| {
//!         println!("count is now {:?}", tree.get(&NodeKey::new("count")));
//!     })
//!     .unwrap();
//!
//! store
//!     .replace_state(|tree| tree.set_value(NodeKey::new("count"), Value::new(5)))
//!     .unwrap();
//! store.commit().unwrap();
//!
//! store.fire_node_subscriptions([&NodeKey::new("count")], NotifyMode::Now);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod state;
pub mod store;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use graph::{DependencyGraph, DependencySource, NodeKey, NodeKind};
pub use state::{
    make_empty_store_state, make_empty_tree_state, make_store_state, ComponentId, Loadable, StoreState,
    TransactionMetadata, TreeState, Value, Version,
};
pub use store::{ComponentSubscription, NotifyMode, Store, TransactionSubscription};
