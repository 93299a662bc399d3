//! Tree State
//!
//! A `TreeState` is one immutable, versioned snapshot of every node value.
//!
//! # Sharing
//!
//! Each collection sits behind its own `Arc`. Deriving a new tree clones the
//! handles and copies only the collections that change, so trees already
//! handed out to readers are never touched. Builder methods keep the version
//! of the tree they were called on; the store stamps a fresh version when it
//! installs the result.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::value::{Loadable, Value};
use super::version::{IdAllocator, Version};
use crate::graph::NodeKey;

/// Free-form metadata attached to a transaction.
pub type TransactionMetadata = serde_json::Map<String, serde_json::Value>;

/// Identifies the transaction a tree was built in. Unique across roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TransactionToken(u64);

impl TransactionToken {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Immutable snapshot of all node values at one version.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeState {
    version: Version,
    token: TransactionToken,
    transaction_metadata: Arc<TransactionMetadata>,
    dirty_atoms: Arc<HashSet<NodeKey>>,
    atom_values: Arc<HashMap<NodeKey, Loadable>>,
    nonvalidated_atoms: Arc<HashMap<NodeKey, Value>>,
}

impl TreeState {
    /// Allocate a version and build an empty snapshot for it.
    pub fn empty(ids: &IdAllocator) -> Self {
        Self {
            version: ids.next_version(),
            token: TransactionToken::next(),
            transaction_metadata: Arc::default(),
            dirty_atoms: Arc::default(),
            atom_values: Arc::default(),
            nonvalidated_atoms: Arc::default(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn transaction_metadata(&self) -> &TransactionMetadata {
        &self.transaction_metadata
    }

    /// Nodes written by the transaction that produced this snapshot.
    pub fn dirty_atoms(&self) -> &HashSet<NodeKey> {
        &self.dirty_atoms
    }

    pub fn atom_values(&self) -> &HashMap<NodeKey, Loadable> {
        &self.atom_values
    }

    /// Raw values restored from outside that no atom has validated yet.
    pub fn nonvalidated_atoms(&self) -> &HashMap<NodeKey, Value> {
        &self.nonvalidated_atoms
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Loadable> {
        self.atom_values.get(key)
    }

    /// True if the node's value is waiting on an asynchronous computation.
    pub fn is_loading(&self, key: &NodeKey) -> bool {
        self.get(key).is_some_and(Loadable::is_loading)
    }

    /// Return a tree with `key` set to `loadable` and marked dirty.
    ///
    /// Any non-validated value for `key` is dropped.
    #[must_use]
    pub fn set(&self, key: NodeKey, loadable: Loadable) -> Self {
        let mut next = self.clone();
        if next.nonvalidated_atoms.contains_key(&key) {
            Arc::make_mut(&mut next.nonvalidated_atoms).remove(&key);
        }
        Arc::make_mut(&mut next.dirty_atoms).insert(key.clone());
        Arc::make_mut(&mut next.atom_values).insert(key, loadable);
        next
    }

    /// Shorthand for `set(key, Loadable::Ready(value))`.
    #[must_use]
    pub fn set_value(&self, key: NodeKey, value: Value) -> Self {
        self.set(key, Loadable::Ready(value))
    }

    /// Return a tree without a value for `key`, marked dirty.
    #[must_use]
    pub fn reset(&self, key: NodeKey) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.atom_values).remove(&key);
        Arc::make_mut(&mut next.dirty_atoms).insert(key);
        next
    }

    /// Return a tree holding `raw` as the not-yet-validated value of `key`.
    #[must_use]
    pub fn set_nonvalidated(&self, key: NodeKey, raw: Value) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.nonvalidated_atoms).insert(key, raw);
        next
    }

    /// Return a tree whose metadata has `fields` merged in. Later fields
    /// win on conflicting names.
    #[must_use]
    pub fn with_metadata(&self, fields: TransactionMetadata) -> Self {
        let mut next = self.clone();
        if !fields.is_empty() {
            Arc::make_mut(&mut next.transaction_metadata).extend(fields);
        }
        next
    }

    /// Base tree for a transaction starting on top of this committed one:
    /// same values and version, nothing dirty, fresh metadata and a fresh
    /// transaction token.
    pub(crate) fn begin_transaction(&self, metadata: TransactionMetadata) -> Self {
        Self {
            version: self.version,
            token: TransactionToken::next(),
            transaction_metadata: Arc::new(metadata),
            dirty_atoms: Arc::default(),
            atom_values: Arc::clone(&self.atom_values),
            nonvalidated_atoms: Arc::clone(&self.nonvalidated_atoms),
        }
    }

    /// True if both trees were built in the same transaction. Builder
    /// methods carry the token over, so only trees derived from the
    /// transaction's base share it.
    pub(crate) fn same_transaction(&self, other: &Self) -> bool {
        self.token == other.token
    }

    pub(crate) fn stamped(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// True if `other` is this exact snapshot rather than a modified copy.
    pub(crate) fn shares_storage(&self, other: &Self) -> bool {
        self.version == other.version
            && self.token == other.token
            && Arc::ptr_eq(&self.transaction_metadata, &other.transaction_metadata)
            && Arc::ptr_eq(&self.dirty_atoms, &other.dirty_atoms)
            && Arc::ptr_eq(&self.atom_values, &other.atom_values)
            && Arc::ptr_eq(&self.nonvalidated_atoms, &other.nonvalidated_atoms)
    }
}
