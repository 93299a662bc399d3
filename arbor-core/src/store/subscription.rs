//! Releasable subscription handles.
//!
//! Handles hold only a weak reference to the root, so an outstanding handle
//! never keeps a torn-down root alive. Dropping a handle does not release
//! it; `release` does, and calling it again is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;

use crate::graph::NodeKey;
use crate::state::{ComponentId, StoreState, SubscriptionId};

/// Capability returned by `Store::subscribe_to_transactions`.
#[derive(Debug)]
pub struct TransactionSubscription {
    state: Weak<Mutex<StoreState>>,
    id: SubscriptionId,
    node: Option<NodeKey>,
    released: AtomicBool,
}

impl TransactionSubscription {
    pub(crate) fn new(state: Weak<Mutex<StoreState>>, id: SubscriptionId, node: Option<NodeKey>) -> Self {
        Self {
            state,
            id,
            node,
            released: AtomicBool::new(false),
        }
    }

    /// The node this subscription is scoped to, if any.
    pub fn node(&self) -> Option<&NodeKey> {
        self.node.as_ref()
    }

    /// Stop receiving commits.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            state
                .lock()
                .remove_transaction_subscription(self.id, self.node.as_ref());
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Capability returned by `Store::subscribe_component`.
#[derive(Debug)]
pub struct ComponentSubscription {
    state: Weak<Mutex<StoreState>>,
    component: ComponentId,
    node: NodeKey,
    released: AtomicBool,
}

impl ComponentSubscription {
    pub(crate) fn new(state: Weak<Mutex<StoreState>>, component: ComponentId, node: NodeKey) -> Self {
        Self {
            state,
            component,
            node,
            released: AtomicBool::new(false),
        }
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn node(&self) -> &NodeKey {
        &self.node
    }

    /// Remove this one node subscription. The component's other
    /// subscriptions are untouched.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            state.lock().unsubscribe_component(&self.node, self.component);
        }
    }
}
