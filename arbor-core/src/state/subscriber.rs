//! Subscriber types.
//!
//! Components (mounted views) subscribe to nodes; observers subscribe to
//! transactions. Both are plain `(handler, metadata)` pairs.

use std::fmt;
use std::sync::Arc;

use super::tree::TreeState;

/// Identifier of a subscribing view instance.
///
/// Unique while the instance is mounted. Callers unsubscribe on unmount so
/// a later instance is never confused with an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u64);

impl From<u64> for ComponentId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of one transaction-subscription registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl From<u64> for SubscriptionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Handler invoked with the tree a notification refers to.
pub type Handler = Arc<dyn Fn(&TreeState) + Send + Sync>;

/// A component's notify callback together with its debug label.
#[derive(Clone)]
pub struct ComponentCallback {
    handler: Handler,
    label: Arc<str>,
}

impl ComponentCallback {
    pub fn new<F>(label: impl AsRef<str>, handler: F) -> Self
    where
        F: Fn(&TreeState) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            label: Arc::from(label.as_ref()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Notify the component that something it reads changed.
    pub fn notify(&self, tree: &TreeState) {
        (self.handler)(tree);
    }
}

impl fmt::Debug for ComponentCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCallback")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::state::IdAllocator;

    #[test]
    fn notify_calls_handler_with_tree() {
        let ids = IdAllocator::new();
        let tree = TreeState::empty(&ids);
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let seen_clone = seen.clone();

        let callback = ComponentCallback::new("Counter", move |tree: &TreeState| {
            seen_clone.store(tree.version().raw() as usize, Ordering::SeqCst);
        });

        callback.notify(&tree);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(callback.label(), "Counter");
    }

    #[test]
    fn component_ids_display() {
        assert_eq!(ComponentId::from(4).to_string(), "#4");
    }
}
