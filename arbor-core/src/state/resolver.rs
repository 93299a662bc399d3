//! Suspended readers.
//!
//! A reader that needs a value still loading registers a [`Resolver`] and
//! awaits the paired [`Wakeup`]. Resolvers are single-use: fulfilling one
//! consumes it, and the container hands each one out exactly once.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use indexmap::IndexMap;
use tokio::sync::oneshot;

use super::subscriber::ComponentId;
use super::version::Version;
use crate::graph::NodeKey;

/// Completion handle for one suspended read.
#[derive(Debug)]
pub struct Resolver {
    component: ComponentId,
    node: NodeKey,
    sender: oneshot::Sender<Version>,
}

impl Resolver {
    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// The node the reader is waiting on.
    pub fn node(&self) -> &NodeKey {
        &self.node
    }

    /// Wake the reader, telling it which version to read. Returns false if
    /// the reader stopped waiting.
    pub fn fulfill(self, version: Version) -> bool {
        self.sender.send(version).is_ok()
    }
}

/// Future a suspended reader awaits.
///
/// Resolves to the version that made the value available, or `None` if the
/// wait was cancelled (the component unmounted or the root was torn down).
#[derive(Debug)]
pub struct Wakeup {
    receiver: oneshot::Receiver<Version>,
}

impl Wakeup {
    /// A wakeup that is already resolved.
    pub(crate) fn ready(version: Version) -> Self {
        let (sender, receiver) = oneshot::channel();
        // The receiver is alive right here, so this cannot fail.
        let _ = sender.send(version);
        Self { receiver }
    }

    /// Check for a result without waiting.
    pub fn try_take(&mut self) -> Option<Version> {
        self.receiver.try_recv().ok()
    }
}

impl Future for Wakeup {
    type Output = Option<Version>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(Result::ok)
    }
}

/// Set of resolvers for readers currently suspended.
#[derive(Debug, Default)]
pub struct SuspendedResolvers {
    next_id: u64,
    pending: IndexMap<u64, Resolver>,
}

impl SuspendedResolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reader waiting on `node`.
    pub fn suspend(&mut self, component: ComponentId, node: NodeKey) -> Wakeup {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(
            id,
            Resolver {
                component,
                node,
                sender,
            },
        );
        Wakeup { receiver }
    }

    /// Remove and return every resolver matching `predicate`, in
    /// registration order.
    pub fn take_where<F>(&mut self, mut predicate: F) -> Vec<Resolver>
    where
        F: FnMut(&Resolver) -> bool,
    {
        let ids: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, resolver)| predicate(resolver))
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter()
            .filter_map(|id| self.pending.shift_remove(&id))
            .collect()
    }

    /// Drop every resolver registered by `component`; its readers observe
    /// cancellation.
    pub fn drop_component(&mut self, component: ComponentId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, resolver| resolver.component != component);
        before - self.pending.len()
    }

    /// Drop every resolver.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True if `component` has a reader waiting on `node`.
    pub fn is_waiting(&self, component: ComponentId, node: &NodeKey) -> bool {
        self.pending
            .values()
            .any(|resolver| resolver.component == component && &resolver.node == node)
    }
}
