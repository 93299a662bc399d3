//! Commit delivery.
//!
//! A commit promotes its snapshot at once but hands the notification work
//! to a per-root queue. Only one commit drains the queue at a time: a
//! commit started from inside a callback lands behind the delivery in
//! progress, so every observer sees versions in the order they were
//! committed.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::state::{Handler, QueuedCallback, Resolver, TreeState};

/// Everything one commit has to notify, collected while the state was
/// locked.
pub(crate) struct Delivery {
    pub(crate) tree: Arc<TreeState>,
    pub(crate) scoped: Vec<Handler>,
    pub(crate) components: Vec<QueuedCallback>,
    pub(crate) global: Vec<Handler>,
    pub(crate) resolvers: Vec<Resolver>,
}

#[derive(Default)]
pub(crate) struct DeliveryQueue {
    draining: bool,
    pending: VecDeque<Delivery>,
}

impl DeliveryQueue {
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drop every undelivered commit. Suspended readers in them observe
    /// cancellation.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

/// Exclusive right to drain a root's delivery queue.
///
/// Yields deliveries in commit order until the queue is empty. Dropping the
/// drain early (a callback panicked) discards what is left so the root is
/// not stuck delivering.
pub(crate) struct Drain<'a> {
    queue: &'a Mutex<DeliveryQueue>,
}

impl<'a> Drain<'a> {
    /// Queue `delivery`. Returns the drain if no other commit is delivering,
    /// otherwise `None`: the drain in progress picks the delivery up.
    pub(crate) fn push(queue: &'a Mutex<DeliveryQueue>, delivery: Delivery) -> Option<Self> {
        let mut guard = queue.lock();
        guard.pending.push_back(delivery);
        if guard.draining {
            return None;
        }
        guard.draining = true;
        Some(Self { queue })
    }
}

impl Iterator for Drain<'_> {
    type Item = Delivery;

    fn next(&mut self) -> Option<Delivery> {
        let mut guard = self.queue.lock();
        let next = guard.pending.pop_front();
        if next.is_none() {
            guard.draining = false;
        }
        next
    }
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        let mut guard = self.queue.lock();
        if guard.draining {
            guard.draining = false;
            guard.pending.clear();
        }
    }
}
