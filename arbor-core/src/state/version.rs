//! Versions and identity allocation.
//!
//! Every root owns one [`IdAllocator`]. Versions start at 0 for each root and
//! only ever increase; nothing is shared between roots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::subscriber::{ComponentId, SubscriptionId};
use super::value::LoadingId;

/// Identifier of one tree-state snapshot. Totally ordered, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Get the raw version number.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-root allocator for versions and opaque identifiers.
#[derive(Debug, Default)]
pub struct IdAllocator {
    versions: AtomicU64,
    components: AtomicU64,
    subscriptions: AtomicU64,
    loads: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator whose first version is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator whose first version follows `version`.
    pub fn resuming_after(version: Version) -> Self {
        Self {
            versions: AtomicU64::new(version.0 + 1),
            ..Self::default()
        }
    }

    /// Issue a version strictly greater than every version issued before.
    pub fn next_version(&self) -> Version {
        Version(self.versions.fetch_add(1, Ordering::Relaxed))
    }

    /// Issue a fresh component identifier.
    pub fn next_component(&self) -> ComponentId {
        ComponentId::from(self.components.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_subscription(&self) -> SubscriptionId {
        SubscriptionId::from(self.subscriptions.fetch_add(1, Ordering::Relaxed))
    }

    /// Issue a token identifying one in-flight asynchronous computation.
    pub fn next_loading(&self) -> LoadingId {
        LoadingId::from(self.loads.fetch_add(1, Ordering::Relaxed))
    }
}
