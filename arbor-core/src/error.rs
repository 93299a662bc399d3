//! Store Errors
//!
//! Structural violations (version ordering, graph presence, registration)
//! are surfaced synchronously from the call that detected them. Subscription
//! staleness is absorbed internally and only ever logged.

use thiserror::Error;

use crate::graph::{NodeKey, NodeKind};
use crate::state::{ComponentId, Version};

/// Errors raised by the store and its bookkeeping structures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No dependency graph is installed for the requested version.
    ///
    /// Every live version gets a graph when it is created, so this always
    /// indicates a caller holding a version that was already collected.
    #[error("no dependency graph installed for version {version}")]
    GraphNotFound { version: Version },

    /// A transaction transform produced a tree derived from a snapshot other
    /// than the latest pending one.
    #[error(
        "transaction transform derived from version {found}, \
         but the latest pending snapshot is version {expected}"
    )]
    ConcurrentTransactionViolation { expected: Version, found: Version },

    /// A queued callback belongs to a component that has unsubscribed.
    #[error("component {component} is no longer subscribed")]
    StaleComponentSubscription { component: ComponentId },

    /// The node was never registered with this root.
    #[error("node `{key}` has not been registered")]
    UnregisteredNode { key: NodeKey },

    /// The key is already registered with a different kind.
    #[error("node `{key}` is already registered as {existing:?}")]
    NodeKindConflict { key: NodeKey, existing: NodeKind },

    /// Dependencies may only be recorded into the newest version's graph.
    #[error("graph for version {version} is finalized")]
    GraphFinalized { version: Version },

    /// A candidate tree would not advance past the committed version.
    #[error("version {candidate} does not follow current version {current}")]
    VersionOrdering { candidate: Version, current: Version },

    /// Configuration input could not be parsed.
    #[error("invalid store configuration")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = StoreError::GraphNotFound {
            version: Version::from(7),
        };
        assert_eq!(err.to_string(), "no dependency graph installed for version 7");

        let err = StoreError::UnregisteredNode {
            key: NodeKey::new("count"),
        };
        assert_eq!(err.to_string(), "node `count` has not been registered");
    }

    #[test]
    fn config_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StoreError = parse.into();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
