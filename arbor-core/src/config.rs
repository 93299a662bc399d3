//! Root configuration.

use serde::Deserialize;

use crate::error::Result;

/// Settings for a single store root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Label attached to tracing spans emitted by this root.
    pub label: Option<String>,

    /// Number of previously committed versions whose graphs are kept
    /// around even when no component reads them any more.
    pub graph_history: usize,

    /// Coalesce enqueued notifications so each component is called at most
    /// once per flush.
    pub dedupe_queued_callbacks: bool,
}

impl StoreConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Label used in tracing spans.
    pub fn span_label(&self) -> &str {
        self.label.as_deref().unwrap_or("root")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            label: None,
            graph_history: 1,
            dedupe_queued_callbacks: true,
        }
    }
}
