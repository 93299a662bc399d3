//! Store State
//!
//! The mutable, per-root container of snapshots, graphs and subscription
//! tables. Only the store façade drives it through a transaction; the
//! methods here keep each table consistent on their own but know nothing
//! about commit ordering or when callbacks run.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::resolver::SuspendedResolvers;
use super::subscriber::{ComponentCallback, ComponentId, Handler, SubscriptionId};
use super::tree::{TransactionMetadata, TreeState};
use super::version::{IdAllocator, Version};
use crate::error::{Result, StoreError};
use crate::graph::{DependencyGraph, NodeKey, NodeKind};

/// A component notification waiting for the next flush.
#[derive(Debug, Clone)]
pub struct QueuedCallback {
    pub component: ComponentId,
    /// The subscription the callback was registered under.
    pub node: NodeKey,
    pub callback: ComponentCallback,
}

/// Mutable bookkeeping for one root.
pub struct StoreState {
    ids: IdAllocator,

    current_tree: Arc<TreeState>,
    next_tree: Option<Arc<TreeState>>,
    previous_tree: Option<Arc<TreeState>>,

    /// Metadata for a transaction that has not started yet.
    pending_metadata: TransactionMetadata,
    commit_depth: usize,

    known_atoms: HashSet<NodeKey>,
    known_selectors: HashSet<NodeKey>,

    versions_used_by_component: HashMap<ComponentId, Version>,
    node_to_component_subscriptions: HashMap<NodeKey, IndexMap<ComponentId, ComponentCallback>>,
    /// Reverse index of the table above.
    component_nodes: HashMap<ComponentId, IndexSet<NodeKey>>,

    graphs_by_version: BTreeMap<Version, Arc<DependencyGraph>>,
    /// Previously committed versions, oldest first.
    committed_history: VecDeque<Version>,

    transaction_subscriptions: IndexMap<SubscriptionId, Handler>,
    node_transaction_subscriptions: HashMap<NodeKey, IndexMap<SubscriptionId, Handler>>,

    queued_component_callbacks: VecDeque<QueuedCallback>,
    /// Components with an entry in the queue above.
    queued_components: IndexSet<ComponentId>,
    suspended_component_resolvers: SuspendedResolvers,
}

impl StoreState {
    /// Build a store state around `tree`, seeding an empty graph for its
    /// version.
    pub fn from_tree(tree: TreeState) -> Self {
        let ids = IdAllocator::resuming_after(tree.version());
        Self::with_allocator(ids, tree)
    }

    /// Build a store state around a fresh empty tree at version 0.
    pub fn empty() -> Self {
        let ids = IdAllocator::new();
        let tree = TreeState::empty(&ids);
        Self::with_allocator(ids, tree)
    }

    fn with_allocator(ids: IdAllocator, tree: TreeState) -> Self {
        let mut graphs_by_version = BTreeMap::new();
        graphs_by_version.insert(tree.version(), Arc::new(DependencyGraph::new()));

        Self {
            ids,
            current_tree: Arc::new(tree),
            next_tree: None,
            previous_tree: None,
            pending_metadata: TransactionMetadata::new(),
            commit_depth: 0,
            known_atoms: HashSet::new(),
            known_selectors: HashSet::new(),
            versions_used_by_component: HashMap::new(),
            node_to_component_subscriptions: HashMap::new(),
            component_nodes: HashMap::new(),
            graphs_by_version,
            committed_history: VecDeque::new(),
            transaction_subscriptions: IndexMap::new(),
            node_transaction_subscriptions: HashMap::new(),
            queued_component_callbacks: VecDeque::new(),
            queued_components: IndexSet::new(),
            suspended_component_resolvers: SuspendedResolvers::new(),
        }
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn current_tree(&self) -> &Arc<TreeState> {
        &self.current_tree
    }

    /// The in-flight snapshot, present only while a transaction is pending.
    pub fn next_tree(&self) -> Option<&Arc<TreeState>> {
        self.next_tree.as_ref()
    }

    pub fn previous_tree(&self) -> Option<&Arc<TreeState>> {
        self.previous_tree.as_ref()
    }

    /// The pending snapshot if there is one, otherwise the current one.
    pub fn latest_tree(&self) -> &Arc<TreeState> {
        self.next_tree.as_ref().unwrap_or(&self.current_tree)
    }

    /// Tree a transaction transform should be applied to.
    pub(crate) fn transaction_base(&self) -> Arc<TreeState> {
        match &self.next_tree {
            Some(next) => Arc::clone(next),
            None => Arc::new(
                self.current_tree
                    .begin_transaction(self.pending_metadata.clone()),
            ),
        }
    }

    /// Install `tree` as the pending snapshot along with its graph.
    pub(crate) fn install_next(&mut self, tree: TreeState, graph: DependencyGraph) -> Result<Version> {
        let version = tree.version();
        let latest = self.latest_tree().version();
        if version <= latest {
            return Err(StoreError::VersionOrdering {
                candidate: version,
                current: latest,
            });
        }

        if self.next_tree.is_none() {
            self.pending_metadata.clear();
        }
        self.graphs_by_version.insert(version, Arc::new(graph));
        self.next_tree = Some(Arc::new(tree));
        Ok(version)
    }

    /// Promote the pending snapshot to current. Returns the new current
    /// tree, or `None` if nothing was pending.
    pub(crate) fn promote_next(&mut self) -> Option<Arc<TreeState>> {
        let next = self.next_tree.take()?;
        let previous = std::mem::replace(&mut self.current_tree, Arc::clone(&next));
        self.committed_history.push_back(previous.version());
        self.previous_tree = Some(previous);
        Some(next)
    }

    // ------------------------------------------------------------------
    // Transaction metadata and batching
    // ------------------------------------------------------------------

    /// Stash metadata for the transaction that has not started yet.
    pub(crate) fn merge_pending_metadata(&mut self, fields: TransactionMetadata) {
        self.pending_metadata.extend(fields);
    }

    pub fn pending_metadata(&self) -> &TransactionMetadata {
        &self.pending_metadata
    }

    pub fn commit_depth(&self) -> usize {
        self.commit_depth
    }

    pub(crate) fn enter_batch(&mut self) {
        self.commit_depth += 1;
    }

    /// Leave a batch scope. Returns true when the outermost scope closed.
    pub(crate) fn exit_batch(&mut self) -> bool {
        self.commit_depth = self.commit_depth.saturating_sub(1);
        self.commit_depth == 0
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register `key` as a node of `kind`. Returns false if it was already
    /// registered as that kind.
    pub fn register(&mut self, key: NodeKey, kind: NodeKind) -> Result<bool> {
        match self.kind_of(&key) {
            Some(existing) if existing == kind => Ok(false),
            Some(existing) => Err(StoreError::NodeKindConflict { key, existing }),
            None => {
                match kind {
                    NodeKind::Atom => self.known_atoms.insert(key),
                    NodeKind::Selector => self.known_selectors.insert(key),
                };
                Ok(true)
            }
        }
    }

    pub fn kind_of(&self, key: &NodeKey) -> Option<NodeKind> {
        if self.known_atoms.contains(key) {
            Some(NodeKind::Atom)
        } else if self.known_selectors.contains(key) {
            Some(NodeKind::Selector)
        } else {
            None
        }
    }

    pub fn ensure_registered(&self, key: &NodeKey) -> Result<()> {
        match self.kind_of(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::UnregisteredNode { key: key.clone() }),
        }
    }

    pub fn known_atoms(&self) -> &HashSet<NodeKey> {
        &self.known_atoms
    }

    pub fn known_selectors(&self) -> &HashSet<NodeKey> {
        &self.known_selectors
    }

    // ------------------------------------------------------------------
    // Graphs
    // ------------------------------------------------------------------

    /// The graph installed for `version`.
    pub fn graph(&self, version: Version) -> Result<&Arc<DependencyGraph>> {
        self.graphs_by_version
            .get(&version)
            .ok_or(StoreError::GraphNotFound { version })
    }

    pub(crate) fn graph_mut(&mut self, version: Version) -> Result<&mut Arc<DependencyGraph>> {
        self.graphs_by_version
            .get_mut(&version)
            .ok_or(StoreError::GraphNotFound { version })
    }

    pub fn graphs_by_version(&self) -> &BTreeMap<Version, Arc<DependencyGraph>> {
        &self.graphs_by_version
    }

    /// Drop graphs no one needs any more. A version stays live while it is
    /// current or pending, among the `history` most recent committed
    /// versions, or still read by some component. Returns how many graphs
    /// were dropped.
    pub(crate) fn collect_graphs(&mut self, history: usize) -> usize {
        while self.committed_history.len() > history {
            self.committed_history.pop_front();
        }

        let mut live: HashSet<Version> = self.committed_history.iter().copied().collect();
        live.insert(self.current_tree.version());
        if let Some(next) = &self.next_tree {
            live.insert(next.version());
        }
        live.extend(self.versions_used_by_component.values().copied());

        let before = self.graphs_by_version.len();
        self.graphs_by_version.retain(|version, _| live.contains(version));
        before - self.graphs_by_version.len()
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    pub fn versions_used_by_component(&self) -> &HashMap<ComponentId, Version> {
        &self.versions_used_by_component
    }

    /// Record the version `component` last read. The version must be live.
    pub fn record_component_version(&mut self, component: ComponentId, version: Version) -> Result<()> {
        self.graph(version)?;
        self.versions_used_by_component.insert(component, version);
        Ok(())
    }

    /// Subscribe `component` to changes of `node`, replacing any earlier
    /// callback it registered for that node.
    pub fn subscribe_component(
        &mut self,
        node: NodeKey,
        component: ComponentId,
        callback: ComponentCallback,
    ) -> Result<()> {
        self.ensure_registered(&node)?;
        self.node_to_component_subscriptions
            .entry(node.clone())
            .or_default()
            .insert(component, callback);
        self.component_nodes.entry(component).or_default().insert(node);
        Ok(())
    }

    /// Remove one component subscription. Returns false if it was absent.
    pub fn unsubscribe_component(&mut self, node: &NodeKey, component: ComponentId) -> bool {
        let removed = match self.node_to_component_subscriptions.get_mut(node) {
            Some(components) => {
                let removed = components.shift_remove(&component).is_some();
                if components.is_empty() {
                    self.node_to_component_subscriptions.remove(node);
                }
                removed
            }
            None => false,
        };

        if let Some(nodes) = self.component_nodes.get_mut(&component) {
            nodes.shift_remove(node);
            if nodes.is_empty() {
                self.component_nodes.remove(&component);
            }
        }
        removed
    }

    /// True if `component` is subscribed to at least one node.
    pub fn is_subscribed(&self, component: ComponentId) -> bool {
        self.component_nodes.contains_key(&component)
    }

    /// True if `component` still holds its subscription to `node`.
    pub fn is_subscribed_to(&self, node: &NodeKey, component: ComponentId) -> bool {
        self.node_to_component_subscriptions
            .get(node)
            .is_some_and(|components| components.contains_key(&component))
    }

    /// Nodes `component` is subscribed to, in subscription order.
    pub fn component_nodes(&self, component: ComponentId) -> Vec<NodeKey> {
        self.component_nodes
            .get(&component)
            .map(|nodes| nodes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget everything about `component`: subscriptions, the version it
    /// read and any suspended reads. Queued callbacks stay queued and turn
    /// into no-ops at flush.
    pub(crate) fn remove_component(&mut self, component: ComponentId) {
        for node in self.component_nodes(component) {
            self.unsubscribe_component(&node, component);
        }
        self.versions_used_by_component.remove(&component);
        self.suspended_component_resolvers.drop_component(component);
    }

    /// Callbacks of every component subscribed to any of `nodes`, one per
    /// component, in first-seen order.
    pub fn component_callbacks_for<'a, I>(&self, nodes: I) -> Vec<QueuedCallback>
    where
        I: IntoIterator<Item = &'a NodeKey>,
    {
        let mut seen: IndexMap<ComponentId, QueuedCallback> = IndexMap::new();
        for node in nodes {
            if let Some(components) = self.node_to_component_subscriptions.get(node) {
                for (component, callback) in components {
                    seen.entry(*component).or_insert_with(|| QueuedCallback {
                        component: *component,
                        node: node.clone(),
                        callback: callback.clone(),
                    });
                }
            }
        }
        seen.into_values().collect()
    }

    pub(crate) fn enqueue_callbacks(&mut self, callbacks: Vec<QueuedCallback>, dedupe: bool) {
        for queued in callbacks {
            let fresh = self.queued_components.insert(queued.component);
            if dedupe && !fresh {
                continue;
            }
            self.queued_component_callbacks.push_back(queued);
        }
    }

    pub(crate) fn take_queued_callbacks(&mut self) -> Vec<QueuedCallback> {
        self.queued_components.clear();
        self.queued_component_callbacks.drain(..).collect()
    }

    pub fn queued_component_callbacks(&self) -> &VecDeque<QueuedCallback> {
        &self.queued_component_callbacks
    }

    // ------------------------------------------------------------------
    // Transaction subscriptions
    // ------------------------------------------------------------------

    pub(crate) fn add_transaction_subscription(&mut self, node: Option<NodeKey>, handler: Handler) -> SubscriptionId {
        let id = self.ids.next_subscription();
        match node {
            Some(node) => {
                self.node_transaction_subscriptions
                    .entry(node)
                    .or_default()
                    .insert(id, handler);
            }
            None => {
                self.transaction_subscriptions.insert(id, handler);
            }
        }
        id
    }

    pub(crate) fn remove_transaction_subscription(&mut self, id: SubscriptionId, node: Option<&NodeKey>) -> bool {
        match node {
            Some(node) => match self.node_transaction_subscriptions.get_mut(node) {
                Some(handlers) => {
                    let removed = handlers.shift_remove(&id).is_some();
                    if handlers.is_empty() {
                        self.node_transaction_subscriptions.remove(node);
                    }
                    removed
                }
                None => false,
            },
            None => self.transaction_subscriptions.shift_remove(&id).is_some(),
        }
    }

    /// Handlers to run for a commit that wrote `dirty`: the node-scoped ones
    /// (dirty nodes in key order) and the global ones.
    pub(crate) fn transaction_handlers_for(&self, dirty: &HashSet<NodeKey>) -> (Vec<Handler>, Vec<Handler>) {
        let mut nodes: Vec<&NodeKey> = dirty.iter().collect();
        nodes.sort();

        let scoped = nodes
            .into_iter()
            .filter_map(|node| self.node_transaction_subscriptions.get(node))
            .flat_map(|handlers| handlers.values().cloned())
            .collect();
        let global = self.transaction_subscriptions.values().cloned().collect();
        (scoped, global)
    }

    pub fn transaction_subscription_count(&self) -> usize {
        self.transaction_subscriptions.len()
            + self
                .node_transaction_subscriptions
                .values()
                .map(IndexMap::len)
                .sum::<usize>()
    }

    // ------------------------------------------------------------------
    // Suspended readers
    // ------------------------------------------------------------------

    pub fn suspended_component_resolvers(&self) -> &SuspendedResolvers {
        &self.suspended_component_resolvers
    }

    pub(crate) fn suspended_component_resolvers_mut(&mut self) -> &mut SuspendedResolvers {
        &mut self.suspended_component_resolvers
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Drop every subscription, queued callback and suspended reader, and
    /// every graph but the current version's.
    pub(crate) fn clear(&mut self) {
        self.next_tree = None;
        self.pending_metadata.clear();
        self.commit_depth = 0;
        self.versions_used_by_component.clear();
        self.node_to_component_subscriptions.clear();
        self.component_nodes.clear();
        self.transaction_subscriptions.clear();
        self.node_transaction_subscriptions.clear();
        self.queued_component_callbacks.clear();
        self.queued_components.clear();
        self.suspended_component_resolvers.clear();
        self.committed_history.clear();

        let current = self.current_tree.version();
        self.graphs_by_version.retain(|version, _| *version == current);
    }
}

impl fmt::Debug for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreState")
            .field("current", &self.current_tree.version())
            .field("next", &self.next_tree.as_ref().map(|tree| tree.version()))
            .field("known_atoms", &self.known_atoms.len())
            .field("known_selectors", &self.known_selectors.len())
            .field("graphs", &self.graphs_by_version.keys().collect::<Vec<_>>())
            .field("queued", &self.queued_component_callbacks.len())
            .field("suspended", &self.suspended_component_resolvers.len())
            .finish_non_exhaustive()
    }
}

impl Default for StoreState {
    fn default() -> Self {
        Self::empty()
    }
}
