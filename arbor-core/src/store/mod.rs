//! Store
//!
//! The store is the capability surface of one root. It wraps the root's
//! [`StoreState`] and drives the transaction protocol:
//!
//! ```text
//! Idle --replace_state--> Pending --commit--> Idle
//! ```
//!
//! # How It Works
//!
//! 1. `replace_state` applies a pure transform to the latest snapshot (the
//!    pending one if a transaction is in flight), stamps the result with a
//!    fresh version, derives that version's graph from its predecessor and
//!    installs it as the pending snapshot.
//!
//! 2. `commit` promotes the pending snapshot to current in one step, then
//!    notifies node-scoped observers, components downstream of the dirty
//!    nodes, global observers, flushes queued component callbacks and wakes
//!    suspended readers that can now proceed.
//!
//! 3. A commit made while another commit is still notifying is promoted
//!    right away, but its notifications wait until the earlier commit has
//!    finished delivering.
//!
//! # Locking
//!
//! Mutation is expected from one logical thread at a time. The state sits
//! behind a mutex so the store can be shared, but no callback ever runs
//! while the mutex is held: callbacks are collected first, the lock is
//! released, then they are invoked. Callbacks may therefore call back into
//! the store. Dependency sources run with the lock held and must not.

mod batch;
mod delivery;
mod subscription;

pub use subscription::{ComponentSubscription, TransactionSubscription};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, debug_span, info};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::graph::{derive_graph, DependencyGraph, DependencySource, GraphUpdate, NodeKey, NodeKind, RetainDependencies};
use crate::state::{
    ComponentCallback, ComponentId, Handler, Loadable, StoreState, TransactionMetadata, TreeState, Version, Wakeup,
};
use batch::BatchScope;
use delivery::{Delivery, DeliveryQueue, Drain};

/// When `fire_node_subscriptions` delivers notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Queue the callbacks for the next flush.
    Enqueue,

    /// Invoke the callbacks before returning.
    Now,
}

/// What produced a new snapshot; decides where graph maintenance starts.
enum Origin {
    Writes,
    Resolution(NodeKey),
    Metadata,
}

/// Handle to one root. Cheap to clone; clones share the same root.
#[derive(Clone)]
pub struct Store {
    state: Arc<Mutex<StoreState>>,
    source: Arc<dyn DependencySource>,
    config: Arc<StoreConfig>,
    deliveries: Arc<Mutex<DeliveryQueue>>,
}

impl Store {
    /// Create a root with default configuration whose graph edges change
    /// only through `save_dependencies`.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default(), RetainDependencies)
    }

    /// Create a root whose graph maintenance asks `source` for selector
    /// dependencies.
    pub fn with_source<S>(source: S) -> Self
    where
        S: DependencySource + 'static,
    {
        Self::with_config(StoreConfig::default(), source)
    }

    pub fn with_config<S>(config: StoreConfig, source: S) -> Self
    where
        S: DependencySource + 'static,
    {
        Self::from_state(StoreState::empty(), config, source)
    }

    /// Wrap an existing store state.
    pub fn from_state<S>(state: StoreState, config: StoreConfig, source: S) -> Self
    where
        S: DependencySource + 'static,
    {
        debug!(root = config.span_label(), version = %state.current_tree().version(), "root created");
        Self {
            state: Arc::new(Mutex::new(state)),
            source: Arc::new(source),
            config: Arc::new(config),
            deliveries: Arc::default(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The live state container, locked.
    ///
    /// Not a copy: changes go straight to the root. Drop the guard before
    /// calling any other store method.
    pub fn get_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock()
    }

    /// The committed snapshot.
    pub fn current_tree(&self) -> Arc<TreeState> {
        Arc::clone(self.state.lock().current_tree())
    }

    /// The pending snapshot if there is one, otherwise the committed one.
    pub fn latest_tree(&self) -> Arc<TreeState> {
        Arc::clone(self.state.lock().latest_tree())
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_atom(&self, key: impl Into<NodeKey>) -> Result<bool> {
        self.state.lock().register(key.into(), NodeKind::Atom)
    }

    pub fn register_selector(&self, key: impl Into<NodeKey>) -> Result<bool> {
        self.state.lock().register(key.into(), NodeKind::Selector)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Apply `update` to the latest snapshot and install the result as the
    /// pending snapshot under a fresh version.
    ///
    /// The transform receives the pending snapshot when a transaction is in
    /// flight, so successive calls chain. It must return a tree derived
    /// from the one it was given; returning a tree built from any other
    /// snapshot fails with `ConcurrentTransactionViolation`. Returning the
    /// given tree unchanged installs nothing and yields the latest version.
    pub fn replace_state<F>(&self, update: F) -> Result<Version>
    where
        F: FnOnce(&TreeState) -> TreeState,
    {
        self.apply(update, Origin::Writes)
    }

    fn apply<F>(&self, update: F, origin: Origin) -> Result<Version>
    where
        F: FnOnce(&TreeState) -> TreeState,
    {
        let _span = debug_span!("replace_state", root = self.config.span_label()).entered();

        let (base, base_pending) = {
            let state = self.state.lock();
            (state.transaction_base(), state.next_tree().is_some())
        };
        let base_version = base.version();

        // The lock is released while the transform runs.
        let candidate = update(&base);
        if candidate.version() != base_version || !candidate.same_transaction(&base) {
            return Err(StoreError::ConcurrentTransactionViolation {
                expected: base_version,
                found: candidate.version(),
            });
        }

        let mut state = self.state.lock();

        // Something else was installed or committed while the transform ran.
        let still_latest = match state.next_tree() {
            Some(next) => base_pending && next.version() == base_version,
            None => !base_pending && state.current_tree().version() == base_version,
        };
        if !still_latest {
            return Err(StoreError::ConcurrentTransactionViolation {
                expected: state.latest_tree().version(),
                found: base_version,
            });
        }

        if candidate.shares_storage(&base) {
            return Ok(state.latest_tree().version());
        }

        for key in candidate.dirty_atoms() {
            state.ensure_registered(key)?;
        }

        let version = state.ids().next_version();
        let candidate = candidate.stamped(version);
        let prior = Arc::clone(state.graph(base_version)?);

        let no_writes: HashSet<NodeKey> = HashSet::new();
        let graph_update = match &origin {
            Origin::Writes => GraphUpdate::Writes(candidate.dirty_atoms()),
            Origin::Resolution(selector) => GraphUpdate::Resolution(selector),
            Origin::Metadata => GraphUpdate::Writes(&no_writes),
        };
        let derived = derive_graph(&prior, graph_update, &candidate, self.source.as_ref());

        for node in &derived.reevaluated {
            state.ensure_registered(node)?;
            if let Some(deps) = derived.graph.dependencies(node) {
                for dep in deps {
                    state.ensure_registered(dep)?;
                }
            }
        }

        let dirty = candidate.dirty_atoms().len();
        state.install_next(candidate, derived.graph)?;
        debug!(
            %version,
            base = %base_version,
            dirty,
            reevaluated = derived.reevaluated.len(),
            "installed pending snapshot"
        );
        Ok(version)
    }

    /// Merge `fields` into the metadata of the in-flight transaction, or of
    /// the next one to start if none is in flight.
    pub fn add_transaction_metadata(&self, fields: TransactionMetadata) -> Result<()> {
        let pending = self.state.lock().next_tree().is_some();
        if pending {
            self.apply(|tree| tree.with_metadata(fields), Origin::Metadata)?;
        } else {
            self.state.lock().merge_pending_metadata(fields);
        }
        Ok(())
    }

    /// Promote the pending snapshot and deliver notifications. Returns the
    /// committed version, or `None` if nothing was pending.
    ///
    /// Called from inside a callback of an earlier commit, the snapshot is
    /// promoted before returning but notified only after the earlier
    /// commit's delivery completes.
    pub fn commit(&self) -> Result<Option<Version>> {
        let _span = debug_span!("commit", root = self.config.span_label()).entered();

        let Some(delivery) = self.promote()? else {
            return Ok(None);
        };
        let version = delivery.tree.version();

        match Drain::push(&self.deliveries, delivery) {
            Some(drain) => {
                for delivery in drain {
                    self.deliver(delivery);
                }
            }
            None => debug!(%version, "delivery queued behind a commit in progress"),
        }
        Ok(Some(version))
    }

    fn promote(&self) -> Result<Option<Delivery>> {
        let mut state = self.state.lock();
        let Some(version) = state.next_tree().map(|tree| tree.version()) else {
            return Ok(None);
        };
        let graph = Arc::clone(state.graph(version)?);
        let Some(tree) = state.promote_next() else {
            return Ok(None);
        };

        let mut roots: Vec<&NodeKey> = tree.dirty_atoms().iter().collect();
        roots.sort();
        let downstream = graph.downstream(roots);

        let components = state.component_callbacks_for(&downstream);
        let (scoped, global) = state.transaction_handlers_for(tree.dirty_atoms());

        let affected: HashSet<&NodeKey> = downstream.iter().collect();
        let resolvers = state
            .suspended_component_resolvers_mut()
            .take_where(|resolver| affected.contains(resolver.node()) && !tree.is_loading(resolver.node()));

        let dropped = state.collect_graphs(self.config.graph_history);
        debug!(
            %version,
            downstream = downstream.len(),
            components = components.len(),
            graphs_dropped = dropped,
            "committed"
        );
        Ok(Some(Delivery {
            tree,
            scoped,
            components,
            global,
            resolvers,
        }))
    }

    fn deliver(&self, delivery: Delivery) {
        let Delivery {
            tree,
            scoped,
            components,
            global,
            resolvers,
        } = delivery;

        for handler in &scoped {
            handler(&tree);
        }
        for queued in &components {
            queued.callback.notify(&tree);
        }
        for handler in &global {
            handler(&tree);
        }
        self.flush_queued_callbacks();

        let version = tree.version();
        for resolver in resolvers {
            let component = resolver.component();
            if !resolver.fulfill(version) {
                debug!(%component, "suspended reader stopped waiting");
            }
        }
    }

    /// Run `f`, committing once when the outermost batch closes.
    pub fn batch<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        let scope = BatchScope::enter(&self.state);
        let result = f();
        if scope.exit() {
            self.commit()?;
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Graphs
    // ------------------------------------------------------------------

    /// The dependency graph for a live version.
    pub fn get_graph(&self, version: Version) -> Result<Arc<DependencyGraph>> {
        self.state.lock().graph(version).map(Arc::clone)
    }

    /// Record the dependencies `selector` read while evaluating against
    /// `version`. Only the newest version's graph accepts new edges; older
    /// graphs are finalized.
    pub fn save_dependencies<I>(&self, version: Version, selector: &NodeKey, deps: I) -> Result<()>
    where
        I: IntoIterator<Item = NodeKey>,
    {
        let deps: Vec<NodeKey> = deps.into_iter().collect();
        let mut state = self.state.lock();

        state.ensure_registered(selector)?;
        for dep in &deps {
            state.ensure_registered(dep)?;
        }

        let latest = state.latest_tree().version();
        if version != latest {
            state.graph(version)?;
            return Err(StoreError::GraphFinalized { version });
        }

        let graph = state.graph_mut(version)?;
        // Readers holding the previous `Arc` keep their copy.
        if Arc::make_mut(graph).set_dependencies(selector, deps) {
            tracing::trace!(%selector, %version, "recorded dependencies");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Call `callback` on every future commit, or only on commits that
    /// wrote `node` when one is given.
    pub fn subscribe_to_transactions<F>(&self, callback: F, node: Option<NodeKey>) -> TransactionSubscription
    where
        F: Fn(&TreeState) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(callback);
        let id = self
            .state
            .lock()
            .add_transaction_subscription(node.clone(), handler);
        TransactionSubscription::new(Arc::downgrade(&self.state), id, node)
    }

    pub fn allocate_component_id(&self) -> ComponentId {
        self.state.lock().ids().next_component()
    }

    /// Subscribe `component` to changes of `node`.
    pub fn subscribe_component<F>(
        &self,
        component: ComponentId,
        node: NodeKey,
        label: &str,
        callback: F,
    ) -> Result<ComponentSubscription>
    where
        F: Fn(&TreeState) + Send + Sync + 'static,
    {
        let callback = ComponentCallback::new(label, callback);
        self.state
            .lock()
            .subscribe_component(node.clone(), component, callback)?;
        Ok(ComponentSubscription::new(Arc::downgrade(&self.state), component, node))
    }

    /// Record the version `component` rendered from, keeping that version's
    /// graph alive.
    pub fn record_component_version(&self, component: ComponentId, version: Version) -> Result<()> {
        self.state.lock().record_component_version(component, version)
    }

    /// Forget `component`: its subscriptions, recorded version and
    /// suspended reads. Callbacks already queued for it become no-ops.
    pub fn unmount_component(&self, component: ComponentId) {
        self.state.lock().remove_component(component);
        debug!(%component, "component unmounted");
    }

    /// Notify every component subscribed to any of `updated`, once per
    /// component.
    pub fn fire_node_subscriptions<'a, I>(&self, updated: I, mode: NotifyMode)
    where
        I: IntoIterator<Item = &'a NodeKey>,
    {
        let (tree, callbacks) = {
            let mut state = self.state.lock();
            let callbacks = state.component_callbacks_for(updated);
            if mode == NotifyMode::Enqueue {
                state.enqueue_callbacks(callbacks, self.config.dedupe_queued_callbacks);
                return;
            }
            (Arc::clone(state.latest_tree()), callbacks)
        };

        for queued in &callbacks {
            queued.callback.notify(&tree);
        }
    }

    /// Invoke queued component callbacks in enqueue order. Returns how many
    /// ran; callbacks whose subscription was released meanwhile are skipped.
    pub fn flush_queued_callbacks(&self) -> usize {
        let (tree, queued) = {
            let mut state = self.state.lock();
            (Arc::clone(state.latest_tree()), state.take_queued_callbacks())
        };

        let mut invoked = 0;
        for entry in queued {
            if !self.state.lock().is_subscribed_to(&entry.node, entry.component) {
                let stale = StoreError::StaleComponentSubscription {
                    component: entry.component,
                };
                debug!(label = entry.callback.label(), "{stale}, skipping queued callback");
                continue;
            }
            entry.callback.notify(&tree);
            invoked += 1;
        }
        invoked
    }

    // ------------------------------------------------------------------
    // Suspension
    // ------------------------------------------------------------------

    /// Suspend `component` until `node` stops loading in the committed
    /// snapshot. If it is not loading now, the wakeup is already resolved.
    pub fn suspend(&self, component: ComponentId, node: NodeKey) -> Result<Wakeup> {
        let mut state = self.state.lock();
        state.ensure_registered(&node)?;

        let current = state.current_tree();
        if !current.is_loading(&node) {
            return Ok(Wakeup::ready(current.version()));
        }

        debug!(%component, %node, "reader suspended");
        Ok(state.suspended_component_resolvers_mut().suspend(component, node))
    }

    /// Install the outcome of an asynchronous selector computation and
    /// commit it. Readers suspended on the selector, or on anything
    /// downstream of it, are woken by the commit.
    ///
    /// Any other writes pending at the time commit along with it. Inside a
    /// batch the commit is left to the outermost batch exit.
    pub fn resolve_selector(&self, selector: &NodeKey, loadable: Loadable) -> Result<Version> {
        let key = selector.clone();
        let installed = self.apply(move |tree| tree.set(key, loadable), Origin::Resolution(selector.clone()))?;
        if self.state.lock().commit_depth() > 0 {
            return Ok(installed);
        }
        match self.commit()? {
            Some(version) => Ok(version),
            None => Ok(self.current_tree().version()),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Dispose of the root's bookkeeping. Pending writes are discarded and
    /// suspended readers observe cancellation.
    pub fn teardown(&self) {
        let suspended = {
            let mut state = self.state.lock();
            let suspended = state.suspended_component_resolvers().len();
            state.clear();
            suspended
        };
        let undelivered = self.deliveries.lock().clear();
        info!(root = self.config.span_label(), suspended, undelivered, "root torn down");
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("undelivered", &self.deliveries.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use smallvec::smallvec;

    use crate::graph::Dependencies;
    use crate::state::{LoadingId, Value};

    fn key(name: &str) -> NodeKey {
        NodeKey::new(name)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&TreeState) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let clone = count.clone();
        (count, move |_: &TreeState| {
            clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn store_with_atoms(atoms: &[&str]) -> Store {
        let store = Store::new();
        for atom in atoms {
            store.register_atom(*atom).unwrap();
        }
        store
    }

    #[test]
    fn replace_installs_pending_snapshot() {
        let store = store_with_atoms(&["x"]);

        let version = store
            .replace_state(|tree| tree.set_value(key("x"), Value::new(1)))
            .unwrap();

        let state = store.get_state();
        assert_eq!(state.current_tree().version(), Version::from(0));
        assert_eq!(state.next_tree().map(|t| t.version()), Some(version));
        assert!(version > Version::from(0));
        assert!(state.graph(version).is_ok());
    }

    #[test]
    fn unchanged_transform_installs_nothing() {
        let store = store_with_atoms(&["x"]);
        let version = store.replace_state(|tree| tree.clone()).unwrap();

        assert_eq!(version, Version::from(0));
        assert!(store.get_state().next_tree().is_none());
    }

    #[test]
    fn writing_unregistered_node_fails() {
        let store = Store::new();
        let err = store
            .replace_state(|tree| tree.set_value(key("ghost"), Value::new(0)))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnregisteredNode { .. }));
    }

    #[test]
    fn stale_transform_is_rejected() {
        let store = store_with_atoms(&["x", "y"]);
        let stale = store.current_tree();

        store
            .replace_state(|tree| tree.set_value(key("x"), Value::new(1)))
            .unwrap();
        let err = store
            .replace_state(|_| stale.set_value(key("y"), Value::new(2)))
            .unwrap_err();

        assert!(matches!(err, StoreError::ConcurrentTransactionViolation { .. }));
    }

    #[test]
    fn reentrant_transaction_inside_transform_is_detected() {
        let store = store_with_atoms(&["x", "y"]);
        let inner = store.clone();

        let err = store
            .replace_state(|tree| {
                inner
                    .replace_state(|t| t.set_value(key("y"), Value::new(2)))
                    .unwrap();
                tree.set_value(key("x"), Value::new(1))
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::ConcurrentTransactionViolation { .. }));
    }

    #[test]
    fn commit_promotes_and_notifies() {
        let store = store_with_atoms(&["x", "y"]);
        let component = store.allocate_component_id();
        let (hits, callback) = counter();
        let _sub = store
            .subscribe_component(component, key("x"), "View", callback)
            .unwrap();

        store
            .replace_state(|tree| tree.set_value(key("y"), Value::new(1)))
            .unwrap();
        store.commit().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let version = store
            .replace_state(|tree| tree.set_value(key("x"), Value::new(1)))
            .unwrap();
        assert_eq!(store.commit().unwrap(), Some(version));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.current_tree().version(), version);
        assert!(store.get_state().next_tree().is_none());
    }

    #[test]
    fn commit_without_pending_is_noop() {
        let store = Store::new();
        assert_eq!(store.commit().unwrap(), None);
    }

    #[test]
    fn commit_notifies_components_downstream_of_writes() {
        let store = store_with_atoms(&["a"]);
        store.register_selector("s").unwrap();
        store.save_dependencies(Version::from(0), &key("s"), [key("a")]).unwrap();

        let component = store.allocate_component_id();
        let (hits, callback) = counter();
        store
            .subscribe_component(component, key("s"), "Derived", callback)
            .unwrap();

        store
            .replace_state(|tree| tree.set_value(key("a"), Value::new(3)))
            .unwrap();
        store.commit().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn metadata_before_transaction_lands_in_it() {
        let store = store_with_atoms(&["x"]);
        let mut fields = TransactionMetadata::new();
        fields.insert("origin".into(), "undo".into());
        store.add_transaction_metadata(fields).unwrap();

        store
            .replace_state(|tree| tree.set_value(key("x"), Value::new(1)))
            .unwrap();
        let pending = store.latest_tree();
        assert_eq!(pending.transaction_metadata()["origin"], "undo");
        assert!(store.get_state().pending_metadata().is_empty());
    }

    #[test]
    fn metadata_during_transaction_creates_new_version() {
        let store = store_with_atoms(&["x"]);
        let first = store
            .replace_state(|tree| tree.set_value(key("x"), Value::new(1)))
            .unwrap();

        let mut fields = TransactionMetadata::new();
        fields.insert("batch".into(), 7.into());
        store.add_transaction_metadata(fields).unwrap();

        let pending = store.latest_tree();
        assert!(pending.version() > first);
        assert_eq!(pending.transaction_metadata()["batch"], 7);
        assert!(pending.dirty_atoms().contains(&key("x")));

        store.commit().unwrap();
        assert_eq!(store.current_tree().transaction_metadata()["batch"], 7);
    }

    #[test]
    fn save_dependencies_rejects_old_versions() {
        let store = store_with_atoms(&["a"]);
        store.register_selector("s").unwrap();
        store
            .replace_state(|tree| tree.set_value(key("a"), Value::new(1)))
            .unwrap();

        let err = store
            .save_dependencies(Version::from(0), &key("s"), [key("a")])
            .unwrap_err();
        assert!(matches!(err, StoreError::GraphFinalized { .. }));
    }

    #[test]
    fn save_dependencies_leaves_held_graphs_alone() {
        let store = store_with_atoms(&["a"]);
        store.register_selector("s").unwrap();
        let held = store.get_graph(Version::from(0)).unwrap();

        store.save_dependencies(Version::from(0), &key("s"), [key("a")]).unwrap();

        assert!(held.is_empty());
        assert_eq!(store.get_graph(Version::from(0)).unwrap().edge_count(), 1);
    }

    #[test]
    fn source_rederives_on_write() {
        let source = |selector: &NodeKey, tree: &TreeState| -> Option<Dependencies> {
            (selector.as_str() == "pick").then(|| {
                let wide = tree
                    .get(&key("mode"))
                    .and_then(|l| l.value_as::<bool>().copied())
                    .unwrap_or(false);
                if wide {
                    smallvec![key("mode"), key("a"), key("b")]
                } else {
                    smallvec![key("mode"), key("a")]
                }
            })
        };
        let store = Store::with_source(source);
        for atom in ["mode", "a", "b"] {
            store.register_atom(atom).unwrap();
        }
        store.register_selector("pick").unwrap();
        store
            .save_dependencies(Version::from(0), &key("pick"), [key("mode"), key("a")])
            .unwrap();

        let version = store
            .replace_state(|tree| tree.set_value(key("mode"), Value::new(true)))
            .unwrap();

        let graph = store.get_graph(version).unwrap();
        assert!(graph.dependencies(&key("pick")).unwrap().contains(&key("b")));
        let original = store.get_graph(Version::from(0)).unwrap();
        assert!(!original.dependencies(&key("pick")).unwrap().contains(&key("b")));
    }

    #[test]
    fn graphs_for_unused_versions_are_collected() {
        let store = store_with_atoms(&["x"]);
        let mut versions = Vec::new();
        for n in 0..3 {
            versions.push(
                store
                    .replace_state(|tree| tree.set_value(key("x"), Value::new(n)))
                    .unwrap(),
            );
            store.commit().unwrap();
        }

        assert!(matches!(
            store.get_graph(Version::from(0)),
            Err(StoreError::GraphNotFound { .. })
        ));
        assert!(store.get_graph(versions[1]).is_ok());
        assert!(store.get_graph(versions[2]).is_ok());
    }

    #[test]
    fn component_version_keeps_graph_alive() {
        let store = store_with_atoms(&["x"]);
        let component = store.allocate_component_id();
        store.record_component_version(component, Version::from(0)).unwrap();

        for n in 0..3 {
            store
                .replace_state(|tree| tree.set_value(key("x"), Value::new(n)))
                .unwrap();
            store.commit().unwrap();
        }
        assert!(store.get_graph(Version::from(0)).is_ok());

        store.unmount_component(component);
        store
            .replace_state(|tree| tree.set_value(key("x"), Value::new(9)))
            .unwrap();
        store.commit().unwrap();
        assert!(store.get_graph(Version::from(0)).is_err());
    }

    #[test]
    fn batch_commits_once_at_outermost_exit() {
        let store = store_with_atoms(&["x", "y"]);
        let (commits, callback) = counter();
        let _sub = store.subscribe_to_transactions(callback, None);

        store
            .batch(|| {
                store
                    .replace_state(|tree| tree.set_value(key("x"), Value::new(1)))
                    .unwrap();
                store
                    .batch(|| {
                        store
                            .replace_state(|tree| tree.set_value(key("y"), Value::new(2)))
                            .unwrap();
                    })
                    .unwrap();
                assert!(store.get_state().next_tree().is_some());
            })
            .unwrap();

        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert!(store.get_state().next_tree().is_none());
    }

    #[test]
    fn suspend_on_ready_value_resolves_immediately() {
        let store = store_with_atoms(&["x"]);
        let component = store.allocate_component_id();
        let mut wakeup = store.suspend(component, key("x")).unwrap();
        assert_eq!(wakeup.try_take(), Some(Version::from(0)));
        assert!(store.get_state().suspended_component_resolvers().is_empty());
    }

    #[test]
    fn unmount_cancels_suspended_reads() {
        let store = Store::new();
        store.register_selector("s").unwrap();
        store
            .replace_state(|tree| tree.set(key("s"), Loadable::Loading(LoadingId::from(1))))
            .unwrap();
        store.commit().unwrap();

        let component = store.allocate_component_id();
        let mut wakeup = store.suspend(component, key("s")).unwrap();
        store.unmount_component(component);

        assert!(store.get_state().suspended_component_resolvers().is_empty());
        assert_eq!(wakeup.try_take(), None);
    }

    #[test]
    fn teardown_clears_bookkeeping() {
        let store = store_with_atoms(&["x"]);
        let component = store.allocate_component_id();
        let (hits, callback) = counter();
        store
            .subscribe_component(component, key("x"), "View", callback)
            .unwrap();
        store
            .replace_state(|tree| tree.set_value(key("x"), Value::new(1)))
            .unwrap();

        store.teardown();

        let state = store.get_state();
        assert!(state.next_tree().is_none());
        assert!(!state.is_subscribed(component));
        assert_eq!(state.graphs_by_version().len(), 1);
        drop(state);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
