//! Property-based tests for transactions and graph maintenance
//!
//! Random sequences of writes, commits and metadata updates are replayed
//! against a store to check that versions only move forward, that handed-out
//! snapshots never change, and that incrementally derived graphs match a
//! graph rebuilt from scratch.

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arbor_core::graph::Dependencies;
use arbor_core::{DependencyGraph, Loadable, NodeKey, Store, TransactionMetadata, TreeState, Value, Version};
use common::{init_tracing, key};
use proptest::prelude::*;
use smallvec::smallvec;

// =============================================================================
// Helpers
// =============================================================================

const ATOMS: [&str; 4] = ["flag", "a", "b", "c"];
const SELECTORS: [&str; 3] = ["pick", "sum", "gate"];

#[derive(Debug, Clone)]
enum Op {
    Write { atom: usize, value: i64 },
    Toggle(bool),
    Commit,
    Metadata(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..ATOMS.len(), -20_i64..20).prop_map(|(atom, value)| Op::Write { atom, value }),
        2 => any::<bool>().prop_map(Op::Toggle),
        2 => Just(Op::Commit),
        1 => any::<u8>().prop_map(Op::Metadata),
    ]
}

fn int(tree: &TreeState, name: &str) -> i64 {
    tree.get(&key(name))
        .and_then(|loadable| loadable.value_as::<i64>().copied())
        .unwrap_or(0)
}

fn flag(tree: &TreeState) -> bool {
    tree.get(&key("flag"))
        .and_then(|loadable| loadable.value_as::<bool>().copied())
        .unwrap_or(false)
}

/// Selectors whose dependency sets depend on the values they read:
///
/// - `pick` reads `flag`, then `a` or `b`
/// - `sum` reads `pick` and `c`
/// - `gate` reads `a` and `sum`, plus `b` when `a` is odd
fn shifting(selector: &NodeKey, tree: &TreeState) -> Option<Dependencies> {
    match selector.as_str() {
        "pick" => {
            let branch = if flag(tree) { key("a") } else { key("b") };
            Some(smallvec![key("flag"), branch])
        }
        "sum" => Some(smallvec![key("pick"), key("c")]),
        "gate" => {
            if int(tree, "a") % 2 != 0 {
                Some(smallvec![key("a"), key("sum"), key("b")])
            } else {
                Some(smallvec![key("a"), key("sum")])
            }
        }
        _ => None,
    }
}

fn selectors() -> Vec<NodeKey> {
    SELECTORS.iter().map(|name| key(name)).collect()
}

/// A store whose initial graph is the from-scratch graph.
fn seeded_store() -> Store {
    init_tracing();
    let store = Store::with_source(shifting);
    for atom in ATOMS {
        store.register_atom(atom).unwrap();
    }
    for selector in SELECTORS {
        store.register_selector(selector).unwrap();
    }

    let tree = store.current_tree();
    for selector in selectors() {
        let deps = shifting(&selector, &tree).unwrap_or_default();
        store
            .save_dependencies(tree.version(), &selector, deps)
            .unwrap();
    }
    store
}

/// Owned copy of a snapshot's contents, detached from its shared storage.
#[derive(Debug, PartialEq)]
struct Frozen {
    version: Version,
    values: HashMap<NodeKey, Loadable>,
    dirty: HashSet<NodeKey>,
    nonvalidated: HashMap<NodeKey, Value>,
    metadata: TransactionMetadata,
}

impl Frozen {
    fn of(tree: &TreeState) -> Self {
        Self {
            version: tree.version(),
            values: tree.atom_values().clone(),
            dirty: tree.dirty_atoms().clone(),
            nonvalidated: tree.nonvalidated_atoms().clone(),
            metadata: tree.transaction_metadata().clone(),
        }
    }
}

fn apply(store: &Store, op: &Op) -> Option<Version> {
    match op {
        Op::Write { atom, value } => {
            let value = *value;
            Some(
                store
                    .replace_state(|tree| tree.set_value(key(ATOMS[*atom]), Value::new(value)))
                    .unwrap(),
            )
        }
        Op::Toggle(on) => {
            let on = *on;
            Some(
                store
                    .replace_state(|tree| tree.set_value(key("flag"), Value::new(on)))
                    .unwrap(),
            )
        }
        Op::Commit => store.commit().unwrap(),
        Op::Metadata(tag) => {
            let mut fields = TransactionMetadata::new();
            fields.insert("tag".into(), (*tag).into());
            store.add_transaction_metadata(fields).unwrap();
            None
        }
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_versions_strictly_increase(ops in prop::collection::vec(op(), 1..40)) {
        let store = seeded_store();
        let mut installed = vec![Version::from(0)];
        let mut committed = vec![store.current_tree().version()];

        for op in &ops {
            let before = store.latest_tree().version();
            apply(&store, op);
            let after = store.latest_tree().version();
            prop_assert!(after >= before);
            if after != *installed.last().unwrap() {
                installed.push(after);
            }

            let current = store.current_tree().version();
            if current != *committed.last().unwrap() {
                committed.push(current);
            }
        }

        prop_assert!(installed.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert!(committed.windows(2).all(|pair| pair[0] < pair[1]));
        let state = store.get_state();
        if let Some(next) = state.next_tree() {
            prop_assert!(next.version() > state.current_tree().version());
        }
    }

    #[test]
    fn prop_snapshots_never_change(ops in prop::collection::vec(op(), 1..40)) {
        let store = seeded_store();
        let mut held: Vec<(Arc<TreeState>, Frozen)> = Vec::new();

        for op in &ops {
            apply(&store, op);
            for tree in [store.current_tree(), store.latest_tree()] {
                let frozen = Frozen::of(&tree);
                held.push((tree, frozen));
            }
        }

        for (tree, frozen) in &held {
            prop_assert_eq!(&Frozen::of(tree), frozen);
        }
    }

    #[test]
    fn prop_incremental_graph_matches_scratch(ops in prop::collection::vec(op(), 1..40)) {
        let store = seeded_store();
        let selectors = selectors();

        for op in &ops {
            apply(&store, op);

            let tree = store.latest_tree();
            let incremental = store.get_graph(tree.version()).unwrap();
            let scratch = DependencyGraph::from_scratch(&selectors, &tree, &shifting);
            prop_assert_eq!(incremental.edges(), scratch.edges());
        }
    }
}

#[test]
fn committed_snapshot_survives_later_writes() {
    let store = seeded_store();
    store
        .replace_state(|tree| tree.set_value(key("a"), Value::new(1_i64)))
        .unwrap();
    store.commit().unwrap();
    let held = store.current_tree();

    store
        .replace_state(|tree| tree.set_value(key("a"), Value::new(2_i64)))
        .unwrap();
    store.commit().unwrap();

    assert_eq!(int(&held, "a"), 1);
    assert_eq!(int(&store.current_tree(), "a"), 2);
}
