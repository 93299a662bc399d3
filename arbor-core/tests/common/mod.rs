//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use arbor_core::{NodeKey, Store, TreeState};

/// Install a fmt subscriber once per test binary. `RUST_LOG` controls the
/// filter; the default keeps test output quiet.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn key(name: &str) -> NodeKey {
    NodeKey::new(name)
}

/// A store with `atoms` registered as atoms and `selectors` as selectors.
pub fn store_with(atoms: &[&str], selectors: &[&str]) -> Store {
    init_tracing();
    let store = Store::new();
    for atom in atoms {
        store.register_atom(*atom).unwrap();
    }
    for selector in selectors {
        store.register_selector(*selector).unwrap();
    }
    store
}

/// Callback that counts its invocations.
pub fn counting() -> (Arc<AtomicUsize>, impl Fn(&TreeState) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = count.clone();
    (count, move |_: &TreeState| {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

pub fn hits(count: &AtomicUsize) -> usize {
    count.load(Ordering::SeqCst)
}
