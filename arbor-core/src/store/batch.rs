//! Batch scopes.
//!
//! Batches nest. Each scope bumps the root's commit depth on entry and
//! lowers it on exit; only the outermost exit commits. The guard lowers the
//! depth on drop as well, so a panicking batch body does not leave the root
//! stuck inside a batch.

use parking_lot::Mutex;

use crate::state::StoreState;

pub(crate) struct BatchScope<'a> {
    state: &'a Mutex<StoreState>,
    open: bool,
}

impl<'a> BatchScope<'a> {
    pub(crate) fn enter(state: &'a Mutex<StoreState>) -> Self {
        state.lock().enter_batch();
        Self { state, open: true }
    }

    /// Close the scope. Returns true if it was the outermost one.
    pub(crate) fn exit(mut self) -> bool {
        self.open = false;
        self.state.lock().exit_batch()
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        if self.open {
            self.state.lock().exit_batch();
        }
    }
}
