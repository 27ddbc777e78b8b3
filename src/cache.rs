//! One lazily-initialised slot per backend.
//!
//! The key space is closed (one entry per [`ModelKind`]), so there is no
//! eviction: each slot is filled at most once and then read lock-free.
//! Concurrent first callers for the same slot block until the single
//! initialiser finishes and then observe its value.

use crate::types::model::ModelKind;
use once_cell::sync::OnceCell;

pub struct PerModel<T> {
    tree_ensemble: OnceCell<T>,
    neural_net: OnceCell<T>,
}

impl<T> PerModel<T> {
    pub fn new() -> Self {
        Self {
            tree_ensemble: OnceCell::new(),
            neural_net: OnceCell::new(),
        }
    }

    fn slot(&self, kind: ModelKind) -> &OnceCell<T> {
        match kind {
            ModelKind::TreeEnsemble => &self.tree_ensemble,
            ModelKind::NeuralNet => &self.neural_net,
        }
    }

    /// Value for `kind`, running `init` only if the slot is empty.
    pub fn get_or_init<F: FnOnce() -> T>(&self, kind: ModelKind, init: F) -> &T {
        self.slot(kind).get_or_init(init)
    }

    /// Value for `kind` if it has been computed.
    pub fn get(&self, kind: ModelKind) -> Option<&T> {
        self.slot(kind).get()
    }
}

impl<T> Default for PerModel<T> {
    fn default() -> Self {
        Self::new()
    }
}
