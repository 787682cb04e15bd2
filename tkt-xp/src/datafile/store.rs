//! Configuration Store
//!
//! Holds the current datafile as an immutable snapshot behind an `Arc`.
//! A swap replaces the reference; readers that already hold the previous
//! snapshot keep a complete, consistent copy. Nothing is mutated in place.

use super::Datafile;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Swappable holder of the current datafile snapshot
pub struct ConfigurationStore {
    current: RwLock<Arc<Datafile>>,
}

impl ConfigurationStore {
    /// Create a store seeded with `initial`
    pub fn new(initial: Datafile) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Store seeded with the bundled datafile
    pub fn with_bundled_default() -> Self {
        Self::new(Datafile::bundled())
    }

    /// Latest fully swapped snapshot
    ///
    /// The lock is held only long enough to clone the `Arc`.
    pub fn read(&self) -> Arc<Datafile> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Atomically replace the snapshot
    pub fn swap(&self, next: Datafile) {
        let next = Arc::new(next);
        let revision = next.revision.clone();
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, next)
        };
        info!(
            "Configuration swapped: revision {} -> {}",
            previous.revision, revision
        );
    }

    /// Revision of the current snapshot
    pub fn revision(&self) -> String {
        self.read().revision.clone()
    }
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::with_bundled_default()
    }
}
