//! Versioned copy-on-write model stores.
//!
//! The orchestrator is the only writer. Readers (workers, display code on
//! other threads) take an `Arc` snapshot and keep using it for as long as
//! they need, unaffected by later replacements.

use std::sync::Arc;

use parking_lot::RwLock;

/// A snapshot together with the version it was published as.
#[derive(Debug)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: Arc<T>,
}

impl<T> Clone for Versioned<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            value: Arc::clone(&self.value),
        }
    }
}

/// Holds the current version of a model.
#[derive(Debug)]
pub struct SnapshotStore<T> {
    current: RwLock<Versioned<T>>,
}

impl<T> SnapshotStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Versioned {
                version: 0,
                value: Arc::new(initial),
            }),
        }
    }

    /// The current value; cheap, never blocks on a writer for long.
    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&self.current.read().value)
    }

    pub fn versioned(&self) -> Versioned<T> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Publish a new value wholesale; returns its version.
    pub fn replace(&self, value: T) -> u64 {
        let mut current = self.current.write();
        current.version += 1;
        current.value = Arc::new(value);
        current.version
    }
}

impl<T: Default> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
