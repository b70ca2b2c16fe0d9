//! Per-file read/write locks.
//!
//! One `RwLock` per live file, keyed by name. WRITE holds a file's lock in
//! write mode, READ in read mode. Lock entries are created at CREATE (and for
//! every file found at load), removed at DELETE, so the map never outgrows the
//! inode table.
//!
//! Ordering discipline: a per-file lock is always acquired BEFORE the global
//! table lock, and a holder of the global lock never acquires a per-file
//! lock. The map's own mutex is a leaf: held only inside these methods, never
//! across another acquisition.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A single file's read/write lock.
pub type FileLock = Arc<RwLock<()>>;

/// The per-file lock map.
#[derive(Debug, Default)]
pub struct LockManager {
    files: Mutex<HashMap<String, FileLock>>,
}

impl LockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The named file's lock, if the file is live.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<FileLock> {
        self.files.lock().get(name).map(Arc::clone)
    }

    /// Ensure a lock entry exists for `name` (CREATE and load paths).
    ///
    /// Call sites mutate the map only while holding the global table lock in
    /// write mode.
    pub fn create(&self, name: &str) {
        self.files
            .lock()
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(RwLock::new(())));
    }

    /// Ensure a lock exists for `name` and return it.
    ///
    /// Call sites mutate the map only while holding the global table lock in
    /// write mode (CREATE, and WRITE's lazy-creation path).
    #[must_use]
    pub fn get_or_create(&self, name: &str) -> FileLock {
        Arc::clone(
            self.files
                .lock()
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(RwLock::new(()))),
        )
    }

    /// Drop the named file's lock entry (DELETE path).
    pub fn remove(&self, name: &str) {
        self.files.lock().remove(name);
    }

    /// Number of live lock entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_remove_bounds_the_map() {
        let locks = LockManager::new();
        assert!(locks.get("a").is_none());

        let a = locks.get_or_create("a");
        let again = locks.get_or_create("a");
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(locks.len(), 1);

        locks.remove("a");
        assert!(locks.get("a").is_none());
        assert!(locks.is_empty());
    }

    #[test]
    fn removed_lock_still_usable_by_existing_holders() {
        let locks = LockManager::new();
        let a = locks.get_or_create("a");
        locks.remove("a");
        // The Arc keeps the lock alive for anyone who fetched it earlier.
        let guard = a.read();
        drop(guard);
    }
}
