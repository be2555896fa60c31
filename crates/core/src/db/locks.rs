use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::db::StoreError;

/// One mutex per key, created on first use and dropped once idle.
///
/// Writers for the same artifact id run one at a time; different ids never
/// wait on each other beyond the brief registry lookup.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<T, E>(&self, key: &str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned("keyed lock registry"))?;
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        let result = {
            let _guard = lock.lock().map_err(|_| StoreError::Poisoned("artifact write lock"))?;
            f()
        };
        if let Ok(mut locks) = self.locks.lock() {
            // Clones are only taken under the registry lock, so a count of two
            // (registry and this call) means nobody else holds or waits on it.
            if Arc::strong_count(&lock) == 2 {
                locks.remove(key);
            }
        }
        result
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
