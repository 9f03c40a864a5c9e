//! Keyed advisory locks.
//!
//! Scoped exclusive access per entity id: one map serializes conversation
//! turns, another serializes ingestion runs per corpus. Unrelated keys
//! never contend; there is no global lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard for one key. Dropping it releases the key.
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct LockMap {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().expect("lock map poisoned");
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        self.entry(key).lock_owned().await
    }

    /// Take `key` if free, `None` if another holder is in flight.
    pub fn try_acquire(&self, key: &str) -> Option<KeyGuard> {
        self.entry(key).try_lock_owned().ok()
    }

    /// Drop entries nobody holds. Called after delete operations so the map
    /// does not grow with dead entity ids.
    pub fn remove(&self, key: &str) {
        let mut map = self.inner.lock().expect("lock map poisoned");
        if let Some(lock) = map.get(key) {
            // Arc count 1 means only the map references it.
            if Arc::strong_count(lock) == 1 {
                map.remove(key);
            }
        }
    }
}
