//! Per-key mutual exclusion with bounded waits.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BotconfError, Result};

/// Internal storage type for keyed locks: maps key to (lock, last_access_time).
type LockStorage<K> = DashMap<K, (Arc<Mutex<()>>, Instant)>;

/// Per-key async mutex.
///
/// Operations on different keys proceed concurrently while operations on the
/// same key serialize. Acquisition never waits longer than the given bound.
pub struct KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    name: &'static str,
    locks: Arc<LockStorage<K>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + Display,
{
    /// Create a new empty lock collection. `name` labels contention errors.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn get(&self, key: &K) -> Arc<Mutex<()>> {
        let now = Instant::now();
        self.locks
            .entry(key.clone())
            .and_modify(|(_, last_access)| *last_access = now)
            .or_insert_with(|| (Arc::new(Mutex::new(())), now))
            .0
            .clone()
    }

    /// Acquires the lock for `key`, or fails with `Contention` after `wait`.
    pub async fn acquire(&self, key: &K, wait: Duration) -> Result<OwnedMutexGuard<()>> {
        let lock = self.get(key);
        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                debug!(locks = self.name, key = %key, "Lock acquisition timed out");
                Err(BotconfError::contention(
                    format!("{} {}", self.name, key),
                    wait.as_millis() as u64,
                ))
            }
        }
    }

    /// Remove lock entries idle for longer than `max_age` that nobody holds.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let stale_keys: Vec<K> = self
            .locks
            .iter()
            .filter(|entry| {
                let (lock, last_access) = entry.value();
                Arc::strong_count(lock) == 1 && now.duration_since(*last_access) > max_age
            })
            .map(|entry| entry.key().clone())
            .collect();

        let count = stale_keys.len();
        for key in stale_keys {
            self.locks
                .remove_if(&key, |_, (lock, _)| Arc::strong_count(lock) == 1);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
