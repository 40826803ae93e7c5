//! A table of per-key mutual-exclusion locks that cleans up after itself.
//!
//! The dispatcher uses this to make sure two reconciliations for the same object UID never run
//! concurrently, without paying for one mutex per UID forever: an entry only exists while at
//! least one task is holding or waiting on it.

use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct Entry {
    mutex: Arc<Mutex<()>>,
    waiters: AtomicUsize,
}

/// A concurrent map from key to mutual-exclusion lock.
///
/// # Invariants
///
/// - At most one [`UidLockGuard`] is held for a given key at any time.
/// - A key with no live guard and no task waiting on it is removed from the table; the next
///   [`lock`](Self::lock) or [`try_lock`](Self::try_lock) for that key creates a fresh entry.
pub struct UidLockTable<U: Eq + Hash + Clone> {
    entries: DashMap<U, Arc<Entry>>,
}

impl<U: Eq + Hash + Clone> Default for UidLockTable<U> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<U: Eq + Hash + Clone> UidLockTable<U> {
    /// An empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_insert(&self, key: &U) -> Arc<Entry> {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Entry {
                    mutex: Arc::new(Mutex::new(())),
                    waiters: AtomicUsize::new(0),
                })
            })
            .clone();
        entry.waiters.fetch_add(1, Ordering::AcqRel);
        entry
    }

    fn release_interest(&self, key: &U, entry: &Arc<Entry>) {
        if entry.waiters.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.entries
                .remove_if(key, |_, v| v.waiters.load(Ordering::Acquire) == 0);
        }
    }

    /// Acquires the lock for `key`, waiting for any in-flight holder to finish first.
    pub async fn lock(self: &Arc<Self>, key: U) -> UidLockGuard<U> {
        let entry = self.get_or_insert(&key);
        let guard = entry.mutex.clone().lock_owned().await;
        UidLockGuard {
            table: self.clone(),
            key,
            entry,
            guard: Some(guard),
        }
    }

    /// Attempts to acquire the lock for `key` without waiting.
    ///
    /// Returns `None` if another guard for this key is currently held.
    pub fn try_lock(self: &Arc<Self>, key: U) -> Option<UidLockGuard<U>> {
        let entry = self.get_or_insert(&key);
        match entry.mutex.clone().try_lock_owned() {
            Ok(guard) => Some(UidLockGuard {
                table: self.clone(),
                key,
                entry,
                guard: Some(guard),
            }),
            Err(_) => {
                self.release_interest(&key, &entry);
                None
            }
        }
    }
}

/// A held slot in a [`UidLockTable`]. Releases the lock, and removes the table entry if nothing
/// else is waiting on it, when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct UidLockGuard<U: Eq + Hash + Clone> {
    table: Arc<UidLockTable<U>>,
    key: U,
    entry: Arc<Entry>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<U: Eq + Hash + Clone> Drop for UidLockGuard<U> {
    fn drop(&mut self) {
        // Drop the mutex guard before releasing our "interest" in the entry, so a waiter that
        // wakes up due to `release_interest`'s table cleanup never sees a still-locked mutex.
        self.guard.take();
        self.table.release_interest(&self.key, &self.entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_locks_for_the_same_key_do_not_deadlock() {
        let table = Arc::new(UidLockTable::<String>::new());
        let guard = table.lock("a".to_owned()).await;
        drop(guard);
        let _guard = table.lock("a".to_owned()).await;
    }

    #[tokio::test]
    async fn try_lock_fails_while_another_guard_is_held() {
        let table = Arc::new(UidLockTable::<String>::new());
        let _guard = table.try_lock("a".to_owned()).unwrap();
        assert!(table.try_lock("a".to_owned()).is_none());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let table = Arc::new(UidLockTable::<String>::new());
        let _a = table.try_lock("a".to_owned()).unwrap();
        let _b = table.try_lock("b".to_owned()).unwrap();
    }

    #[tokio::test]
    async fn entry_is_removed_once_idle() {
        let table = Arc::new(UidLockTable::<String>::new());
        let guard = table.try_lock("a".to_owned()).unwrap();
        drop(guard);
        assert_eq!(table.entries.len(), 0);
    }

    #[tokio::test]
    async fn releasing_one_guard_lets_a_waiting_lock_through() {
        let table = Arc::new(UidLockTable::<String>::new());
        let guard = table.lock("a".to_owned()).await;
        let table2 = table.clone();
        let waiter = tokio::spawn(async move {
            let _g = table2.lock("a".to_owned()).await;
        });
        tokio::task::yield_now().await;
        drop(guard);
        waiter.await.unwrap();
    }
}
