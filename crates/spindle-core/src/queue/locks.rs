//! Per-key locks.
//!
//! Each store key gets its own `RwLock<()>`. Mutating operations hold the
//! write half for their whole read-modify-write; `peek` / `queue_status` /
//! `read` share the read half. Different keys never contend.
//!
//! An entry lives only while some guard or waiter holds it; idle entries are
//! dropped the next time any lock is requested.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<RwLock<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|held, lock| held == key || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Exclusive access to `key`.
    pub async fn write(&self, key: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(key).write_owned().await
    }

    /// Shared access to `key`.
    pub async fn read(&self, key: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(key).read_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let _held = locks.write("a").await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.write("a")).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let _a = locks.write("a").await;

        let b = tokio::time::timeout(Duration::from_millis(50), locks.write("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_keys_are_pruned() {
        let locks = KeyedLocks::new();
        for key in ["a", "b", "c"] {
            drop(locks.write(key).await);
        }
        let _held = locks.read("d").await;
        assert_eq!(locks.len(), 1);

        let _other = locks.write("e").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn readers_share_but_exclude_writers() {
        let locks = KeyedLocks::new();
        let _r1 = locks.read("a").await;

        let r2 = tokio::time::timeout(Duration::from_millis(50), locks.read("a")).await;
        assert!(r2.is_ok());

        let w = tokio::time::timeout(Duration::from_millis(50), locks.write("a")).await;
        assert!(w.is_err());
    }
}
