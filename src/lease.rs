//! Per-namespace mutual exclusion.
//!
//! Two concurrent runs against the same namespace would each diff against
//! the same previous state and race their mutations. Holding a lease for the
//! duration of a run serializes runs per namespace while letting different
//! namespaces proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the duration of one run; released on drop.
pub type NamespaceLease = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct NamespaceLeases {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NamespaceLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, namespace: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // drop entries nobody holds or waits on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait until `namespace` is free and take its lease.
    pub async fn acquire(&self, namespace: &str) -> NamespaceLease {
        self.lock_for(namespace).lock_owned().await
    }

    /// Take the lease only if no other run holds it.
    pub fn try_acquire(&self, namespace: &str) -> Option<NamespaceLease> {
        self.lock_for(namespace).try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_namespace_is_exclusive() {
        let leases = NamespaceLeases::new();
        let held = leases.acquire("a").await;
        assert!(leases.try_acquire("a").is_none());
        assert!(leases.try_acquire("b").is_some());
        drop(held);
        assert!(leases.try_acquire("a").is_some());
    }

    #[tokio::test]
    async fn test_waiter_gets_lease_after_release() {
        let leases = Arc::new(NamespaceLeases::new());
        let held = leases.acquire("a").await;

        let waiter = {
            let leases = leases.clone();
            tokio::spawn(async move {
                let _lease = leases.acquire("a").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
    }
}
