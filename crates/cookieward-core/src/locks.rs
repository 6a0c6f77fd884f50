//! Per-domain serialisation
//!
//! Every reconciliation pass and every admission check for a cookie holds
//! its domain's guard, so a restore and a fresh quarantine insert never
//! interleave on the same bucket.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct DomainLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl DomainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, domain: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(domain.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the guard for a domain nobody is waiting on
    pub fn forget(&self, domain: &str) {
        let mut locks = self.locks.lock();
        if locks
            .get(domain)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(domain);
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
