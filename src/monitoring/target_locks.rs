use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per tracked API, so a target never has two probes in flight.
#[derive(Debug, Default)]
pub struct TargetLocks {
    locks: DashMap<i32, Arc<Mutex<()>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, api_id: i32) -> Arc<Mutex<()>> {
        self.locks.entry(api_id).or_default().clone()
    }

    /// Returns `None` when a check for `api_id` is already running.
    pub fn try_acquire(&self, api_id: i32) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(api_id).try_lock_owned().ok()
    }

    pub async fn acquire(&self, api_id: i32) -> OwnedMutexGuard<()> {
        self.lock_for(api_id).lock_owned().await
    }

    /// Drops the entry for a deleted API. Holders of an existing guard keep it.
    pub fn forget(&self, api_id: i32) {
        self.locks.remove(&api_id);
    }

    /// Drops every entry nobody is holding or waiting on.
    pub fn prune_idle(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
