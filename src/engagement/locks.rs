// src/engagement/locks.rs

//! Per-pair locking.
//!
//! No two concurrent scheduler tasks may both decide to send for the same
//! user/character pair. Lock acquisition is try-only: a contended pair is
//! skipped for the current tick, not waited on.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
pub struct PairLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the lock for a pair key.
    pub async fn get_lock(&self, pair_key: &str) -> Arc<Mutex<()>> {
        // Fast path: check if lock exists
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(pair_key) {
                return lock.clone();
            }
        }

        // Slow path: create lock if needed
        let mut locks = self.locks.write().await;
        locks
            .entry(pair_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop lock entries nothing is holding. Called opportunistically from
    /// the cleanup task.
    pub async fn cleanup_unused(&self) {
        let mut locks = self.locks.write().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
