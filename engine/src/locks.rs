//! Per-account lock registry.
//!
//! All mutating operations against one account are serialized by an
//! exclusive, asynchronously-acquirable lock. Locks are created lazily on
//! first use and never removed; distinct accounts never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use ledgerkeep_common::AccountId;

/// A held account lock. Dropping the guard releases the lock, so release
/// happens on every exit path, including error paths.
pub type AccountLockGuard = OwnedMutexGuard<()>;

/// Concurrent map from account id to its exclusive lock.
pub struct AccountLockRegistry {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the exclusive lock for an account, waiting (without
    /// blocking the worker thread) until it is free.
    pub async fn acquire(&self, account_id: AccountId) -> AccountLockGuard {
        let lock = self
            .locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        trace!(account_id = %account_id, "waiting for account lock");
        let guard = lock.lock_owned().await;
        trace!(account_id = %account_id, "account lock acquired");
        guard
    }

    /// Number of accounts with a registered lock. The registry never
    /// shrinks; see the design notes.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Check if no locks have been registered yet.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for AccountLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
