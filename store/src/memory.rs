//! In-memory storage driver.
//!
//! Reference driver used for embedding without an external store and for
//! tests. State lives behind a `parking_lot::RwLock`; filters, orderings
//! and continuation predicates are evaluated over in-memory scans.
//!
//! Transactions are supported through an undo log: writes made through the
//! transaction handle apply immediately (the engine's per-account lock
//! keeps them invisible to well-behaved readers) and are reverted in
//! reverse order on rollback. A global async gate admits one transaction
//! at a time.

use std::cmp;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use ledgerkeep_common::{
    Account, AccountFilter, AccountId, CursorAnchor, Entry, EntryFilter, EntryId, EntryType,
    LedgerError, Ordering, Result, Timestamp,
};

use crate::driver::{StorageDriver, StorageTransaction};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    entries: HashMap<EntryId, Entry>,
}

impl MemoryState {
    fn insert_account(&mut self, account: Account) -> Result<()> {
        if self.accounts.values().any(|a| a.name == account.name) {
            return Err(LedgerError::DuplicateAccountName(account.name));
        }
        if self.accounts.contains_key(&account.id) {
            return Err(LedgerError::Storage(format!(
                "duplicate account id {}",
                account.id
            )));
        }
        self.accounts.insert(account.id, account);
        Ok(())
    }

    fn insert_entry(&mut self, entry: Entry) -> Result<()> {
        if self.entries.contains_key(&entry.id) {
            return Err(LedgerError::Storage(format!(
                "duplicate entry id {}",
                entry.id
            )));
        }
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    fn update_entry(&mut self, entry: Entry) -> Result<Entry> {
        match self.entries.get_mut(&entry.id) {
            Some(existing) => Ok(std::mem::replace(existing, entry)),
            None => Err(LedgerError::EntryNotFound(entry.id)),
        }
    }
}

/// Ordering comparison for entries, with the entry id as tie-breaker.
fn compare_entries(a: &Entry, b: &Entry, ordering: Ordering) -> cmp::Ordering {
    let key = if ordering.uses_amount() {
        a.amount.cmp(&b.amount).then(a.id.cmp(&b.id))
    } else {
        a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
    };
    if ordering.is_descending() {
        key.reverse()
    } else {
        key
    }
}

/// Ordering comparison for accounts (creation time only).
fn compare_accounts(a: &Account, b: &Account, ordering: Ordering) -> cmp::Ordering {
    let key = a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id));
    if ordering.is_descending() {
        key.reverse()
    } else {
        key
    }
}

/// Check whether an entry sits strictly past the continuation anchor in
/// the requested direction.
fn entry_past_anchor(entry: &Entry, anchor: &CursorAnchor, ordering: Ordering) -> bool {
    let key = if ordering.uses_amount() {
        entry
            .amount
            .cmp(&anchor.amount.unwrap_or_default())
            .then(entry.id.as_uuid().cmp(&anchor.id))
    } else {
        entry
            .created_at
            .cmp(&anchor.created_at)
            .then(entry.id.as_uuid().cmp(&anchor.id))
    };
    if ordering.is_descending() {
        key == cmp::Ordering::Less
    } else {
        key == cmp::Ordering::Greater
    }
}

/// Check whether an account sits strictly past the continuation anchor.
fn account_past_anchor(account: &Account, anchor: &CursorAnchor, ordering: Ordering) -> bool {
    let key = account
        .created_at
        .cmp(&anchor.created_at)
        .then(account.id.as_uuid().cmp(&anchor.id));
    if ordering.is_descending() {
        key == cmp::Ordering::Less
    } else {
        key == cmp::Ordering::Greater
    }
}

/// In-memory implementation of [`StorageDriver`].
pub struct MemoryDriver {
    state: Arc<RwLock<MemoryState>>,
    txn_gate: Arc<Mutex<()>>,
}

impl MemoryDriver {
    /// Create an empty in-memory driver.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            txn_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Number of stored accounts.
    pub fn account_count(&self) -> usize {
        self.state.read().accounts.len()
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> usize {
        self.state.read().entries.len()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn insert_account(&self, account: Account) -> Result<()> {
        self.state.write().insert_account(account)
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.state.read().accounts.get(&id).cloned())
    }

    async fn account_by_name(&self, name: &str) -> Result<Option<Account>> {
        Ok(self
            .state
            .read()
            .accounts
            .values()
            .find(|a| a.name == name)
            .cloned())
    }

    async fn account_name_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.read().accounts.values().any(|a| a.name == name))
    }

    async fn accounts_with_filter(
        &self,
        filter: &AccountFilter,
        ordering: Ordering,
        skip: u64,
        take: Option<usize>,
    ) -> Result<Vec<Account>> {
        let state = self.state.read();
        let mut rows: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| filter.matches(a))
            .filter(|a| {
                filter
                    .continue_after
                    .as_ref()
                    .map(|anchor| account_past_anchor(a, anchor, ordering))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_accounts(a, b, ordering));

        let rows = rows.into_iter().skip(skip as usize);
        Ok(match take {
            Some(take) => rows.take(take).collect(),
            None => rows.collect(),
        })
    }

    async fn count_accounts(&self, filter: &AccountFilter, ordering: Ordering) -> Result<u64> {
        let state = self.state.read();
        let count = state
            .accounts
            .values()
            .filter(|a| filter.matches(a))
            .filter(|a| {
                filter
                    .continue_after
                    .as_ref()
                    .map(|anchor| account_past_anchor(a, anchor, ordering))
                    .unwrap_or(true)
            })
            .count();
        Ok(count as u64)
    }

    async fn delete_account(&self, id: AccountId) -> Result<()> {
        self.state.write().accounts.remove(&id);
        Ok(())
    }

    async fn insert_entry(&self, entry: Entry) -> Result<()> {
        self.state.write().insert_entry(entry)
    }

    async fn insert_entries(&self, entries: Vec<Entry>) -> Result<()> {
        let mut state = self.state.write();
        for entry in entries {
            state.insert_entry(entry)?;
        }
        Ok(())
    }

    async fn entry_by_id(&self, id: EntryId) -> Result<Option<Entry>> {
        Ok(self.state.read().entries.get(&id).cloned())
    }

    async fn entries_by_account(&self, account_id: AccountId) -> Result<Vec<Entry>> {
        let state = self.state.read();
        let mut rows: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_entries(a, b, Ordering::CreatedAscending));
        Ok(rows)
    }

    async fn pending_entries(
        &self,
        account_id: AccountId,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<Entry>> {
        let state = self.state.read();
        let mut rows: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| e.account_id == account_id && e.is_pending())
            .filter(|e| entry_type.map(|t| e.entry_type == t).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_entries(a, b, Ordering::CreatedAscending));
        Ok(rows)
    }

    async fn latest_balance_entry(&self, account_id: AccountId) -> Result<Option<Entry>> {
        let state = self.state.read();
        Ok(state
            .entries
            .values()
            .filter(|e| e.account_id == account_id && e.entry_type == EntryType::Balance)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn balance_entry_as_of(
        &self,
        account_id: AccountId,
        as_of: Timestamp,
    ) -> Result<Option<Entry>> {
        let state = self.state.read();
        Ok(state
            .entries
            .values()
            .filter(|e| {
                e.account_id == account_id
                    && e.entry_type == EntryType::Balance
                    && e.created_at <= as_of
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn entries_with_filter(
        &self,
        filter: &EntryFilter,
        ordering: Ordering,
        skip: u64,
        take: Option<usize>,
    ) -> Result<Vec<Entry>> {
        let state = self.state.read();
        let mut rows: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| filter.matches(e))
            .filter(|e| {
                filter
                    .continue_after
                    .as_ref()
                    .map(|anchor| entry_past_anchor(e, anchor, ordering))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_entries(a, b, ordering));

        let rows = rows.into_iter().skip(skip as usize);
        Ok(match take {
            Some(take) => rows.take(take).collect(),
            None => rows.collect(),
        })
    }

    async fn count_entries(&self, filter: &EntryFilter, ordering: Ordering) -> Result<u64> {
        let state = self.state.read();
        let count = state
            .entries
            .values()
            .filter(|e| filter.matches(e))
            .filter(|e| {
                filter
                    .continue_after
                    .as_ref()
                    .map(|anchor| entry_past_anchor(e, anchor, ordering))
                    .unwrap_or(true)
            })
            .count();
        Ok(count as u64)
    }

    async fn update_entry(&self, entry: Entry) -> Result<()> {
        self.state.write().update_entry(entry)?;
        Ok(())
    }

    async fn update_entries(&self, entries: Vec<Entry>) -> Result<()> {
        let mut state = self.state.write();
        for entry in entries {
            state.update_entry(entry)?;
        }
        Ok(())
    }

    async fn delete_entry(&self, id: EntryId) -> Result<()> {
        self.state.write().entries.remove(&id);
        Ok(())
    }

    async fn delete_entries_by_account(&self, account_id: AccountId) -> Result<()> {
        self.state
            .write()
            .entries
            .retain(|_, e| e.account_id != account_id);
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Option<Box<dyn StorageTransaction>>> {
        let gate = self.txn_gate.clone().lock_owned().await;
        debug!("memory transaction started");
        Ok(Some(Box::new(MemoryTransaction {
            state: self.state.clone(),
            _gate: gate,
            undo: Vec::new(),
            committed: false,
        })))
    }
}

/// One recorded inverse operation.
enum UndoRecord {
    AccountInserted(AccountId),
    AccountDeleted(Account),
    EntryInserted(EntryId),
    EntryReplaced(Entry),
    EntryDeleted(Entry),
}

/// Undo-log transaction over the shared memory state.
///
/// Writes apply immediately; the gate guard keeps transactions serialized.
/// Dropping the handle uncommitted rolls it back.
struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    _gate: OwnedMutexGuard<()>,
    undo: Vec<UndoRecord>,
    committed: bool,
}

impl MemoryTransaction {
    fn apply_undo(&mut self) {
        let mut state = self.state.write();
        for record in self.undo.drain(..).rev() {
            match record {
                UndoRecord::AccountInserted(id) => {
                    state.accounts.remove(&id);
                }
                UndoRecord::AccountDeleted(account) => {
                    state.accounts.insert(account.id, account);
                }
                UndoRecord::EntryInserted(id) => {
                    state.entries.remove(&id);
                }
                UndoRecord::EntryReplaced(entry) | UndoRecord::EntryDeleted(entry) => {
                    state.entries.insert(entry.id, entry);
                }
            }
        }
    }
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    async fn insert_account(&mut self, account: Account) -> Result<()> {
        let id = account.id;
        self.state.write().insert_account(account)?;
        self.undo.push(UndoRecord::AccountInserted(id));
        Ok(())
    }

    async fn insert_entry(&mut self, entry: Entry) -> Result<()> {
        let id = entry.id;
        self.state.write().insert_entry(entry)?;
        self.undo.push(UndoRecord::EntryInserted(id));
        Ok(())
    }

    async fn insert_entries(&mut self, entries: Vec<Entry>) -> Result<()> {
        for entry in entries {
            self.insert_entry(entry).await?;
        }
        Ok(())
    }

    async fn update_entries(&mut self, entries: Vec<Entry>) -> Result<()> {
        for entry in entries {
            let previous = self.state.write().update_entry(entry)?;
            self.undo.push(UndoRecord::EntryReplaced(previous));
        }
        Ok(())
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<()> {
        if let Some(account) = self.state.write().accounts.remove(&id) {
            self.undo.push(UndoRecord::AccountDeleted(account));
        }
        Ok(())
    }

    async fn delete_entries_by_account(&mut self, account_id: AccountId) -> Result<()> {
        let mut state = self.state.write();
        let ids: Vec<EntryId> = state
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.id)
            .collect();
        for id in ids {
            if let Some(entry) = state.entries.remove(&id) {
                self.undo.push(UndoRecord::EntryDeleted(entry));
            }
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.committed = true;
        self.undo.clear();
        debug!("memory transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.apply_undo();
        self.committed = true;
        debug!("memory transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        // Drop without commit reverts, matching SQL transaction semantics.
        if !self.committed {
            self.apply_undo();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_account(name: &str) -> Account {
        Account::new(name, None)
    }

    #[tokio::test]
    async fn test_account_crud() {
        let driver = MemoryDriver::new();
        let account = test_account("operating");
        let id = account.id;

        driver.insert_account(account).await.unwrap();
        assert!(driver.account_by_id(id).await.unwrap().is_some());
        assert!(driver
            .account_by_name("operating")
            .await
            .unwrap()
            .is_some());
        assert!(driver.account_name_exists("operating").await.unwrap());

        driver.delete_account(id).await.unwrap();
        assert!(driver.account_by_id(id).await.unwrap().is_none());
        // Idempotent delete.
        driver.delete_account(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_account_name_rejected() {
        let driver = MemoryDriver::new();
        driver.insert_account(test_account("ops")).await.unwrap();

        let err = driver.insert_account(test_account("ops")).await.unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_ACCOUNT_NAME");
    }

    #[tokio::test]
    async fn test_latest_balance_entry() {
        let driver = MemoryDriver::new();
        let account_id = AccountId::new();

        let first = Entry::balance_snapshot(account_id, dec!(100), None);
        let second = Entry::balance_snapshot(account_id, dec!(150), Some(first.id));
        driver.insert_entry(first.clone()).await.unwrap();
        driver.insert_entry(second.clone()).await.unwrap();

        let latest = driver.latest_balance_entry(account_id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        let as_of = driver
            .balance_entry_as_of(account_id, first.created_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(as_of.id, first.id);
    }

    #[tokio::test]
    async fn test_pending_entries_excludes_committed() {
        let driver = MemoryDriver::new();
        let account_id = AccountId::new();

        let pending = Entry::credit(account_id, dec!(10), None);
        let mut committed = Entry::credit(account_id, dec!(20), None);
        committed.mark_committed(EntryId::new(), ledgerkeep_common::now());
        let snapshot = Entry::balance_snapshot(account_id, dec!(20), None);

        driver.insert_entry(pending.clone()).await.unwrap();
        driver.insert_entry(committed).await.unwrap();
        driver.insert_entry(snapshot).await.unwrap();

        let rows = driver.pending_entries(account_id, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, pending.id);

        let debits = driver
            .pending_entries(account_id, Some(EntryType::Debit))
            .await
            .unwrap();
        assert!(debits.is_empty());
    }

    #[tokio::test]
    async fn test_filter_order_and_offset() {
        let driver = MemoryDriver::new();
        let account_id = AccountId::new();

        for amount in [3u32, 1, 2] {
            driver
                .insert_entry(Entry::credit(account_id, amount.into(), None))
                .await
                .unwrap();
        }

        let filter = EntryFilter::for_account(account_id);
        let rows = driver
            .entries_with_filter(&filter, Ordering::AmountAscending, 0, None)
            .await
            .unwrap();
        let amounts: Vec<_> = rows.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![dec!(1), dec!(2), dec!(3)]);

        let rows = driver
            .entries_with_filter(&filter, Ordering::AmountDescending, 1, Some(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, dec!(2));

        assert_eq!(
            driver
                .count_entries(&filter, Ordering::CreatedAscending)
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_continuation_with_duplicate_amounts() {
        let driver = MemoryDriver::new();
        let account_id = AccountId::new();

        // Three entries sharing one amount: the id tie-breaker must keep
        // cursor pages gap-free.
        let mut ids = Vec::new();
        for _ in 0..3 {
            let entry = Entry::credit(account_id, dec!(5), None);
            ids.push(entry.id);
            driver.insert_entry(entry).await.unwrap();
        }
        ids.sort();

        let anchor = CursorAnchor {
            created_at: driver.entry_by_id(ids[0]).await.unwrap().unwrap().created_at,
            amount: Some(dec!(5)),
            id: *ids[0].as_uuid(),
        };
        let filter = EntryFilter {
            continue_after: Some(anchor),
            ..EntryFilter::for_account(account_id)
        };

        let rows = driver
            .entries_with_filter(&filter, Ordering::AmountAscending, 0, None)
            .await
            .unwrap();
        let got: Vec<_> = rows.iter().map(|e| e.id).collect();
        assert_eq!(got, vec![ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn test_transaction_commit_persists() {
        let driver = MemoryDriver::new();
        let account = test_account("txn");
        let id = account.id;

        let mut txn = driver.begin_transaction().await.unwrap().unwrap();
        txn.insert_account(account).await.unwrap();
        txn.insert_entry(Entry::balance_snapshot(id, dec!(0), None))
            .await
            .unwrap();
        txn.commit().await.unwrap();

        assert!(driver.account_by_id(id).await.unwrap().is_some());
        assert_eq!(driver.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_transaction_rollback_reverts() {
        let driver = MemoryDriver::new();
        let account_id = AccountId::new();
        let original = Entry::credit(account_id, dec!(10), None);
        driver.insert_entry(original.clone()).await.unwrap();

        let mut txn = driver.begin_transaction().await.unwrap().unwrap();
        let mut updated = original.clone();
        updated.mark_committed(EntryId::new(), ledgerkeep_common::now());
        txn.update_entries(vec![updated]).await.unwrap();
        txn.insert_entry(Entry::balance_snapshot(account_id, dec!(10), None))
            .await
            .unwrap();
        txn.rollback().await.unwrap();

        let entry = driver.entry_by_id(original.id).await.unwrap().unwrap();
        assert!(!entry.is_committed);
        assert_eq!(driver.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_transaction_drop_rolls_back() {
        let driver = MemoryDriver::new();
        let account = test_account("dropped");
        let id = account.id;

        {
            let mut txn = driver.begin_transaction().await.unwrap().unwrap();
            txn.insert_account(account).await.unwrap();
            // Dropped without commit.
        }

        assert!(driver.account_by_id(id).await.unwrap().is_none());
    }
}
