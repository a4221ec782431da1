//! Core ledger engine implementation.
//!
//! The engine owns the mutation path for accounts and entries: every
//! mutating operation acquires the account's exclusive lock, performs its
//! reads and writes through the storage driver, and publishes its
//! notification event only after the lock is released. Multi-step
//! mutations are wrapped in a storage transaction when the driver
//! provides one.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use ledgerkeep_common::{
    now, Account, AccountFilter, AccountId, Balance, Entry, EntryFilter, EntryId, EntryType,
    LedgerError, Ordering, Page, PageQuery, PendingSummary, Result,
};
use ledgerkeep_store::{MemoryDriver, StorageDriver, StorageTransaction};

use crate::enumerate;
use crate::events::{EventDispatcher, LedgerEvent};
use crate::locks::AccountLockRegistry;

/// Options for adding a single credit or debit entry.
#[derive(Debug, Clone, Default)]
pub struct AddEntryOptions {
    /// Free-form description.
    pub description: Option<String>,
    /// Create the entry already committed against this existing Balance
    /// entry (history import). Mutually exclusive with
    /// `commit_immediately`.
    pub summarized_by: Option<EntryId>,
    /// Run the commit protocol for this one entry before the account lock
    /// is released.
    pub commit_immediately: bool,
}

/// One entry in a batch add request.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    /// Amount (non-negative).
    pub amount: Decimal,
    /// Free-form description.
    pub description: Option<String>,
}

impl EntryRequest {
    /// Create a request.
    pub fn new(amount: Decimal, description: Option<String>) -> Self {
        Self {
            amount,
            description,
        }
    }
}

/// Write path that uses a storage transaction when the driver provides
/// one and falls back to direct driver writes otherwise (the documented
/// weaker partial-failure guarantee).
enum WriteScope {
    Txn(Box<dyn StorageTransaction>),
    Direct(Arc<dyn StorageDriver>),
}

impl WriteScope {
    async fn open(driver: &Arc<dyn StorageDriver>) -> Result<Self> {
        Ok(match driver.begin_transaction().await? {
            Some(txn) => WriteScope::Txn(txn),
            None => WriteScope::Direct(driver.clone()),
        })
    }

    async fn insert_account(&mut self, account: Account) -> Result<()> {
        match self {
            WriteScope::Txn(txn) => txn.insert_account(account).await,
            WriteScope::Direct(driver) => driver.insert_account(account).await,
        }
    }

    async fn insert_entry(&mut self, entry: Entry) -> Result<()> {
        match self {
            WriteScope::Txn(txn) => txn.insert_entry(entry).await,
            WriteScope::Direct(driver) => driver.insert_entry(entry).await,
        }
    }

    async fn update_entries(&mut self, entries: Vec<Entry>) -> Result<()> {
        match self {
            WriteScope::Txn(txn) => txn.update_entries(entries).await,
            WriteScope::Direct(driver) => driver.update_entries(entries).await,
        }
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<()> {
        match self {
            WriteScope::Txn(txn) => txn.delete_account(id).await,
            WriteScope::Direct(driver) => driver.delete_account(id).await,
        }
    }

    async fn delete_entries_by_account(&mut self, account_id: AccountId) -> Result<()> {
        match self {
            WriteScope::Txn(txn) => txn.delete_entries_by_account(account_id).await,
            WriteScope::Direct(driver) => driver.delete_entries_by_account(account_id).await,
        }
    }

    async fn commit(self) -> Result<()> {
        match self {
            WriteScope::Txn(txn) => txn.commit().await,
            WriteScope::Direct(_) => Ok(()),
        }
    }

    async fn rollback(self) -> Result<()> {
        match self {
            WriteScope::Txn(txn) => txn.rollback().await,
            WriteScope::Direct(_) => Ok(()),
        }
    }
}

/// The ledger engine.
pub struct LedgerEngine {
    driver: Arc<dyn StorageDriver>,
    locks: AccountLockRegistry,
    events: EventDispatcher,
}

impl LedgerEngine {
    /// Create an engine over the given storage driver.
    pub fn new(driver: Arc<dyn StorageDriver>) -> Self {
        Self {
            driver,
            locks: AccountLockRegistry::new(),
            events: EventDispatcher::new(),
        }
    }

    /// Create an engine over a fresh in-memory driver.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDriver::new()))
    }

    /// Register a notification subscriber. Delivery is best-effort; see
    /// [`crate::events`].
    pub fn subscribe(&self) -> tokio::sync::mpsc::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    // --- account lifecycle ---

    /// Create an account with an initial committed balance (zero when not
    /// given). The account and its initial Balance entry are written in
    /// one storage transaction.
    #[instrument(skip(self, notes))]
    pub async fn create_account(
        &self,
        name: &str,
        notes: Option<String>,
        initial_balance: Option<Decimal>,
    ) -> Result<Account> {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "account name must be non-empty".to_string(),
            ));
        }
        let initial = initial_balance.unwrap_or(Decimal::ZERO);
        if initial < Decimal::ZERO {
            return Err(LedgerError::InvalidArgument(
                "initial balance must be non-negative".to_string(),
            ));
        }
        if self.driver.account_name_exists(name).await? {
            return Err(LedgerError::DuplicateAccountName(name.to_string()));
        }

        let account = Account::new(name, notes);
        let guard = self.locks.acquire(account.id).await;

        let mut scope = WriteScope::open(&self.driver).await?;
        let write = async {
            scope.insert_account(account.clone()).await?;
            scope
                .insert_entry(Entry::balance_snapshot(account.id, initial, None))
                .await?;
            Ok::<(), LedgerError>(())
        }
        .await;
        if let Err(e) = write {
            let _ = scope.rollback().await;
            return Err(e);
        }
        scope.commit().await?;
        drop(guard);

        info!(account_id = %account.id, name = %account.name, "Account created");
        self.events.publish(LedgerEvent::AccountCreated(account.clone()));
        Ok(account)
    }

    /// Read an account by id.
    pub async fn get_account_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        self.driver.account_by_id(id).await
    }

    /// Read an account by name.
    pub async fn get_account_by_name(&self, name: &str) -> Result<Option<Account>> {
        self.driver.account_by_name(name).await
    }

    /// Delete an account and all its entries. Deleting a missing account
    /// is a no-op, matching idempotent-delete semantics throughout.
    #[instrument(skip(self))]
    pub async fn delete_account_by_id(&self, id: AccountId) -> Result<()> {
        let guard = self.locks.acquire(id).await;
        // Re-read under the lock; the account may have been deleted while
        // we were waiting.
        let Some(account) = self.driver.account_by_id(id).await? else {
            return Ok(());
        };

        let mut scope = WriteScope::open(&self.driver).await?;
        let write = async {
            scope.delete_entries_by_account(id).await?;
            scope.delete_account(id).await?;
            Ok::<(), LedgerError>(())
        }
        .await;
        if let Err(e) = write {
            let _ = scope.rollback().await;
            return Err(e);
        }
        scope.commit().await?;
        drop(guard);

        info!(account_id = %id, "Account deleted");
        self.events.publish(LedgerEvent::AccountDeleted(account));
        Ok(())
    }

    /// Delete an account by name. Missing name is a no-op.
    pub async fn delete_account_by_name(&self, name: &str) -> Result<()> {
        match self.driver.account_by_name(name).await? {
            Some(account) => self.delete_account_by_id(account.id).await,
            None => Ok(()),
        }
    }

    // --- entry creation / cancellation ---

    /// Add a credit entry.
    pub async fn add_credit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        options: AddEntryOptions,
    ) -> Result<EntryId> {
        self.add_entry(account_id, EntryType::Credit, amount, options)
            .await
    }

    /// Add a debit entry.
    pub async fn add_debit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        options: AddEntryOptions,
    ) -> Result<EntryId> {
        self.add_entry(account_id, EntryType::Debit, amount, options)
            .await
    }

    /// Add several credit entries under one lock acquisition.
    pub async fn add_credits(
        &self,
        account_id: AccountId,
        requests: Vec<EntryRequest>,
    ) -> Result<Vec<EntryId>> {
        self.add_entries(account_id, EntryType::Credit, requests)
            .await
    }

    /// Add several debit entries under one lock acquisition.
    pub async fn add_debits(
        &self,
        account_id: AccountId,
        requests: Vec<EntryRequest>,
    ) -> Result<Vec<EntryId>> {
        self.add_entries(account_id, EntryType::Debit, requests)
            .await
    }

    #[instrument(skip(self, options))]
    async fn add_entry(
        &self,
        account_id: AccountId,
        entry_type: EntryType,
        amount: Decimal,
        options: AddEntryOptions,
    ) -> Result<EntryId> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidArgument(
                "amount must be non-negative".to_string(),
            ));
        }
        if options.summarized_by.is_some() && options.commit_immediately {
            return Err(LedgerError::InvalidArgument(
                "commit_immediately cannot be combined with summarized_by".to_string(),
            ));
        }

        let guard = self.locks.acquire(account_id).await;
        let account = self
            .driver
            .account_by_id(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let mut entry = match entry_type {
            EntryType::Credit => Entry::credit(account_id, amount, options.description),
            EntryType::Debit => Entry::debit(account_id, amount, options.description),
            EntryType::Balance => {
                return Err(LedgerError::InvalidArgument(
                    "balance entries are produced by the commit protocol".to_string(),
                ))
            }
        };

        if let Some(summary_id) = options.summarized_by {
            let summary = self
                .driver
                .entry_by_id(summary_id)
                .await?
                .filter(|e| e.account_id == account_id)
                .ok_or(LedgerError::EntryNotFound(summary_id))?;
            if summary.entry_type != EntryType::Balance {
                return Err(LedgerError::InvalidState(format!(
                    "summarized_by must reference a balance entry, got {summary_id}"
                )));
            }
            entry.mark_committed(summary_id, now());
        }

        let entry_id = entry.id;
        self.driver.insert_entry(entry.clone()).await?;

        let committed = if options.commit_immediately {
            Some(self.commit_locked(account_id, Some(vec![entry_id])).await?)
        } else {
            None
        };
        drop(guard);

        debug!(account_id = %account_id, entry_id = %entry_id, ?entry_type, %amount, "Entry added");
        self.events.publish(match entry_type {
            EntryType::Credit => LedgerEvent::CreditAdded {
                account: account.clone(),
                entry: entry.clone(),
            },
            _ => LedgerEvent::DebitAdded {
                account: account.clone(),
                entry: entry.clone(),
            },
        });
        if let Some((before, after)) = committed {
            self.events.publish(LedgerEvent::EntriesCommitted {
                account,
                balance_before: before,
                balance_after: after,
            });
        }
        Ok(entry_id)
    }

    #[instrument(skip(self, requests))]
    async fn add_entries(
        &self,
        account_id: AccountId,
        entry_type: EntryType,
        requests: Vec<EntryRequest>,
    ) -> Result<Vec<EntryId>> {
        // All amounts are validated before any write.
        if let Some(bad) = requests.iter().find(|r| r.amount < Decimal::ZERO) {
            return Err(LedgerError::InvalidArgument(format!(
                "amount must be non-negative, got {}",
                bad.amount
            )));
        }

        let guard = self.locks.acquire(account_id).await;
        let account = self
            .driver
            .account_by_id(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let mut entries = Vec::with_capacity(requests.len());
        for request in requests {
            let entry = match entry_type {
                EntryType::Debit => Entry::debit(account_id, request.amount, request.description),
                _ => Entry::credit(account_id, request.amount, request.description),
            };
            // Each insert is individually atomic; the batch is not one
            // storage transaction.
            self.driver.insert_entry(entry.clone()).await?;
            entries.push(entry);
        }
        drop(guard);

        info!(account_id = %account_id, count = entries.len(), ?entry_type, "Batch entries added");
        let ids = entries.iter().map(|e| e.id).collect();
        for entry in entries {
            self.events.publish(match entry_type {
                EntryType::Credit => LedgerEvent::CreditAdded {
                    account: account.clone(),
                    entry,
                },
                _ => LedgerEvent::DebitAdded {
                    account: account.clone(),
                    entry,
                },
            });
        }
        Ok(ids)
    }

    /// Cancel a pending entry.
    #[instrument(skip(self))]
    pub async fn cancel_pending(&self, account_id: AccountId, entry_id: EntryId) -> Result<()> {
        let guard = self.locks.acquire(account_id).await;
        let account = self
            .driver
            .account_by_id(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let entry = self
            .driver
            .entry_by_id(entry_id)
            .await?
            .filter(|e| e.account_id == account_id)
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        if entry.is_committed {
            return Err(LedgerError::InvalidState(format!(
                "entry {entry_id} is already committed"
            )));
        }

        self.driver.delete_entry(entry_id).await?;
        drop(guard);

        info!(account_id = %account_id, entry_id = %entry_id, "Pending entry canceled");
        self.events
            .publish(LedgerEvent::EntryCanceled { account, entry });
        Ok(())
    }

    // --- balance queries ---

    /// Compute the account's balance. Always takes the account lock;
    /// the commit protocol uses the unlocked variant internally while
    /// already holding it.
    pub async fn get_balance(&self, account_id: AccountId, include_pending: bool) -> Result<Balance> {
        let _guard = self.locks.acquire(account_id).await;
        if self.driver.account_by_id(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        self.balance_unlocked(account_id, include_pending).await
    }

    /// Committed balance as of `as_of`: the amount of the latest Balance
    /// entry created at or before that instant, or zero if none exists.
    /// A Balance entry is a complete snapshot, so no replay is needed.
    pub async fn get_balance_as_of(
        &self,
        account_id: AccountId,
        as_of: ledgerkeep_common::Timestamp,
    ) -> Result<Decimal> {
        if self.driver.account_by_id(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        Ok(self
            .driver
            .balance_entry_as_of(account_id, as_of)
            .await?
            .map(|e| e.amount)
            .unwrap_or(Decimal::ZERO))
    }

    async fn balance_unlocked(
        &self,
        account_id: AccountId,
        include_pending: bool,
    ) -> Result<Balance> {
        let latest = self.driver.latest_balance_entry(account_id).await?;
        let committed = latest.as_ref().map(|e| e.amount).unwrap_or(Decimal::ZERO);
        let balance = Balance::committed_only(account_id, latest.map(|e| e.id), committed);
        if !include_pending {
            return Ok(balance);
        }

        let pending = self.driver.pending_entries(account_id, None).await?;
        let (credits, debits): (Vec<Entry>, Vec<Entry>) = pending
            .into_iter()
            .partition(|e| e.entry_type == EntryType::Credit);
        Ok(balance.with_pending(
            PendingSummary::from_entries(credits),
            PendingSummary::from_entries(debits),
        ))
    }

    // --- commit protocol ---

    /// Fold pending entries into a new committed balance snapshot.
    ///
    /// With `entry_ids = None` every pending Credit/Debit entry is
    /// eligible. With an explicit list, every id must resolve to a pending
    /// entry of this account; validation is all-or-nothing and happens
    /// before any write. Committing with nothing eligible is a legal
    /// no-op returning the unchanged balance.
    #[instrument(skip(self, entry_ids))]
    pub async fn commit_entries(
        &self,
        account_id: AccountId,
        entry_ids: Option<Vec<EntryId>>,
    ) -> Result<Balance> {
        let guard = self.locks.acquire(account_id).await;
        let account = self
            .driver
            .account_by_id(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let (before, after) = self.commit_locked(account_id, entry_ids).await?;
        drop(guard);

        if !after.committed_entry_ids.is_empty() {
            self.events.publish(LedgerEvent::EntriesCommitted {
                account,
                balance_before: before,
                balance_after: after.clone(),
            });
        }
        Ok(after)
    }

    /// The commit protocol proper. Caller must hold the account lock.
    async fn commit_locked(
        &self,
        account_id: AccountId,
        entry_ids: Option<Vec<EntryId>>,
    ) -> Result<(Balance, Balance)> {
        let before = self.balance_unlocked(account_id, true).await?;
        let old_snapshot = self.driver.latest_balance_entry(account_id).await?;

        // Resolve the eligible set; all-or-nothing validation, no writes
        // yet.
        let eligible: Vec<Entry> = match entry_ids {
            Some(ids) => {
                let mut seen = HashSet::new();
                let mut resolved = Vec::with_capacity(ids.len());
                for id in ids {
                    if !seen.insert(id) {
                        continue;
                    }
                    let entry = self
                        .driver
                        .entry_by_id(id)
                        .await?
                        .filter(|e| e.account_id == account_id)
                        .ok_or(LedgerError::EntryNotFound(id))?;
                    if !entry.entry_type.is_transactional() {
                        return Err(LedgerError::InvalidState(format!(
                            "entry {id} is a balance snapshot and cannot be committed"
                        )));
                    }
                    if entry.is_committed || entry.committed_at.is_some() {
                        return Err(LedgerError::InvalidState(format!(
                            "entry {id} is already committed"
                        )));
                    }
                    resolved.push(entry);
                }
                resolved
            }
            None => self.driver.pending_entries(account_id, None).await?,
        };

        if eligible.is_empty() {
            debug!(account_id = %account_id, "Commit with nothing eligible is a no-op");
            return Ok((before.clone(), before));
        }

        let credit_total: Decimal = eligible
            .iter()
            .filter(|e| e.entry_type == EntryType::Credit)
            .map(|e| e.amount)
            .sum();
        let debit_total: Decimal = eligible
            .iter()
            .filter(|e| e.entry_type == EntryType::Debit)
            .map(|e| e.amount)
            .sum();
        let new_amount = before.committed_balance + credit_total - debit_total;

        let snapshot = Entry::balance_snapshot(
            account_id,
            new_amount,
            old_snapshot.as_ref().map(|e| e.id),
        );
        let committed_at = snapshot.created_at;
        let committed_ids: Vec<EntryId> = eligible.iter().map(|e| e.id).collect();
        let marked: Vec<Entry> = eligible
            .into_iter()
            .map(|mut e| {
                e.mark_committed(snapshot.id, committed_at);
                e
            })
            .collect();

        let mut scope = WriteScope::open(&self.driver).await?;
        let write = async {
            scope.update_entries(marked).await?;
            scope.insert_entry(snapshot.clone()).await?;
            Ok::<(), LedgerError>(())
        }
        .await;
        if let Err(e) = write {
            let _ = scope.rollback().await;
            return Err(e);
        }
        scope.commit().await?;

        let mut after = self.balance_unlocked(account_id, true).await?;
        after.committed_entry_ids = committed_ids;
        info!(
            account_id = %account_id,
            snapshot_id = %snapshot.id,
            committed = after.committed_entry_ids.len(),
            old_balance = %before.committed_balance,
            new_balance = %after.committed_balance,
            "Entries committed"
        );
        Ok((before, after))
    }

    // --- integrity ---

    /// Walk the Balance-entry chain from the latest snapshot following
    /// `replaces` pointers. Returns false on a cycle or a broken link.
    /// This does not re-verify the snapshot arithmetic.
    #[instrument(skip(self))]
    pub async fn verify_balance_chain(&self, account_id: AccountId) -> Result<bool> {
        if self.driver.account_by_id(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id));
        }

        let mut visited = HashSet::new();
        let mut current = self.driver.latest_balance_entry(account_id).await?;
        while let Some(entry) = current {
            if !visited.insert(entry.id) {
                debug!(account_id = %account_id, entry_id = %entry.id, "Balance chain cycle detected");
                return Ok(false);
            }
            match entry.replaces {
                None => return Ok(true),
                Some(prev_id) => {
                    let prev = self.driver.entry_by_id(prev_id).await?;
                    match prev {
                        Some(prev) if prev.entry_type == EntryType::Balance => {
                            current = Some(prev);
                        }
                        _ => {
                            debug!(account_id = %account_id, entry_id = %prev_id, "Balance chain link broken");
                            return Ok(false);
                        }
                    }
                }
            }
        }
        // No Balance entry at all: trivially acyclic.
        Ok(true)
    }

    // --- enumeration ---

    /// List accounts under a filter, ordering and page query.
    pub async fn list_accounts(
        &self,
        filter: &AccountFilter,
        ordering: Ordering,
        query: &PageQuery,
    ) -> Result<Page<Account>> {
        enumerate::list_accounts(self.driver.as_ref(), filter, ordering, query).await
    }

    /// List entries under a filter, ordering and page query.
    pub async fn list_entries(
        &self,
        filter: &EntryFilter,
        ordering: Ordering,
        query: &PageQuery,
    ) -> Result<Page<Entry>> {
        enumerate::list_entries(self.driver.as_ref(), filter, ordering, query).await
    }
}
