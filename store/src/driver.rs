//! The storage driver contract.
//!
//! This is the narrow interface the ledger engine requires from a backing
//! store. Concrete backends (SQL dialects, pools, DDL) live outside this
//! workspace; the in-memory driver in [`crate::memory`] is the reference
//! implementation. Drivers expose no business rules: validation, locking
//! and the commit protocol are the engine's job.

use async_trait::async_trait;

use ledgerkeep_common::{
    Account, AccountFilter, AccountId, Entry, EntryFilter, EntryId, EntryType, Ordering, Result,
    Timestamp,
};

/// Narrow CRUD/query/transaction contract consumed by the ledger engine.
///
/// Filter, ordering and pagination translation is pushed into the driver:
/// the engine hands over [`EntryFilter`]/[`AccountFilter`] values (possibly
/// carrying a resolved continuation anchor) and never generates
/// backend-specific query syntax.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    // --- accounts ---

    /// Insert a new account. Fails with `DuplicateAccountName` if the name
    /// is taken.
    async fn insert_account(&self, account: Account) -> Result<()>;

    /// Read an account by id.
    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>>;

    /// Read an account by exact name.
    async fn account_by_name(&self, name: &str) -> Result<Option<Account>>;

    /// Check whether an account name is taken.
    async fn account_name_exists(&self, name: &str) -> Result<bool>;

    /// Read accounts matching `filter`, ordered, then offset/limited.
    /// Amount orderings are rejected by the engine before this is called.
    async fn accounts_with_filter(
        &self,
        filter: &AccountFilter,
        ordering: Ordering,
        skip: u64,
        take: Option<usize>,
    ) -> Result<Vec<Account>>;

    /// Count accounts matching `filter` (including any continuation
    /// predicate, which is why the ordering is needed).
    async fn count_accounts(&self, filter: &AccountFilter, ordering: Ordering) -> Result<u64>;

    /// Delete an account by id. Deleting a missing account is a no-op.
    async fn delete_account(&self, id: AccountId) -> Result<()>;

    // --- entries ---

    /// Insert a new entry.
    async fn insert_entry(&self, entry: Entry) -> Result<()>;

    /// Insert several entries. Each insert is individually atomic; this is
    /// a convenience, not a transaction.
    async fn insert_entries(&self, entries: Vec<Entry>) -> Result<()>;

    /// Read an entry by id.
    async fn entry_by_id(&self, id: EntryId) -> Result<Option<Entry>>;

    /// Read all entries of an account.
    async fn entries_by_account(&self, account_id: AccountId) -> Result<Vec<Entry>>;

    /// Read the pending (uncommitted Credit/Debit) entries of an account,
    /// optionally restricted to one type, in creation order.
    async fn pending_entries(
        &self,
        account_id: AccountId,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<Entry>>;

    /// Read the most recent Balance entry of an account.
    async fn latest_balance_entry(&self, account_id: AccountId) -> Result<Option<Entry>>;

    /// Read the most recent Balance entry created at or before `as_of`.
    async fn balance_entry_as_of(
        &self,
        account_id: AccountId,
        as_of: Timestamp,
    ) -> Result<Option<Entry>>;

    /// Read entries matching `filter`, ordered, then offset/limited.
    async fn entries_with_filter(
        &self,
        filter: &EntryFilter,
        ordering: Ordering,
        skip: u64,
        take: Option<usize>,
    ) -> Result<Vec<Entry>>;

    /// Count entries matching `filter` (including any continuation
    /// predicate, which is why the ordering is needed).
    async fn count_entries(&self, filter: &EntryFilter, ordering: Ordering) -> Result<u64>;

    /// Replace an existing entry. Fails with `EntryNotFound` if absent.
    async fn update_entry(&self, entry: Entry) -> Result<()>;

    /// Replace several existing entries.
    async fn update_entries(&self, entries: Vec<Entry>) -> Result<()>;

    /// Delete an entry by id. Deleting a missing entry is a no-op.
    async fn delete_entry(&self, id: EntryId) -> Result<()>;

    /// Delete all entries of an account.
    async fn delete_entries_by_account(&self, account_id: AccountId) -> Result<()>;

    // --- transactions ---

    /// Begin a transaction scoping the write operations on the returned
    /// handle. Returns `None` when the driver does not support
    /// transactions; the engine then falls back to direct writes with the
    /// documented weaker partial-failure guarantee.
    async fn begin_transaction(&self) -> Result<Option<Box<dyn StorageTransaction>>>;
}

/// A storage transaction handle.
///
/// Writes performed through the handle become permanent on [`commit`] and
/// are reverted on [`rollback`] or when the handle is dropped uncommitted.
///
/// [`commit`]: StorageTransaction::commit
/// [`rollback`]: StorageTransaction::rollback
#[async_trait]
pub trait StorageTransaction: Send {
    /// Insert a new account within the transaction.
    async fn insert_account(&mut self, account: Account) -> Result<()>;

    /// Insert a new entry within the transaction.
    async fn insert_entry(&mut self, entry: Entry) -> Result<()>;

    /// Insert several entries within the transaction.
    async fn insert_entries(&mut self, entries: Vec<Entry>) -> Result<()>;

    /// Replace several existing entries within the transaction.
    async fn update_entries(&mut self, entries: Vec<Entry>) -> Result<()>;

    /// Delete an account by id within the transaction.
    async fn delete_account(&mut self, id: AccountId) -> Result<()>;

    /// Delete all entries of an account within the transaction.
    async fn delete_entries_by_account(&mut self, account_id: AccountId) -> Result<()>;

    /// Make all writes performed through this handle permanent.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Revert all writes performed through this handle.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
