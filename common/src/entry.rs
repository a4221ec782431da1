//! Ledger entry types.

use crate::{now, AccountId, EntryId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Type of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// Credit entry (increases the balance when committed).
    Credit,
    /// Debit entry (decreases the balance when committed).
    Debit,
    /// Balance snapshot produced by the commit protocol.
    Balance,
}

impl EntryType {
    /// Check if entries of this type can sit in the pending set.
    pub fn is_transactional(&self) -> bool {
        matches!(self, EntryType::Credit | EntryType::Debit)
    }
}

/// A single ledger entry.
///
/// Amounts are always non-negative; the sign is conveyed by `entry_type`.
/// Balance entries are full snapshots linked to their predecessor via
/// `replaces`, never deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique entry ID.
    pub id: EntryId,
    /// Owning account.
    pub account_id: AccountId,
    /// Entry type.
    pub entry_type: EntryType,
    /// Amount (non-negative).
    pub amount: Decimal,
    /// Free-form description.
    pub description: Option<String>,
    /// For Balance entries: the previous Balance entry this one supersedes.
    pub replaces: Option<EntryId>,
    /// Whether this entry has been folded into a committed balance.
    pub is_committed: bool,
    /// The Balance entry that committed this Credit/Debit.
    pub committed_by: Option<EntryId>,
    /// When this entry was committed.
    pub committed_at: Option<Timestamp>,
    /// When this entry was created.
    pub created_at: Timestamp,
}

impl Entry {
    /// Create a pending credit entry.
    pub fn credit(account_id: AccountId, amount: Decimal, description: Option<String>) -> Self {
        Self::transactional(account_id, EntryType::Credit, amount, description)
    }

    /// Create a pending debit entry.
    pub fn debit(account_id: AccountId, amount: Decimal, description: Option<String>) -> Self {
        Self::transactional(account_id, EntryType::Debit, amount, description)
    }

    fn transactional(
        account_id: AccountId,
        entry_type: EntryType,
        amount: Decimal,
        description: Option<String>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            account_id,
            entry_type,
            amount,
            description,
            replaces: None,
            is_committed: false,
            committed_by: None,
            committed_at: None,
            created_at: now(),
        }
    }

    /// Create a committed Balance snapshot entry.
    ///
    /// Balance entries are born committed and are never committed-by
    /// another entry.
    pub fn balance_snapshot(
        account_id: AccountId,
        amount: Decimal,
        replaces: Option<EntryId>,
    ) -> Self {
        let created = now();
        Self {
            id: EntryId::new(),
            account_id,
            entry_type: EntryType::Balance,
            amount,
            description: None,
            replaces,
            is_committed: true,
            committed_by: None,
            committed_at: Some(created),
            created_at: created,
        }
    }

    /// Check if this entry is a pending Credit/Debit.
    pub fn is_pending(&self) -> bool {
        self.entry_type.is_transactional() && !self.is_committed
    }

    /// Get the signed amount (positive for credits, negative for debits).
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
            EntryType::Balance => self.amount,
        }
    }

    /// Mark a pending entry as committed by the given Balance entry.
    ///
    /// The transition is one-way; callers must check `is_pending` first.
    pub fn mark_committed(&mut self, committed_by: EntryId, committed_at: Timestamp) {
        self.is_committed = true;
        self.committed_by = Some(committed_by);
        self.committed_at = Some(committed_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pending_entry_creation() {
        let account_id = AccountId::new();
        let entry = Entry::credit(account_id, dec!(25.50), Some("invoice #4".to_string()));

        assert_eq!(entry.entry_type, EntryType::Credit);
        assert!(entry.is_pending());
        assert!(!entry.is_committed);
        assert!(entry.committed_at.is_none());
        assert_eq!(entry.signed_amount(), dec!(25.50));
    }

    #[test]
    fn test_debit_signed_amount() {
        let entry = Entry::debit(AccountId::new(), dec!(10), None);
        assert_eq!(entry.signed_amount(), dec!(-10));
    }

    #[test]
    fn test_balance_snapshot_is_born_committed() {
        let entry = Entry::balance_snapshot(AccountId::new(), dec!(100), None);

        assert_eq!(entry.entry_type, EntryType::Balance);
        assert!(entry.is_committed);
        assert!(entry.committed_by.is_none());
        assert!(entry.committed_at.is_some());
        assert!(!entry.is_pending());
    }

    #[test]
    fn test_mark_committed() {
        let mut entry = Entry::credit(AccountId::new(), dec!(5), None);
        let snapshot_id = EntryId::new();
        let ts = crate::now();

        entry.mark_committed(snapshot_id, ts);

        assert!(entry.is_committed);
        assert_eq!(entry.committed_by, Some(snapshot_id));
        assert_eq!(entry.committed_at, Some(ts));
        assert!(!entry.is_pending());
    }
}
