//! Computed account balance.

use crate::{AccountId, Entry, EntryId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Summary of the pending entries of one type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingSummary {
    /// Number of pending entries.
    pub count: usize,
    /// Sum of pending amounts.
    pub total: Decimal,
    /// The pending entries themselves.
    pub entries: Vec<Entry>,
}

impl PendingSummary {
    /// Build a summary from a set of pending entries.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let total = entries.iter().map(|e| e.amount).sum();
        Self {
            count: entries.len(),
            total,
            entries,
        }
    }
}

/// Account balance at the moment of the read.
///
/// This is a computed view, recomputed on every read; it has no lifecycle
/// of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Account identifier.
    pub account_id: AccountId,
    /// The latest Balance snapshot entry, if any.
    pub latest_balance_entry_id: Option<EntryId>,
    /// Balance as of the latest committed snapshot.
    pub committed_balance: Decimal,
    /// Committed balance adjusted for pending credits and debits.
    pub pending_balance: Decimal,
    /// Pending credit entries.
    pub pending_credits: PendingSummary,
    /// Pending debit entries.
    pub pending_debits: PendingSummary,
    /// Entries committed by the operation that produced this view
    /// (populated by the commit protocol only, transient).
    pub committed_entry_ids: Vec<EntryId>,
}

impl Balance {
    /// Create a committed-only view (no pending information requested).
    pub fn committed_only(
        account_id: AccountId,
        latest_balance_entry_id: Option<EntryId>,
        committed_balance: Decimal,
    ) -> Self {
        Self {
            account_id,
            latest_balance_entry_id,
            committed_balance,
            pending_balance: committed_balance,
            pending_credits: PendingSummary::default(),
            pending_debits: PendingSummary::default(),
            committed_entry_ids: Vec::new(),
        }
    }

    /// Attach pending credit/debit summaries and derive the pending balance.
    pub fn with_pending(mut self, credits: PendingSummary, debits: PendingSummary) -> Self {
        self.pending_balance = self.committed_balance + credits.total - debits.total;
        self.pending_credits = credits;
        self.pending_debits = debits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pending_balance_identity() {
        let account_id = AccountId::new();
        let credits = PendingSummary::from_entries(vec![
            Entry::credit(account_id, dec!(50), None),
            Entry::credit(account_id, dec!(25), None),
        ]);
        let debits = PendingSummary::from_entries(vec![Entry::debit(account_id, dec!(30), None)]);

        let balance = Balance::committed_only(account_id, Some(EntryId::new()), dec!(100))
            .with_pending(credits, debits);

        assert_eq!(balance.committed_balance, dec!(100));
        assert_eq!(balance.pending_credits.total, dec!(75));
        assert_eq!(balance.pending_credits.count, 2);
        assert_eq!(balance.pending_debits.total, dec!(30));
        assert_eq!(balance.pending_balance, dec!(145));
    }

    #[test]
    fn test_committed_only_has_equal_balances() {
        let balance = Balance::committed_only(AccountId::new(), None, dec!(42));
        assert_eq!(balance.pending_balance, balance.committed_balance);
        assert!(balance.committed_entry_ids.is_empty());
    }
}
