//! Shared enumeration types: filters, orderings, page queries and pages.
//!
//! These types cross the storage driver boundary. Drivers are responsible
//! for translating them into whatever query mechanism they sit on; the
//! in-memory driver evaluates them directly via the `matches` predicates.

use crate::{AccountId, Entry, EntryType, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard upper bound on page size.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Default page size when the caller does not specify one.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Requested result ordering.
///
/// Amount orderings apply to entries only; requesting them for accounts is
/// a validation error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ordering {
    #[default]
    CreatedAscending,
    CreatedDescending,
    AmountAscending,
    AmountDescending,
}

impl Ordering {
    /// Check if this ordering sorts by amount.
    pub fn uses_amount(&self) -> bool {
        matches!(self, Ordering::AmountAscending | Ordering::AmountDescending)
    }

    /// Check if this ordering is descending.
    pub fn is_descending(&self) -> bool {
        matches!(self, Ordering::CreatedDescending | Ordering::AmountDescending)
    }
}

/// Resolved continuation position: the ordering keys of the last row of
/// the previous page plus its id as the tie-breaker. The next page is
/// constrained strictly past `(key, id)` in the requested direction, which
/// keeps pages gap-free and duplicate-free when rows share a timestamp or
/// amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorAnchor {
    /// Creation time of the anchor row.
    pub created_at: Timestamp,
    /// Amount of the anchor row (entries only).
    pub amount: Option<Decimal>,
    /// Id of the anchor row (insertion-ordered tie-breaker).
    pub id: Uuid,
}

/// Filter over accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountFilter {
    /// Free-text search over name and notes (case-insensitive substring).
    pub search: Option<String>,
    /// Only accounts created at or after this instant.
    pub created_after: Option<Timestamp>,
    /// Only accounts created at or before this instant.
    pub created_before: Option<Timestamp>,
    /// Continuation predicate, resolved by the enumeration engine.
    pub continue_after: Option<CursorAnchor>,
}

impl AccountFilter {
    /// Check whether an account passes this filter.
    ///
    /// The continuation predicate is ordering-dependent and is applied by
    /// the driver, not here.
    pub fn matches(&self, account: &crate::Account) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let name_hit = account.name.to_lowercase().contains(&needle);
            let notes_hit = account
                .notes
                .as_deref()
                .map(|n| n.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !name_hit && !notes_hit {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if account.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if account.created_at > before {
                return false;
            }
        }
        true
    }

    /// Copy of this filter without the continuation predicate, for the
    /// unpaginated total count.
    pub fn without_continuation(&self) -> Self {
        Self {
            continue_after: None,
            ..self.clone()
        }
    }
}

/// Filter over entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    /// Restrict to one account.
    pub account_id: Option<AccountId>,
    /// Restrict to one entry type.
    pub entry_type: Option<EntryType>,
    /// Free-text search over the description (case-insensitive substring).
    pub search: Option<String>,
    /// Only entries created at or after this instant.
    pub created_after: Option<Timestamp>,
    /// Only entries created at or before this instant.
    pub created_before: Option<Timestamp>,
    /// Minimum amount (inclusive).
    pub amount_min: Option<Decimal>,
    /// Maximum amount (inclusive).
    pub amount_max: Option<Decimal>,
    /// Continuation predicate, resolved by the enumeration engine.
    pub continue_after: Option<CursorAnchor>,
}

impl EntryFilter {
    /// Filter restricted to a single account.
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::default()
        }
    }

    /// Check whether an entry passes this filter.
    ///
    /// The continuation predicate is ordering-dependent and is applied by
    /// the driver, not here.
    pub fn matches(&self, entry: &Entry) -> bool {
        if let Some(account_id) = self.account_id {
            if entry.account_id != account_id {
                return false;
            }
        }
        if let Some(entry_type) = self.entry_type {
            if entry.entry_type != entry_type {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = entry
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !hit {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if entry.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if entry.created_at > before {
                return false;
            }
        }
        if let Some(min) = self.amount_min {
            if entry.amount < min {
                return false;
            }
        }
        if let Some(max) = self.amount_max {
            if entry.amount > max {
                return false;
            }
        }
        true
    }

    /// Copy of this filter without the continuation predicate, for the
    /// unpaginated total count.
    pub fn without_continuation(&self) -> Self {
        Self {
            continue_after: None,
            ..self.clone()
        }
    }
}

/// Pagination parameters for a list operation.
///
/// At most one of `skip` and `continuation_token` may be set; supplying
/// both is a validation error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageQuery {
    /// Maximum rows to return (clamped to 1..=1000, default 1000).
    pub max_results: Option<usize>,
    /// Offset-based continuation.
    pub skip: Option<u64>,
    /// Cursor-based continuation: the id of the last row of the previous
    /// page, as an opaque string.
    pub continuation_token: Option<String>,
}

impl PageQuery {
    /// A query for the first `max_results` rows.
    pub fn first(max_results: usize) -> Self {
        Self {
            max_results: Some(max_results),
            ..Self::default()
        }
    }

    /// An offset-based query.
    pub fn offset(skip: u64, max_results: usize) -> Self {
        Self {
            max_results: Some(max_results),
            skip: Some(skip),
            continuation_token: None,
        }
    }

    /// A cursor-based query resuming after `token`.
    pub fn resume(token: impl Into<String>, max_results: usize) -> Self {
        Self {
            max_results: Some(max_results),
            skip: None,
            continuation_token: Some(token.into()),
        }
    }

    /// The effective page size after clamping.
    pub fn effective_max_results(&self) -> usize {
        self.max_results
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// The rows of this page.
    pub items: Vec<T>,
    /// Total rows matching the filter, ignoring pagination.
    pub total_records: u64,
    /// Rows past the end of this page.
    pub records_remaining: u64,
    /// True when no rows remain.
    pub end_of_results: bool,
    /// Token for the next page; absent at end of results.
    pub continuation_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Account;
    use rust_decimal_macros::dec;

    #[test]
    fn test_effective_max_results_clamping() {
        assert_eq!(PageQuery::default().effective_max_results(), 1000);
        assert_eq!(PageQuery::first(3).effective_max_results(), 3);
        assert_eq!(PageQuery::first(0).effective_max_results(), 1);
        assert_eq!(PageQuery::first(5000).effective_max_results(), 1000);
    }

    #[test]
    fn test_entry_filter_matches() {
        let account_id = AccountId::new();
        let entry = Entry::credit(account_id, dec!(75), Some("Monthly invoice".to_string()));

        assert!(EntryFilter::for_account(account_id).matches(&entry));
        assert!(!EntryFilter::for_account(AccountId::new()).matches(&entry));

        let filter = EntryFilter {
            search: Some("INVOICE".to_string()),
            ..EntryFilter::default()
        };
        assert!(filter.matches(&entry));

        let filter = EntryFilter {
            amount_min: Some(dec!(100)),
            ..EntryFilter::default()
        };
        assert!(!filter.matches(&entry));

        let filter = EntryFilter {
            amount_min: Some(dec!(75)),
            amount_max: Some(dec!(75)),
            ..EntryFilter::default()
        };
        assert!(filter.matches(&entry));
    }

    #[test]
    fn test_entry_filter_by_type() {
        let entry = Entry::debit(AccountId::new(), dec!(5), None);
        let filter = EntryFilter {
            entry_type: Some(EntryType::Credit),
            ..EntryFilter::default()
        };
        assert!(!filter.matches(&entry));
    }

    #[test]
    fn test_account_filter_search_covers_notes() {
        let account = Account::new("ops", Some("Shared treasury notes".to_string()));
        let filter = AccountFilter {
            search: Some("treasury".to_string()),
            ..AccountFilter::default()
        };
        assert!(filter.matches(&account));
    }
}
