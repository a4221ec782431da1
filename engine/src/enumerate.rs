//! Shared enumeration logic for listing accounts and entries.
//!
//! Both list operations share the same shape: validate the pagination
//! parameters, compute the unpaginated total once, then produce the page
//! either by offset or by a continuation predicate derived from the
//! token. The token is the id of the last row of the previous page; it is
//! resolved to its ordering key plus the id itself as tie-breaker, and the
//! next page is constrained strictly past that `(key, id)` pair in the
//! requested direction. This keeps pages gap-free and duplicate-free when
//! rows share a timestamp or amount.

use ledgerkeep_common::{
    Account, AccountFilter, AccountId, CursorAnchor, Entry, EntryFilter, EntryId, LedgerError,
    Ordering, Page, PageQuery, Result,
};
use ledgerkeep_store::StorageDriver;

/// Validated pagination start position.
enum PageStart {
    Offset(u64),
    Token(String),
}

/// Check the skip/token exclusivity rule.
fn validate(query: &PageQuery) -> Result<PageStart> {
    match (&query.skip, &query.continuation_token) {
        (Some(_), Some(_)) => Err(LedgerError::InvalidArgument(
            "skip and continuation_token are mutually exclusive".to_string(),
        )),
        (_, Some(token)) => Ok(PageStart::Token(token.clone())),
        (skip, None) => Ok(PageStart::Offset(skip.unwrap_or(0))),
    }
}

fn assemble<T>(
    items: Vec<T>,
    total_records: u64,
    records_remaining: u64,
    token_of_last: Option<String>,
) -> Page<T> {
    let end_of_results = records_remaining == 0;
    Page {
        items,
        total_records,
        records_remaining,
        end_of_results,
        continuation_token: if end_of_results { None } else { token_of_last },
    }
}

/// List entries under a filter, ordering and page query.
pub async fn list_entries(
    driver: &dyn StorageDriver,
    filter: &EntryFilter,
    ordering: Ordering,
    query: &PageQuery,
) -> Result<Page<Entry>> {
    let start = validate(query)?;
    let max_results = query.effective_max_results();
    let base = filter.without_continuation();
    let total = driver.count_entries(&base, ordering).await?;

    match start {
        PageStart::Offset(skip) => {
            let rows = driver
                .entries_with_filter(&base, ordering, skip, Some(max_results))
                .await?;
            let remaining = total.saturating_sub(skip + rows.len() as u64);
            let token = rows.last().map(|e| e.id.to_string());
            Ok(assemble(rows, total, remaining, token))
        }
        PageStart::Token(token) => {
            let anchor_id = EntryId::parse(&token).map_err(|_| {
                LedgerError::InvalidArgument(format!("malformed continuation token: {token}"))
            })?;
            let anchor_row = driver.entry_by_id(anchor_id).await?.ok_or_else(|| {
                LedgerError::InvalidArgument(format!("unknown continuation token: {token}"))
            })?;
            let anchor = CursorAnchor {
                created_at: anchor_row.created_at,
                amount: Some(anchor_row.amount),
                id: *anchor_id.as_uuid(),
            };
            let continued = EntryFilter {
                continue_after: Some(anchor),
                ..base
            };
            let rows = driver
                .entries_with_filter(&continued, ordering, 0, Some(max_results))
                .await?;
            // Remaining is re-queried in token mode: rows past the anchor,
            // minus the ones just returned.
            let past_anchor = driver.count_entries(&continued, ordering).await?;
            let remaining = past_anchor.saturating_sub(rows.len() as u64);
            let token = rows.last().map(|e| e.id.to_string());
            Ok(assemble(rows, total, remaining, token))
        }
    }
}

/// List accounts under a filter, ordering and page query.
///
/// Amount orderings have no meaning for accounts and are rejected.
pub async fn list_accounts(
    driver: &dyn StorageDriver,
    filter: &AccountFilter,
    ordering: Ordering,
    query: &PageQuery,
) -> Result<Page<Account>> {
    if ordering.uses_amount() {
        return Err(LedgerError::InvalidArgument(
            "amount orderings apply to entries only".to_string(),
        ));
    }
    let start = validate(query)?;
    let max_results = query.effective_max_results();
    let base = filter.without_continuation();
    let total = driver.count_accounts(&base, ordering).await?;

    match start {
        PageStart::Offset(skip) => {
            let rows = driver
                .accounts_with_filter(&base, ordering, skip, Some(max_results))
                .await?;
            let remaining = total.saturating_sub(skip + rows.len() as u64);
            let token = rows.last().map(|a| a.id.to_string());
            Ok(assemble(rows, total, remaining, token))
        }
        PageStart::Token(token) => {
            let anchor_id = AccountId::parse(&token).map_err(|_| {
                LedgerError::InvalidArgument(format!("malformed continuation token: {token}"))
            })?;
            let anchor_row = driver.account_by_id(anchor_id).await?.ok_or_else(|| {
                LedgerError::InvalidArgument(format!("unknown continuation token: {token}"))
            })?;
            let anchor = CursorAnchor {
                created_at: anchor_row.created_at,
                amount: None,
                id: *anchor_id.as_uuid(),
            };
            let continued = AccountFilter {
                continue_after: Some(anchor),
                ..base
            };
            let rows = driver
                .accounts_with_filter(&continued, ordering, 0, Some(max_results))
                .await?;
            let past_anchor = driver.count_accounts(&continued, ordering).await?;
            let remaining = past_anchor.saturating_sub(rows.len() as u64);
            let token = rows.last().map(|a| a.id.to_string());
            Ok(assemble(rows, total, remaining, token))
        }
    }
}
