//! Time helpers for LedgerKeep.

use chrono::{DateTime, Utc};

/// A timestamp with timezone (always UTC for LedgerKeep).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}
