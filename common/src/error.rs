//! Error types for LedgerKeep operations.

use crate::{AccountId, EntryId};
use thiserror::Error;

/// Main error type for LedgerKeep operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed input: empty name, negative amount, bad pagination parameters.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Referenced entry does not exist or belongs to a different account.
    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),

    /// Operation not legal given the entry's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Duplicate account name.
    #[error("Account name already exists: {0}")]
    DuplicateAccountName(String),

    /// Storage driver failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Get error code for callers that map errors onto a wire protocol.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            LedgerError::InvalidState(_) => "INVALID_STATE",
            LedgerError::DuplicateAccountName(_) => "DUPLICATE_ACCOUNT_NAME",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Check if this is a not-found error (account or entry).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::AccountNotFound(_) | LedgerError::EntryNotFound(_)
        )
    }

    /// Check if this error reports invalid caller input.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, LedgerError::InvalidArgument(_))
    }
}

/// Result type alias for LedgerKeep operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = LedgerError::InvalidArgument("amount must be non-negative".to_string());
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        assert!(err.is_invalid_argument());

        let err = LedgerError::AccountNotFound(AccountId::new());
        assert_eq!(err.error_code(), "ACCOUNT_NOT_FOUND");
        assert!(err.is_not_found());

        let err = LedgerError::EntryNotFound(EntryId::new());
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::DuplicateAccountName("savings".to_string());
        assert_eq!(err.to_string(), "Account name already exists: savings");
    }
}
