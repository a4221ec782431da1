//! Account entity.

use crate::{now, AccountId, Timestamp};
use serde::{Deserialize, Serialize};

/// A ledger account.
///
/// Accounts are never mutated after creation; deleting an account deletes
/// all of its entries in the same atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Account name (unique, non-empty).
    pub name: String,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the account was created.
    pub created_at: Timestamp,
}

impl Account {
    /// Create a new account. Name validation is the engine's responsibility.
    pub fn new(name: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            notes,
            created_at: now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_creation() {
        let account = Account::new("operating", Some("primary operating account".to_string()));
        assert_eq!(account.name, "operating");
        assert!(account.notes.is_some());
    }
}
