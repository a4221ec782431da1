//! LedgerKeep Common Types
//!
//! This crate contains shared types used across the LedgerKeep engine,
//! including identifiers, the entity model (accounts, entries, computed
//! balances) and the enumeration query/response types.

pub mod account;
pub mod balance;
pub mod entry;
pub mod error;
pub mod identifiers;
pub mod query;
pub mod time;

pub use account::*;
pub use balance::*;
pub use entry::*;
pub use error::*;
pub use identifiers::*;
pub use query::*;
pub use time::*;
