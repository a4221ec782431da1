//! LedgerKeep Engine
//!
//! Embeddable ledgering engine: per-account credit/debit entries, a
//! committed balance that advances only through an explicit commit, and
//! point-in-time plus chain-integrity queries over the balance history.
//! Mutations on one account are serialized by an exclusive async lock;
//! distinct accounts proceed fully in parallel.

pub mod engine;
pub mod enumerate;
pub mod events;
pub mod locks;

pub use engine::{AddEntryOptions, EntryRequest, LedgerEngine};
pub use events::{EventDispatcher, LedgerEvent};
pub use locks::{AccountLockGuard, AccountLockRegistry};
