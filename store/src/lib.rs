//! LedgerKeep Storage
//!
//! The storage driver contract consumed by the ledger engine, plus the
//! in-memory reference driver.

pub mod driver;
pub mod memory;

pub use driver::{StorageDriver, StorageTransaction};
pub use memory::MemoryDriver;
