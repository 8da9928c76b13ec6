//! Storage Layer Module
//!
//! Provides persistence for deposit records.
//!
//! This module contains:
//! - The `DepositLedger` trait
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryDepositLedger;
pub use sqlite::SqliteDepositLedger;
pub use traits::{DepositLedger, StorageError, StorageResult};

use std::sync::Arc;

/// Open the ledger named by a path; `:memory:` selects the in-memory backend
pub fn open_ledger(path: &str) -> StorageResult<Arc<dyn DepositLedger>> {
    if path == ":memory:" {
        Ok(Arc::new(MemoryDepositLedger::new()))
    } else {
        Ok(Arc::new(SqliteDepositLedger::new(path)?))
    }
}
