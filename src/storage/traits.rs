//! Storage Trait Definitions
//!
//! Defines the deposit ledger interface.
//! Implementations can use SQLite (production) or in-memory (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::types::deposit::{Attestation, ConsumedDeposit, DepositCandidate, DepositRecord};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Rejected input, such as a partial attestation
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable store of unredeemed deposits
///
/// `(natural_key, user_address)` is unique among stored records. Consumed
/// records are deleted, so a key may be inserted again afterwards.
///
/// Implementations:
/// - `SqliteDepositLedger` - Production storage with SQLite
/// - `MemoryDepositLedger` - In-memory storage for testing
#[async_trait]
pub trait DepositLedger: Send + Sync {
    /// Insert a new deposit; fails with `Duplicate` if the key is already held for this user
    async fn insert(&self, candidate: DepositCandidate) -> StorageResult<DepositRecord>;

    /// Get a deposit by ID
    async fn get_by_id(&self, id: &str) -> StorageResult<DepositRecord>;

    /// Find by natural key, optionally scoped to one user (newest match across users otherwise)
    async fn find_by_natural_key(
        &self,
        natural_key: &str,
        user_address: Option<&str>,
    ) -> StorageResult<DepositRecord>;

    /// List unredeemed deposits, newest first
    async fn list_unredeemed(&self, user_address: Option<&str>) -> StorageResult<Vec<DepositRecord>>;

    /// Attach or overwrite the attestation (last write wins)
    async fn attach_attestation(
        &self,
        id: &str,
        attestation: Attestation,
    ) -> StorageResult<DepositRecord>;

    /// Atomically remove the record and return its final snapshot
    async fn consume_and_delete(
        &self,
        id: &str,
        redeem_tx_hash: &str,
    ) -> StorageResult<ConsumedDeposit>;

    /// Number of stored records
    async fn count(&self) -> StorageResult<usize>;
}
