//! SQLite Persistent Deposit Ledger
//!
//! Durable storage for deposit records that survives restarts.
//! Uses connection pooling via r2d2 for concurrent access. Every write is a
//! single statement committed with `synchronous=FULL` before returning.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, types::Type, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use super::traits::{DepositLedger, StorageError, StorageResult};
use crate::types::deposit::{
    canonical_natural_key, now_millis, Attestation, BridgePath, ConsumedDeposit,
    DepositCandidate, DepositRecord, SourceDescriptor,
};

/// SQLITE_CONSTRAINT_PRIMARYKEY
const PRIMARY_KEY_VIOLATION: i32 = 1555;
/// SQLITE_CONSTRAINT_UNIQUE
const UNIQUE_VIOLATION: i32 = 2067;

/// Attempts at finding a free id when two users share a key in the same millisecond
const MAX_ID_ATTEMPTS: u64 = 16;

/// SQLite-backed deposit ledger with connection pooling
pub struct SqliteDepositLedger {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteDepositLedger {
    /// Open (or create) the ledger at the given path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Connection(e.to_string()))?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.pragma_update(None, "synchronous", "FULL")?;
            conn.busy_timeout(Duration::from_secs(5))?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let ledger = Self { pool };
        ledger.run_migrations()?;

        Ok(ledger)
    }

    /// Create an in-memory ledger (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let ledger = Self { pool };
        ledger.run_migrations()?;

        Ok(ledger)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS deposits (
                id TEXT PRIMARY KEY,
                user_address TEXT NOT NULL,
                natural_key TEXT NOT NULL,
                path TEXT NOT NULL,
                source_chain_id INTEGER,
                source_domain INTEGER,
                source_label TEXT NOT NULL DEFAULT '',
                amount TEXT NOT NULL,
                attestation TEXT,
                created_at INTEGER NOT NULL,
                redeemed INTEGER NOT NULL DEFAULT 0,
                UNIQUE (user_address, natural_key)
            );

            CREATE INDEX IF NOT EXISTS idx_deposits_natural_key ON deposits(natural_key);
            CREATE INDEX IF NOT EXISTS idx_deposits_user_created ON deposits(user_address, created_at);
            CREATE INDEX IF NOT EXISTS idx_deposits_created_at ON deposits(created_at);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    /// Convert a database row to DepositRecord
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DepositRecord> {
        let path_str: String = row.get("path")?;
        let path: BridgePath = path_str
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;

        let amount_str: String = row.get("amount")?;
        let amount: u128 = amount_str
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

        let attestation = match row.get::<_, Option<String>>("attestation")? {
            Some(json) => Some(
                serde_json::from_str::<Attestation>(&json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e))
                })?,
            ),
            None => None,
        };

        Ok(DepositRecord {
            id: row.get("id")?,
            user_address: row.get("user_address")?,
            natural_key: row.get("natural_key")?,
            path,
            source: SourceDescriptor {
                chain_id: row
                    .get::<_, Option<i64>>("source_chain_id")?
                    .map(|v| v as u64),
                domain: row
                    .get::<_, Option<i64>>("source_domain")?
                    .map(|v| v as u32),
                label: row.get("source_label")?,
            },
            amount,
            attestation,
            created_at: row.get::<_, i64>("created_at")? as u64,
            redeemed: row.get::<_, i64>("redeemed")? != 0,
        })
    }

    fn map_row_error(e: rusqlite::Error) -> StorageError {
        match e {
            rusqlite::Error::FromSqlConversionFailure(column, _, inner) => {
                StorageError::Database(format!("corrupt row (column {}): {}", column, inner))
            }
            other => StorageError::Database(other.to_string()),
        }
    }

    // Synchronous helper methods for the trait implementations

    fn insert_sync(&self, candidate: DepositCandidate) -> Result<DepositRecord, StorageError> {
        let candidate = candidate.normalized();
        let conn = self.conn()?;
        let base = now_millis();

        for offset in 0..MAX_ID_ATTEMPTS {
            let record = DepositRecord::from_candidate(candidate.clone(), base + offset);

            let result = conn.execute(
                r#"
                INSERT INTO deposits (
                    id, user_address, natural_key, path,
                    source_chain_id, source_domain, source_label,
                    amount, attestation, created_at, redeemed
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, 0)
                "#,
                params![
                    record.id,
                    record.user_address,
                    record.natural_key,
                    record.path.to_string(),
                    record.source.chain_id.map(|v| v as i64),
                    record.source.domain.map(|v| v as i64),
                    record.source.label,
                    record.amount.to_string(),
                    record.created_at as i64,
                ],
            );

            match result {
                Ok(_) => return Ok(record),
                Err(rusqlite::Error::SqliteFailure(ref err, _))
                    if err.extended_code == UNIQUE_VIOLATION =>
                {
                    return Err(StorageError::Duplicate(record.natural_key));
                }
                Err(rusqlite::Error::SqliteFailure(ref err, _))
                    if err.extended_code == PRIMARY_KEY_VIOLATION =>
                {
                    continue;
                }
                Err(e) => return Err(StorageError::Database(e.to_string())),
            }
        }

        Err(StorageError::Database(format!(
            "could not allocate an id for {}",
            candidate.natural_key
        )))
    }

    fn get_by_id_sync(&self, id: &str) -> Result<DepositRecord, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM deposits WHERE id = ?1",
            params![id],
            |row| Self::row_to_record(row),
        )
        .optional()
        .map_err(Self::map_row_error)?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn find_by_natural_key_sync(
        &self,
        natural_key: &str,
        user_address: Option<&str>,
    ) -> Result<DepositRecord, StorageError> {
        let conn = self.conn()?;
        let key = canonical_natural_key(natural_key);

        let record = match user_address {
            Some(user) => conn
                .query_row(
                    r#"
                    SELECT * FROM deposits
                    WHERE lower(natural_key) = ?1 AND user_address = ?2
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#,
                    params![key, user.trim().to_lowercase()],
                    |row| Self::row_to_record(row),
                )
                .optional(),
            None => conn
                .query_row(
                    r#"
                    SELECT * FROM deposits
                    WHERE lower(natural_key) = ?1
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#,
                    params![key],
                    |row| Self::row_to_record(row),
                )
                .optional(),
        }
        .map_err(Self::map_row_error)?;

        record.ok_or_else(|| StorageError::NotFound(natural_key.to_string()))
    }

    fn list_unredeemed_sync(
        &self,
        user_address: Option<&str>,
    ) -> Result<Vec<DepositRecord>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT * FROM deposits
            WHERE redeemed = 0 AND (?1 IS NULL OR user_address = ?1)
            ORDER BY created_at DESC, id DESC
            "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let user = user_address.map(|u| u.trim().to_lowercase());
        let records = stmt
            .query_map(params![user], |row| Self::row_to_record(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(Self::map_row_error)?;

        Ok(records)
    }

    fn attach_attestation_sync(
        &self,
        id: &str,
        attestation: &Attestation,
    ) -> Result<DepositRecord, StorageError> {
        attestation.validate().map_err(StorageError::InvalidData)?;
        let json = serde_json::to_string(attestation)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        let conn = self.conn()?;
        conn.query_row(
            "UPDATE deposits SET attestation = ?2 WHERE id = ?1 RETURNING *",
            params![id, json],
            |row| Self::row_to_record(row),
        )
        .optional()
        .map_err(Self::map_row_error)?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn consume_and_delete_sync(
        &self,
        id: &str,
        redeem_tx_hash: &str,
    ) -> Result<ConsumedDeposit, StorageError> {
        let conn = self.conn()?;

        // Single statement: concurrent consumers race on the row, only one gets it back
        let record = conn
            .query_row(
                "DELETE FROM deposits WHERE id = ?1 RETURNING *",
                params![id],
                |row| Self::row_to_record(row),
            )
            .optional()
            .map_err(Self::map_row_error)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        Ok(ConsumedDeposit::new(record, redeem_tx_hash))
    }

    fn count_sync(&self) -> Result<usize, StorageError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM deposits", [], |row| row.get(0))
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl DepositLedger for SqliteDepositLedger {
    async fn insert(&self, candidate: DepositCandidate) -> StorageResult<DepositRecord> {
        self.insert_sync(candidate)
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<DepositRecord> {
        self.get_by_id_sync(id)
    }

    async fn find_by_natural_key(
        &self,
        natural_key: &str,
        user_address: Option<&str>,
    ) -> StorageResult<DepositRecord> {
        self.find_by_natural_key_sync(natural_key, user_address)
    }

    async fn list_unredeemed(&self, user_address: Option<&str>) -> StorageResult<Vec<DepositRecord>> {
        self.list_unredeemed_sync(user_address)
    }

    async fn attach_attestation(
        &self,
        id: &str,
        attestation: Attestation,
    ) -> StorageResult<DepositRecord> {
        self.attach_attestation_sync(id, &attestation)
    }

    async fn consume_and_delete(
        &self,
        id: &str,
        redeem_tx_hash: &str,
    ) -> StorageResult<ConsumedDeposit> {
        self.consume_and_delete_sync(id, redeem_tx_hash)
    }

    async fn count(&self) -> StorageResult<usize> {
        self.count_sync()
    }
}
