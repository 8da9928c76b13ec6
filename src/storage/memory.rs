//! In-Memory Deposit Ledger
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{DepositLedger, StorageError, StorageResult};
use crate::types::deposit::{
    canonical_natural_key, now_millis, Attestation, ConsumedDeposit, DepositCandidate,
    DepositRecord,
};

#[derive(Default)]
struct Inner {
    /// Records indexed by deposit ID
    records: HashMap<String, DepositRecord>,
    /// Index: (user, natural key) -> deposit ID
    by_key: HashMap<(String, String), String>,
}

/// In-memory deposit ledger
///
/// Record map and key index sit behind one lock so that insert and
/// consume are atomic with respect to each other.
#[derive(Clone, Default)]
pub struct MemoryDepositLedger {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryDepositLedger {
    /// Create a new empty ledger
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(records: &mut [DepositRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[async_trait]
impl DepositLedger for MemoryDepositLedger {
    async fn insert(&self, candidate: DepositCandidate) -> StorageResult<DepositRecord> {
        let candidate = candidate.normalized();
        let mut inner = self.inner.write().await;

        let key = (
            candidate.user_address.clone(),
            candidate.natural_key.clone(),
        );
        if inner.by_key.contains_key(&key) {
            return Err(StorageError::Duplicate(candidate.natural_key));
        }

        // Same key for another user within the same millisecond would collide on id
        let mut created_at = now_millis();
        while inner
            .records
            .contains_key(&format!("{}-{}", candidate.natural_key, created_at))
        {
            created_at += 1;
        }

        let record = DepositRecord::from_candidate(candidate, created_at);
        inner.by_key.insert(key, record.id.clone());
        inner.records.insert(record.id.clone(), record.clone());

        Ok(record)
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<DepositRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn find_by_natural_key(
        &self,
        natural_key: &str,
        user_address: Option<&str>,
    ) -> StorageResult<DepositRecord> {
        let inner = self.inner.read().await;
        let key_lower = canonical_natural_key(natural_key);

        let mut matches: Vec<DepositRecord> = inner
            .records
            .values()
            .filter(|r| r.natural_key.to_lowercase() == key_lower)
            .filter(|r| match user_address {
                Some(user) => r.user_address == user.trim().to_lowercase(),
                None => true,
            })
            .cloned()
            .collect();

        newest_first(&mut matches);
        matches
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(natural_key.to_string()))
    }

    async fn list_unredeemed(&self, user_address: Option<&str>) -> StorageResult<Vec<DepositRecord>> {
        let inner = self.inner.read().await;
        let user = user_address.map(|u| u.trim().to_lowercase());

        let mut records: Vec<DepositRecord> = inner
            .records
            .values()
            .filter(|r| !r.redeemed)
            .filter(|r| user.as_ref().map_or(true, |u| &r.user_address == u))
            .cloned()
            .collect();

        newest_first(&mut records);
        Ok(records)
    }

    async fn attach_attestation(
        &self,
        id: &str,
        attestation: Attestation,
    ) -> StorageResult<DepositRecord> {
        attestation.validate().map_err(StorageError::InvalidData)?;

        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        record.attestation = Some(attestation);
        Ok(record.clone())
    }

    async fn consume_and_delete(
        &self,
        id: &str,
        redeem_tx_hash: &str,
    ) -> StorageResult<ConsumedDeposit> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .remove(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        inner
            .by_key
            .remove(&(record.user_address.clone(), record.natural_key.clone()));

        Ok(ConsumedDeposit::new(record, redeem_tx_hash))
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.inner.read().await.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::deposit::{BridgePath, SourceDescriptor};

    const USER: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn create_test_candidate(user: &str, key: &str, amount: u128) -> DepositCandidate {
        DepositCandidate {
            path: BridgePath::Oracle,
            user_address: user.to_string(),
            natural_key: key.to_string(),
            source: SourceDescriptor::oracle(0, "ethereum-sepolia"),
            amount,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let ledger = MemoryDepositLedger::new();
        let inserted = ledger
            .insert(create_test_candidate(USER, "tx123", 1_000_000))
            .await
            .unwrap();

        let found = ledger.find_by_natural_key("tx123", Some(USER)).await.unwrap();
        assert_eq!(found, inserted);

        let by_id = ledger.get_by_id(&inserted.id).await.unwrap();
        assert_eq!(by_id, inserted);
    }

    #[tokio::test]
    async fn test_duplicate_key_same_user() {
        let ledger = MemoryDepositLedger::new();
        ledger
            .insert(create_test_candidate(USER, "tx123", 1))
            .await
            .unwrap();

        // Mixed-case address is the same user
        let result = ledger
            .insert(create_test_candidate(&USER.to_uppercase().replace("0X", "0x"), "tx123", 2))
            .await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_key_different_users() {
        let ledger = MemoryDepositLedger::new();
        let other = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

        let a = ledger.insert(create_test_candidate(USER, "tx1", 1)).await.unwrap();
        let b = ledger.insert(create_test_candidate(other, "tx1", 2)).await.unwrap();
        assert_ne!(a.id, b.id);

        let newest = ledger.find_by_natural_key("tx1", None).await.unwrap();
        assert_eq!(newest.id, b.id);
    }

    #[tokio::test]
    async fn test_consume_once() {
        let ledger = MemoryDepositLedger::new();
        let record = ledger
            .insert(create_test_candidate(USER, "tx123", 1_000_000))
            .await
            .unwrap();

        assert_eq!(ledger.list_unredeemed(Some(USER)).await.unwrap().len(), 1);

        let consumed = ledger.consume_and_delete(&record.id, "0xabc").await.unwrap();
        assert!(consumed.deposit.redeemed);
        assert_eq!(consumed.deposit.amount, 1_000_000);

        let second = ledger.consume_and_delete(&record.id, "0xabc").await;
        assert!(matches!(second, Err(StorageError::NotFound(_))));
        assert!(ledger.list_unredeemed(Some(USER)).await.unwrap().is_empty());

        // Key is free again after consumption
        assert!(ledger
            .insert(create_test_candidate(USER, "tx123", 1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_attach_attestation() {
        let ledger = MemoryDepositLedger::new();
        let record = ledger.insert(create_test_candidate(USER, "tx1", 5)).await.unwrap();

        let att = Attestation::Oracle {
            message: "0x01".to_string(),
            proof: "0x02".to_string(),
            status: "complete".to_string(),
        };
        let first = ledger.attach_attestation(&record.id, att.clone()).await.unwrap();
        let again = ledger.attach_attestation(&record.id, att.clone()).await.unwrap();
        assert_eq!(first, again);

        let replaced = Attestation::Oracle {
            message: "0x03".to_string(),
            proof: "0x04".to_string(),
            status: "complete".to_string(),
        };
        let updated = ledger.attach_attestation(&record.id, replaced.clone()).await.unwrap();
        assert_eq!(updated.attestation, Some(replaced));

        let missing = ledger.attach_attestation("nope", att).await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_partial_attestation_rejected() {
        let ledger = MemoryDepositLedger::new();
        let record = ledger.insert(create_test_candidate(USER, "tx1", 5)).await.unwrap();

        let partial = Attestation::Oracle {
            message: "0x01".to_string(),
            proof: String::new(),
            status: "complete".to_string(),
        };
        let result = ledger.attach_attestation(&record.id, partial).await;
        assert!(matches!(result, Err(StorageError::InvalidData(_))));
        assert!(ledger.get_by_id(&record.id).await.unwrap().attestation.is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let ledger = MemoryDepositLedger::new();
        for key in ["a", "b", "c"] {
            ledger.insert(create_test_candidate(USER, key, 1)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let keys: Vec<String> = ledger
            .list_unredeemed(None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.natural_key)
            .collect();
        assert_eq!(keys, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_zero_padded_nonce_is_same_key() {
        let ledger = MemoryDepositLedger::new();
        let mut receipt = create_test_candidate(USER, "42", 1);
        receipt.path = BridgePath::Receipt;
        receipt.source = SourceDescriptor::receipt(7, "arc-testnet");
        let record = ledger.insert(receipt.clone()).await.unwrap();

        receipt.natural_key = "042".to_string();
        let padded = ledger.insert(receipt).await;
        assert!(matches!(padded, Err(StorageError::Duplicate(_))));
        assert_eq!(ledger.count().await.unwrap(), 1);

        let found = ledger.find_by_natural_key(" 0042", Some(USER)).await.unwrap();
        assert_eq!(found.id, record.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_has_one_winner() {
        let ledger = MemoryDepositLedger::new();
        let record = ledger
            .insert(create_test_candidate(USER, "tx-race", 7))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                let id = record.id.clone();
                tokio::spawn(async move { ledger.consume_and_delete(&id, &format!("0x{:02x}", i)).await })
            })
            .collect();

        let mut wins = 0;
        let mut not_found = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(StorageError::NotFound(_)) => not_found += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(not_found, 7);
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_insert_keeps_one_record() {
        let ledger = MemoryDepositLedger::new();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger.insert(create_test_candidate(USER, "tx-dup", i + 1)).await
                })
            })
            .collect();

        let mut inserted = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => inserted += 1,
                Err(StorageError::Duplicate(_)) => duplicates += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }
}
