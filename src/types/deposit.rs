//! Deposit Types
//!
//! Records tracking a single bridging attempt from notification to redemption:
//! notified → attested → consumed (deleted from the ledger)

use serde::{Deserialize, Serialize};

/// Which bridge path a deposit travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgePath {
    /// Burn on the source network, proof published by the attestation oracle
    Oracle,
    /// Trusted signer attests receipt of funds directly
    Receipt,
}

impl std::fmt::Display for BridgePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Oracle => "oracle",
            Self::Receipt => "receipt",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for BridgePath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oracle" | "cctp" => Ok(Self::Oracle),
            "receipt" => Ok(Self::Receipt),
            _ => Err(format!("unknown bridge path: {}", s)),
        }
    }
}

/// Origin network of a deposit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// EVM chain id (receipt path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Oracle domain (oracle path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<u32>,
    /// Human-readable network name
    pub label: String,
}

impl SourceDescriptor {
    pub fn oracle(domain: u32, label: impl Into<String>) -> Self {
        Self {
            chain_id: None,
            domain: Some(domain),
            label: label.into(),
        }
    }

    pub fn receipt(chain_id: u64, label: impl Into<String>) -> Self {
        Self {
            chain_id: Some(chain_id),
            domain: None,
            label: label.into(),
        }
    }
}

/// Proof authorizing a destination credit
///
/// Always fully populated; a record without a proof holds `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attestation {
    /// Oracle message pair
    Oracle {
        /// Raw message bytes (0x-hex)
        message: String,
        /// Oracle signature over the message (0x-hex)
        proof: String,
        /// Oracle status at the time of acquisition
        status: String,
    },
    /// Signature over the canonical receipt hash (0x-hex, 65 bytes)
    Receipt { signature: String },
}

impl Attestation {
    /// Path this attestation belongs to
    pub fn path(&self) -> BridgePath {
        match self {
            Self::Oracle { .. } => BridgePath::Oracle,
            Self::Receipt { .. } => BridgePath::Receipt,
        }
    }

    /// Reject partially populated payloads
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Oracle {
                message,
                proof,
                status,
            } => {
                if message.trim().is_empty() {
                    return Err("attestation message is empty".to_string());
                }
                if proof.trim().is_empty() {
                    return Err("attestation proof is empty".to_string());
                }
                if status.trim().is_empty() {
                    return Err("attestation status is empty".to_string());
                }
                Ok(())
            }
            Self::Receipt { signature } => {
                if signature.trim().is_empty() {
                    return Err("receipt signature is empty".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Deposit as reported by the caller, before the ledger assigns identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositCandidate {
    pub path: BridgePath,
    /// Destination account (20-byte hex address)
    pub user_address: String,
    /// Source tx hash (oracle) or nonce (receipt)
    pub natural_key: String,
    pub source: SourceDescriptor,
    /// Smallest units of the bridged asset
    pub amount: u128,
}

impl DepositCandidate {
    /// Lower-case the address and canonicalize the natural key
    pub fn normalized(mut self) -> Self {
        self.user_address = self.user_address.trim().to_lowercase();
        self.natural_key = canonical_natural_key(&self.natural_key);
        self
    }
}

/// Canonical form of a natural key
///
/// Decimal nonces lose leading zeros so `042` and `42` name the same receipt.
/// Anything else (tx hashes) is lower-cased.
pub fn canonical_natural_key(key: &str) -> String {
    let key = key.trim();
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(nonce) = key.parse::<u128>() {
            return nonce.to_string();
        }
    }
    key.to_lowercase()
}

/// A deposit held in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    /// `{natural_key}-{created_at}`
    pub id: String,
    /// Lower-cased destination account
    pub user_address: String,
    pub natural_key: String,
    pub path: BridgePath,
    pub source: SourceDescriptor,
    pub amount: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
    /// Milliseconds since epoch
    pub created_at: u64,
    /// Always false while the record is stored
    pub redeemed: bool,
}

impl DepositRecord {
    /// Build a fresh record from a normalized candidate
    pub fn from_candidate(candidate: DepositCandidate, created_at: u64) -> Self {
        Self {
            id: format!("{}-{}", candidate.natural_key, created_at),
            user_address: candidate.user_address,
            natural_key: candidate.natural_key,
            path: candidate.path,
            source: candidate.source,
            amount: candidate.amount,
            attestation: None,
            created_at,
            redeemed: false,
        }
    }

    pub fn is_attested(&self) -> bool {
        self.attestation.is_some()
    }
}

/// Snapshot returned when a record is consumed and removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedDeposit {
    pub deposit: DepositRecord,
    /// Milliseconds since epoch
    pub redeemed_at: u64,
    pub redeem_tx_hash: String,
}

impl ConsumedDeposit {
    pub fn new(mut deposit: DepositRecord, redeem_tx_hash: impl Into<String>) -> Self {
        deposit.redeemed = true;
        Self {
            deposit,
            redeemed_at: now_millis(),
            redeem_tx_hash: redeem_tx_hash.into(),
        }
    }
}

/// Current time in milliseconds since epoch
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> DepositCandidate {
        DepositCandidate {
            path: BridgePath::Oracle,
            user_address: "  0xAbCdEf0000000000000000000000000000000001 ".to_string(),
            natural_key: "0xABCD".to_string(),
            source: SourceDescriptor::oracle(0, "ethereum-sepolia"),
            amount: 1_000_000,
        }
    }

    #[test]
    fn test_canonical_natural_key() {
        assert_eq!(canonical_natural_key(" 042 "), "42");
        assert_eq!(canonical_natural_key("42"), "42");
        assert_eq!(canonical_natural_key("0xABCD"), "0xabcd");
        // Beyond u128 stays as written; validation rejects it upstream
        let huge = "9".repeat(40);
        assert_eq!(canonical_natural_key(&huge), huge);
    }

    #[test]
    fn test_receipt_nonce_normalized() {
        let mut c = candidate();
        c.path = BridgePath::Receipt;
        c.natural_key = "00042".to_string();
        assert_eq!(c.normalized().natural_key, "42");
    }

    #[test]
    fn test_path_parsing() {
        assert_eq!("oracle".parse::<BridgePath>(), Ok(BridgePath::Oracle));
        assert_eq!("CCTP".parse::<BridgePath>(), Ok(BridgePath::Oracle));
        assert_eq!("receipt".parse::<BridgePath>(), Ok(BridgePath::Receipt));
        assert!("swap".parse::<BridgePath>().is_err());
        assert_eq!(BridgePath::Receipt.to_string(), "receipt");
    }

    #[test]
    fn test_candidate_normalization() {
        let c = candidate().normalized();
        assert_eq!(c.user_address, "0xabcdef0000000000000000000000000000000001");
        assert_eq!(c.natural_key, "0xabcd");
    }

    #[test]
    fn test_record_id_format() {
        let record = DepositRecord::from_candidate(candidate().normalized(), 1700000000000);
        assert_eq!(record.id, "0xabcd-1700000000000");
        assert!(!record.redeemed);
        assert!(!record.is_attested());
    }

    #[test]
    fn test_attestation_validation() {
        let full = Attestation::Oracle {
            message: "0x01".to_string(),
            proof: "0x02".to_string(),
            status: "complete".to_string(),
        };
        assert!(full.validate().is_ok());

        let partial = Attestation::Oracle {
            message: "0x01".to_string(),
            proof: String::new(),
            status: "complete".to_string(),
        };
        assert!(partial.validate().is_err());

        assert!(Attestation::Receipt {
            signature: " ".to_string()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_attestation_serialization_is_tagged() {
        let att = Attestation::Receipt {
            signature: "0xdead".to_string(),
        };
        let json = serde_json::to_value(&att).unwrap();
        assert_eq!(json["kind"], "receipt");
        assert_eq!(json["signature"], "0xdead");

        let back: Attestation = serde_json::from_value(json).unwrap();
        assert_eq!(back, att);
    }

    #[test]
    fn test_consumed_snapshot_marks_redeemed() {
        let record = DepositRecord::from_candidate(candidate().normalized(), 1);
        let consumed = ConsumedDeposit::new(record, "0xfeed");
        assert!(consumed.deposit.redeemed);
        assert_eq!(consumed.redeem_tx_hash, "0xfeed");
        assert!(consumed.redeemed_at > 0);
    }
}
