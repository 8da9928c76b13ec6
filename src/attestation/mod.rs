//! Attestation Sources
//!
//! Two ways to obtain the proof a destination contract accepts:
//! - `OracleSource` - polls the attestation oracle for a burn's message pair
//! - `ReceiptSource` - has the trusted signer sign a canonical receipt hash
//!
//! The coordinator dispatches on `AttestationDescriptor` exactly once.

pub mod oracle;
pub mod receipt;

pub use oracle::{
    interpret_messages, AttestationApi, OracleError, OracleHttpClient, OracleMessage,
    OracleOutcome, OracleSource, PollPolicy,
};
pub use receipt::{
    generate_nonce, parse_signature, receipt_digest, verify_receipt_signature, ReceiptDescriptor,
    ReceiptSource,
};

use crate::types::deposit::BridgePath;

/// What to acquire an attestation for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationDescriptor {
    Oracle { source_domain: u32, tx_hash: String },
    Receipt(ReceiptDescriptor),
}

impl AttestationDescriptor {
    pub fn path(&self) -> BridgePath {
        match self {
            Self::Oracle { .. } => BridgePath::Oracle,
            Self::Receipt(_) => BridgePath::Receipt,
        }
    }

    /// Value used to correlate log lines for this acquisition
    pub fn key(&self) -> String {
        match self {
            Self::Oracle { tx_hash, .. } => tx_hash.clone(),
            Self::Receipt(receipt) => receipt.nonce.to_string(),
        }
    }
}
