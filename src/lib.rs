//! Bridge Relay - Cross-Chain Deposit Redemption
//!
//! Tracks deposits made on a source network, obtains the attestation that
//! authorizes their credit on a destination network, and submits the
//! redemption exactly once as far as the destination contract is concerned.
//!
//! ## Bridge Paths
//!
//! 1. **Oracle** - the source burn is attested by an HTTP oracle; the relay
//!    polls for the message pair and submits `receiveMessage`
//! 2. **Receipt** - a trusted signer attests that funds arrived; the relay
//!    signs a canonical receipt hash and submits `redeemReceipt`
//!
//! ## Components
//!
//! - `storage` - deposit ledger (SQLite or in-memory)
//! - `attestation` - oracle poller and receipt signer
//! - `signer` - custody-backed or local-key relay wallet
//! - `redemption` - gas estimation and submission
//! - `pipeline` - the coordinator tying them together

pub mod attestation;
pub mod common;
pub mod pipeline;
pub mod redemption;
pub mod signer;
pub mod storage;
pub mod types;

// Re-exports: common
pub use common::{RelayConfig, RelayError};

// Re-exports: pipeline
pub use pipeline::{PipelineCoordinator, RedeemOutcome, RedeemProof, RedeemRequest};

// Re-exports: attestation
pub use attestation::{AttestationDescriptor, ReceiptDescriptor};

// Re-exports: signer
pub use signer::{CustodySigner, LocalKeySigner, RemoteSigner, SignerChain, SignerError};

// Re-exports: storage
pub use storage::{DepositLedger, MemoryDepositLedger, SqliteDepositLedger, StorageError};

// Re-exports: types
pub use types::{
    Attestation, BridgePath, ConsumedDeposit, DepositCandidate, DepositRecord, SourceDescriptor,
};
