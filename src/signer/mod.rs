//! Remote Signer
//!
//! Holds or proxies the relay wallet's key. Two implementations:
//! - `CustodySigner` - delegates to a custody service over HTTP
//! - `LocalKeySigner` - signs in-process with a configured private key
//!
//! `SignerChain` picks the first one that initializes and keeps it for the
//! life of the process.

pub mod custody;
pub mod local;
pub mod registry;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Signature, H256, U256};

#[cfg(test)]
use mockall::automock;

use crate::common::config::NetworkConfig;

pub use custody::CustodySigner;
pub use local::LocalKeySigner;
pub use registry::{SignerCandidate, SignerChain};

/// Transaction handed to a signer for signing and broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: Option<U256>,
    pub gas_limit: Option<U256>,
}

/// Trait for relay wallet signers
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    /// Relay wallet address
    fn address(&self) -> Address;

    /// Sign `message` in the personal-sign (EIP-191) envelope
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError>;

    /// Sign and broadcast; returns the transaction hash without waiting
    async fn submit_transaction(
        &self,
        network: &NetworkConfig,
        tx: TxRequest,
    ) -> Result<H256, SignerError>;

    /// Get signer type description
    fn signer_type(&self) -> &'static str;
}

/// Signer errors
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("custody account not found: {0}")]
    AccountNotFound(String),

    /// No candidate could be initialized
    #[error("no signer available: {0}")]
    Unavailable(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("custody service error: {0}")]
    Custody(String),
}
