//! Common Error Types
//!
//! Root error for pipeline operations. Module errors convert into it at the
//! coordinator boundary.

use thiserror::Error;

use crate::attestation::oracle::OracleError;
use crate::redemption::rpc::RpcError;
use crate::signer::SignerError;
use crate::storage::StorageError;

/// Root error type for the relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed address, hash, amount or key; nothing was touched
    #[error("validation error: {0}")]
    Validation(String),

    /// Natural key already held by an unredeemed record for this user
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown id or key, or already consumed
    #[error("not found: {0}")]
    NotFound(String),

    #[error("attestation pending: {0}")]
    AttestationPending(String),

    #[error("attestation failed: {0}")]
    AttestationFailed(String),

    /// Poll budget exhausted without a terminal answer
    #[error("attestation not ready after {attempts} attempts")]
    AttestationTimeout { attempts: u32 },

    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Recovered receipt signer differs from the trusted signer
    #[error("signature mismatch: expected {expected}, recovered {recovered}")]
    SignatureMismatch { expected: String, recovered: String },

    /// Revert reason from the provider, verbatim
    #[error("gas estimation failed: {0}")]
    GasEstimationFailed(String),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// Every signer candidate failed to initialize
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    /// Signer initialized but the remote operation failed
    #[error("signer error: {0}")]
    Signer(String),

    #[error("transaction {tx_hash} not confirmed after {waited_secs}s")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    #[error("transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if the caller may retry the same operation
    ///
    /// Gas estimation failures are excluded: they usually mean the deposit
    /// was already redeemed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::AttestationPending(_)
                | RelayError::AttestationTimeout { .. }
                | RelayError::SubmissionFailed(_)
                | RelayError::Signer(_)
                | RelayError::ConfirmationTimeout { .. }
                | RelayError::Rpc(_)
                | RelayError::Storage(_)
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "VALIDATION_ERROR",
            RelayError::Conflict(_) => "CONFLICT",
            RelayError::NotFound(_) => "NOT_FOUND",
            RelayError::AttestationPending(_) => "ATTESTATION_PENDING",
            RelayError::AttestationFailed(_) => "ATTESTATION_FAILED",
            RelayError::AttestationTimeout { .. } => "ATTESTATION_TIMEOUT",
            RelayError::Cancelled(_) => "CANCELLED",
            RelayError::SignatureMismatch { .. } => "SIGNATURE_MISMATCH",
            RelayError::GasEstimationFailed(_) => "GAS_ESTIMATION_FAILED",
            RelayError::SubmissionFailed(_) => "SUBMISSION_FAILED",
            RelayError::SignerUnavailable(_) => "SIGNER_UNAVAILABLE",
            RelayError::Signer(_) => "SIGNER_ERROR",
            RelayError::ConfirmationTimeout { .. } => "CONFIRMATION_TIMEOUT",
            RelayError::TransactionReverted(_) => "TRANSACTION_REVERTED",
            RelayError::Rpc(_) => "RPC_ERROR",
            RelayError::Storage(_) => "STORAGE_ERROR",
            RelayError::Config(_) => "CONFIG_ERROR",
            RelayError::Logging(_) => "LOGGING_ERROR",
            RelayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status a front end should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::Validation(_) => 400,
            RelayError::NotFound(_) => 404,
            RelayError::Conflict(_) => 409,
            RelayError::AttestationPending(_) => 202,
            RelayError::Cancelled(_) => 499,
            RelayError::AttestationFailed(_)
            | RelayError::SignatureMismatch { .. }
            | RelayError::GasEstimationFailed(_)
            | RelayError::TransactionReverted(_) => 422,
            RelayError::SubmissionFailed(_) | RelayError::Signer(_) | RelayError::Rpc(_) => 502,
            RelayError::SignerUnavailable(_) => 503,
            RelayError::AttestationTimeout { .. } | RelayError::ConfirmationTimeout { .. } => 504,
            RelayError::Storage(_)
            | RelayError::Config(_)
            | RelayError::Logging(_)
            | RelayError::Internal(_) => 500,
        }
    }
}

impl From<StorageError> for RelayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate(key) => {
                RelayError::Conflict(format!("deposit {} already recorded", key))
            }
            StorageError::NotFound(id) => RelayError::NotFound(id),
            StorageError::InvalidData(msg) => RelayError::Validation(msg),
            other => RelayError::Storage(other.to_string()),
        }
    }
}

impl From<SignerError> for RelayError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Unavailable(msg) => RelayError::SignerUnavailable(msg),
            SignerError::SubmissionFailed(msg) => RelayError::SubmissionFailed(msg),
            SignerError::InvalidKey(msg) => RelayError::Validation(msg),
            other => RelayError::Signer(other.to_string()),
        }
    }
}

impl From<OracleError> for RelayError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::InvalidResponse(msg) => RelayError::AttestationFailed(msg),
            other => RelayError::Rpc(other.to_string()),
        }
    }
}

impl From<RpcError> for RelayError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Timeout(secs) => RelayError::Rpc(format!("timed out after {}s", secs)),
            other => RelayError::Rpc(other.to_string()),
        }
    }
}

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
