//! Receipt Attestation Source
//!
//! A trusted signer attests that funds arrived on the source network. The
//! signed pre-image is packed as
//! `contract(20) ‖ amount(32) ‖ nonce(32) ‖ sourceChainId(32) ‖ destinationChainId(32)`
//! and hashed with keccak-256; the signer signs its EIP-191 form.

use ethers::types::{Address, RecoveryMessage, Signature, U256};
use ethers::utils::{hash_message, keccak256};
use rand::Rng;
use std::str::FromStr;
use std::sync::Arc;

use crate::common::error::RelayError;
use crate::common::logging::log_attestation_event;
use crate::signer::SignerChain;
use crate::types::deposit::{now_millis, Attestation};

/// Length of the packed receipt pre-image
pub const RECEIPT_PREIMAGE_LEN: usize = 20 + 32 * 4;

/// Everything the receipt hash commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptDescriptor {
    pub amount: u128,
    pub nonce: u128,
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    pub destination_contract: Address,
}

fn push_word(buf: &mut Vec<u8>, value: U256) {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    buf.extend_from_slice(&word);
}

/// Packed pre-image
pub fn receipt_preimage(receipt: &ReceiptDescriptor) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECEIPT_PREIMAGE_LEN);
    buf.extend_from_slice(receipt.destination_contract.as_bytes());
    push_word(&mut buf, U256::from(receipt.amount));
    push_word(&mut buf, U256::from(receipt.nonce));
    push_word(&mut buf, U256::from(receipt.source_chain_id));
    push_word(&mut buf, U256::from(receipt.destination_chain_id));
    buf
}

/// Canonical receipt hash
pub fn receipt_digest(receipt: &ReceiptDescriptor) -> [u8; 32] {
    keccak256(receipt_preimage(receipt))
}

/// Recover the address that signed the EIP-191 form of `digest`
pub fn recover_receipt_signer(
    digest: &[u8; 32],
    signature: &Signature,
) -> Result<Address, RelayError> {
    let message_hash = hash_message(digest);
    signature
        .recover(RecoveryMessage::Hash(message_hash))
        .map_err(|e| RelayError::validation(format!("unrecoverable signature: {}", e)))
}

/// Check that `signature` over `receipt` was produced by `expected`
pub fn verify_receipt_signature(
    receipt: &ReceiptDescriptor,
    signature: &Signature,
    expected: Address,
) -> Result<(), RelayError> {
    let recovered = recover_receipt_signer(&receipt_digest(receipt), signature)?;
    // Address equality is byte equality, so checksum casing never matters
    if recovered != expected {
        return Err(RelayError::SignatureMismatch {
            expected: format!("{:?}", expected),
            recovered: format!("{:?}", recovered),
        });
    }
    Ok(())
}

/// Parse a 65-byte signature given as hex, with or without `0x`
pub fn parse_signature(raw: &str) -> Result<Signature, RelayError> {
    let unprefixed = raw.trim().trim_start_matches("0x");
    Signature::from_str(unprefixed)
        .map_err(|e| RelayError::validation(format!("malformed signature: {}", e)))
}

/// Fresh receipt nonce: milliseconds scaled by 10^6 plus a random suffix
pub fn generate_nonce() -> u128 {
    let suffix: u128 = rand::thread_rng().gen_range(0..1_000_000);
    u128::from(now_millis()) * 1_000_000 + suffix
}

/// Receipt-backed attestation source
pub struct ReceiptSource {
    signers: Arc<SignerChain>,
    trusted_signer: Option<Address>,
}

impl ReceiptSource {
    pub fn new(signers: Arc<SignerChain>, trusted_signer: Option<Address>) -> Self {
        Self {
            signers,
            trusted_signer,
        }
    }

    /// Configured trusted signer, or the active signer's own address
    pub async fn expected_signer(&self) -> Result<Address, RelayError> {
        match self.trusted_signer {
            Some(address) => Ok(address),
            None => Ok(self.signers.get().await?.address()),
        }
    }

    /// Sign the receipt and verify the result before handing it out
    pub async fn acquire(&self, receipt: &ReceiptDescriptor) -> Result<Attestation, RelayError> {
        let key = receipt.nonce.to_string();
        let digest = receipt_digest(receipt);

        let signer = self.signers.get().await?;
        let signature = signer.sign_message(&digest).await?;
        let expected = self.trusted_signer.unwrap_or_else(|| signer.address());

        if let Err(e) = verify_receipt_signature(receipt, &signature, expected) {
            log_attestation_event("receipt_self_check_failed", &key, None, false, Some(&e.to_string()));
            return Err(e);
        }

        log_attestation_event("receipt_signed", &key, None, true, None);
        Ok(Attestation::Receipt {
            signature: format!("0x{}", hex::encode(signature.to_vec())),
        })
    }
}
