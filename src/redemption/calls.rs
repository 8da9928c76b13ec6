//! Destination contract calls
//!
//! ABI encoding for the two redemption entry points and the nonce registry
//! view.

use ethers::abi::{ParamType, Token};
use ethers::types::{Bytes, U256};

use crate::common::error::RelayError;
use crate::types::deposit::Attestation;

pub const RECEIVE_MESSAGE_SIG: &str = "receiveMessage(bytes,bytes)";
pub const REDEEM_RECEIPT_SIG: &str = "redeemReceipt(uint256,uint256,uint256,bytes)";
pub const USED_NONCES_SIG: &str = "usedNonces(uint256)";

/// A redemption call against a destination contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionCall {
    /// Oracle path, sent to the message transmitter
    ReceiveMessage { message: Bytes, attestation: Bytes },
    /// Receipt path, sent to the receipt contract
    RedeemReceipt {
        amount: u128,
        nonce: u128,
        source_chain_id: u64,
        signature: Bytes,
    },
}

impl RedemptionCall {
    /// Build the oracle call from a stored attestation
    pub fn from_attestation(attestation: &Attestation) -> Result<Self, RelayError> {
        match attestation {
            Attestation::Oracle { message, proof, .. } => Ok(Self::ReceiveMessage {
                message: decode_hex_field(message, "message")?,
                attestation: decode_hex_field(proof, "attestation")?,
            }),
            Attestation::Receipt { .. } => Err(RelayError::validation(
                "receipt attestations need amount, nonce and source chain to build a call",
            )),
        }
    }

    pub fn function_signature(&self) -> &'static str {
        match self {
            Self::ReceiveMessage { .. } => RECEIVE_MESSAGE_SIG,
            Self::RedeemReceipt { .. } => REDEEM_RECEIPT_SIG,
        }
    }

    /// Calldata: 4-byte selector followed by the ABI-encoded arguments
    pub fn encode(&self) -> Bytes {
        let tokens = match self {
            Self::ReceiveMessage {
                message,
                attestation,
            } => vec![
                Token::Bytes(message.to_vec()),
                Token::Bytes(attestation.to_vec()),
            ],
            Self::RedeemReceipt {
                amount,
                nonce,
                source_chain_id,
                signature,
            } => vec![
                Token::Uint(U256::from(*amount)),
                Token::Uint(U256::from(*nonce)),
                Token::Uint(U256::from(*source_chain_id)),
                Token::Bytes(signature.to_vec()),
            ],
        };

        with_selector(self.function_signature(), &tokens)
    }
}

fn with_selector(signature: &str, tokens: &[Token]) -> Bytes {
    let mut calldata = ethers::utils::id(signature).to_vec();
    calldata.extend_from_slice(&ethers::abi::encode(tokens));
    Bytes::from(calldata)
}

/// Calldata for `usedNonces(nonce)`
pub fn encode_used_nonces_query(nonce: u128) -> Bytes {
    with_selector(USED_NONCES_SIG, &[Token::Uint(U256::from(nonce))])
}

/// Decode a single ABI `bool` return value
pub fn decode_bool_return(data: &[u8]) -> Result<bool, RelayError> {
    let tokens = ethers::abi::decode(&[ParamType::Bool], data)
        .map_err(|e| RelayError::Rpc(format!("unexpected return data: {}", e)))?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_bool)
        .ok_or_else(|| RelayError::Rpc("missing bool return value".to_string()))
}

/// Decode a non-empty 0x-hex field
pub fn decode_hex_field(value: &str, field: &str) -> Result<Bytes, RelayError> {
    let trimmed = value.trim();
    let unprefixed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if unprefixed.is_empty() {
        return Err(RelayError::validation(format!("{} is empty", field)));
    }
    hex::decode(unprefixed)
        .map(Bytes::from)
        .map_err(|e| RelayError::validation(format!("{} is not valid hex: {}", field, e)))
}
