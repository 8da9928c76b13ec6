//! Redemption
//!
//! Submits attested deposits to the destination network.
//!
//! # Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    REDEMPTION FLOW                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  1. BUILDING                                                    │
//! │     └── Oracle:  receiveMessage(message, attestation)           │
//! │     └── Receipt: redeemReceipt(amount, nonce, src, signature)   │
//! │                                                                 │
//! │  2. ESTIMATING                                                  │
//! │     └── eth_estimateGas from the relay wallet                   │
//! │     └── Revert here = GasEstimationFailed, nothing is sent      │
//! │                                                                 │
//! │  3. SUBMITTING                                                  │
//! │     └── Active signer signs and broadcasts                      │
//! │                                                                 │
//! │  4. SUBMITTED                                                   │
//! │     └── Optional bounded wait for the receipt                   │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The destination contract's replay guard is what makes redemption
//! idempotent; nothing here retries on its own.

pub mod calls;
pub mod executor;
pub mod rpc;

pub use calls::{decode_bool_return, encode_used_nonces_query, RedemptionCall};
pub use executor::{apply_gas_margin, RedemptionExecutor, RedemptionStage};
pub use rpc::{CallRequest, ChainRpc, EthersRpc, RpcError};
