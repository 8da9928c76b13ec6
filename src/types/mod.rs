//! Shared Types Module
//!
//! Data types shared across the relay.

pub mod deposit;
pub mod units;

// Re-exports for convenience
pub use deposit::{
    canonical_natural_key, now_millis, Attestation, BridgePath, ConsumedDeposit, DepositCandidate, DepositRecord,
    SourceDescriptor,
};
pub use units::{format_units, parse_amount, parse_units, units_to_display, TOKEN_DECIMALS};
