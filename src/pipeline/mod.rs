//! Pipeline
//!
//! `PipelineCoordinator` exposes every relay operation and dispatches between
//! the oracle and receipt paths.

pub mod coordinator;
pub mod guard;

pub use coordinator::{
    PipelineCoordinator, RedeemOutcome, RedeemProof, RedeemRequest, SignerStatus,
};
pub use guard::{InFlightGuard, InFlightPermit};
