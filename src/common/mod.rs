//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the relay.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - The root error type
//! - Input validation helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

// Re-exports for convenience
pub use config::{AccountRef, ConfigError, CustodyConfig, NetworkConfig, RelayConfig};
pub use error::{RelayError, Result};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_attestation_event,
    log_deposit_event, log_redemption_event, log_signer_event, ErrorDetails, EventCategory,
    LogEvent, LogLevel, LoggingError,
};
pub use validation::ValidationResult;
