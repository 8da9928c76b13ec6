//! Structured Logging
//!
//! Production-ready structured logging with:
//! - JSON output for log aggregation
//! - Correlation IDs tying poll attempts and redemption stages to a deposit
//!
//! # Usage
//!
//! ```rust,ignore
//! use bridge_relay::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?; // JSON mode for production
//! tracing::info!(target: "relay::redemption", deposit_id = %id, "Submitting");
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Ledger insertions and consumption
    Deposit,
    /// Oracle polling and receipt signing
    Attestation,
    /// Redemption stages
    Redemption,
    /// Signer selection and fallback
    Signer,
    /// Startup, shutdown
    System,
    Error,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    /// Usually the deposit id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    /// Serialize this event to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Domain Event Logging
// ============================================================================

/// Log a deposit event
pub fn log_deposit_event(
    event_type: &str,
    deposit_id: &str,
    amount: u128,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Deposit, event_type)
        .with_correlation_id(deposit_id)
        .with_data(serde_json::json!({
            "deposit_id": deposit_id,
            // u128 is not representable in every JSON consumer
            "amount": amount.to_string(),
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("DEPOSIT_ERROR", err);
    }

    if success {
        tracing::info!(target: "relay::deposit", "{}", event.to_json());
    } else {
        tracing::error!(target: "relay::deposit", "{}", event.to_json());
    }
}

/// Log an attestation event
///
/// Failures are logged at warn.
pub fn log_attestation_event(
    event_type: &str,
    key: &str,
    attempt: Option<u32>,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Attestation, event_type)
        .with_correlation_id(key)
        .with_data(serde_json::json!({
            "key": key,
            "attempt": attempt,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("ATTESTATION_ERROR", err);
    }

    if success {
        tracing::info!(target: "relay::attestation", "{}", event.to_json());
    } else {
        tracing::warn!(target: "relay::attestation", "{}", event.to_json());
    }
}

/// Log a redemption stage transition
pub fn log_redemption_event(
    stage: &str,
    network: &str,
    correlation_id: &str,
    tx_hash: Option<&str>,
    duration_ms: Option<u64>,
    error: Option<(&str, &str)>,
) {
    let level = if error.is_some() { LogLevel::Error } else { LogLevel::Info };
    let mut event = LogEvent::new(level, EventCategory::Redemption, stage)
        .with_correlation_id(correlation_id)
        .with_data(serde_json::json!({
            "network": network,
            "stage": stage,
            "tx_hash": tx_hash
        }));

    if let Some(ms) = duration_ms {
        event = event.with_duration(ms);
    }
    if let Some((code, message)) = error {
        event = event.with_error(code, message);
    }

    match level {
        LogLevel::Error => tracing::error!(target: "relay::redemption", "{}", event.to_json()),
        _ => tracing::info!(target: "relay::redemption", "{}", event.to_json()),
    }
}

/// Log signer selection
pub fn log_signer_event(
    event_type: &str,
    signer_type: &str,
    address: Option<&str>,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Signer, event_type).with_data(
        serde_json::json!({
            "signer_type": signer_type,
            "address": address,
            "success": success
        }),
    );

    if let Some(err) = error {
        event = event.with_error("SIGNER_ERROR", err);
    }

    if success {
        tracing::info!(target: "relay::signer", "{}", event.to_json());
    } else {
        tracing::warn!(target: "relay::signer", "{}", event.to_json());
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let level_str = format!("{:?}", level).to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("relay={},bridge_relay={}", level_str, level_str))
    });

    if json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from RelayConfig
pub fn init_from_config(config: &super::config::RelayConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), config.log_json)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID
pub fn generate_correlation_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis() as u64;
    format!("{:x}-{:04x}", millis & 0xFFFF_FFFF, rand::random::<u16>())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Redemption, "submitted")
            .with_correlation_id("tx123-1700000000000")
            .with_data(serde_json::json!({"network": "base-sepolia"}))
            .with_duration(42);

        let json = event.to_json();
        assert!(json.contains("submitted"));
        assert!(json.contains("tx123-1700000000000"));
        assert!(json.contains("\"category\":\"redemption\""));
        assert!(json.contains("42"));
    }

    #[test]
    fn test_error_details_serialization() {
        let event = LogEvent::new(LogLevel::Error, EventCategory::Error, "estimate")
            .with_error("GAS_ESTIMATION_FAILED", "execution reverted: already redeemed");
        let json = event.to_json();
        assert!(json.contains("GAS_ESTIMATION_FAILED"));
        assert!(json.contains("already redeemed"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_id_generation() {
        let id = generate_correlation_id();
        assert!(id.contains('-'));
        assert!(!id.is_empty());
    }
}
