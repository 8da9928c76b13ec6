//! Oracle Attestation Source
//!
//! Polls the attestation oracle for the message/proof pair of a source-chain
//! burn: `GET {base}/{domain}?transactionHash={hash}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::common::config::RelayConfig;
use crate::common::error::RelayError;
use crate::common::logging::log_attestation_event;
use crate::types::deposit::Attestation;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Oracle client errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("oracle returned status {0}: {1}")]
    Status(u16, String),

    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),
}

/// One entry of the oracle's `messages` array
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OracleMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub attestation: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<OracleMessage>,
}

/// Transport seam for the oracle
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AttestationApi: Send + Sync {
    /// Messages for a source transaction; `None` when the oracle answers 404
    async fn fetch_messages(
        &self,
        domain: u32,
        tx_hash: &str,
    ) -> Result<Option<Vec<OracleMessage>>, OracleError>;
}

/// reqwest-backed oracle client
pub struct OracleHttpClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OracleHttpClient {
    pub fn new(base_url: &str) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AttestationApi for OracleHttpClient {
    async fn fetch_messages(
        &self,
        domain: u32,
        tx_hash: &str,
    ) -> Result<Option<Vec<OracleMessage>>, OracleError> {
        let url = format!("{}/{}", self.base_url, domain);
        let response = self
            .http_client
            .get(&url)
            .query(&[("transactionHash", tx_hash)])
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status(status.as_u16(), body));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        Ok(Some(body.messages))
    }
}

/// Result of a single oracle query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    Ready(Attestation),
    Pending(String),
    Failed(String),
}

/// Map an oracle answer onto an outcome
///
/// Only the first message of a transaction is considered. A "complete" entry
/// whose message or attestation is still blank counts as pending.
pub fn interpret_messages(messages: Option<Vec<OracleMessage>>) -> OracleOutcome {
    let messages = match messages {
        None => return OracleOutcome::Pending("transaction not indexed yet".to_string()),
        Some(m) => m,
    };
    let first = match messages.into_iter().next() {
        None => return OracleOutcome::Pending("no messages yet".to_string()),
        Some(m) => m,
    };

    let status = first.status.trim().to_lowercase();
    match status.as_str() {
        "complete" => {
            let message = first.message.unwrap_or_default();
            let proof = first.attestation.unwrap_or_default();
            if is_blank(&message) || is_blank(&proof) {
                return OracleOutcome::Pending("complete but fields not populated".to_string());
            }
            OracleOutcome::Ready(Attestation::Oracle {
                message,
                proof,
                status,
            })
        }
        "" => OracleOutcome::Pending("status unknown".to_string()),
        "pending" | "pending_confirmations" => OracleOutcome::Pending(format!("status {}", status)),
        other => OracleOutcome::Failed(format!("oracle reported status {}", other)),
    }
}

/// Oracle placeholders for data that is not there yet
fn is_blank(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == "0x" || v.eq_ignore_ascii_case("pending")
}

/// Poll budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 30,
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_attempts: config.poll_max_attempts.max(1),
        }
    }
}

/// Oracle-backed attestation source
pub struct OracleSource {
    api: Arc<dyn AttestationApi>,
    policy: PollPolicy,
}

impl OracleSource {
    pub fn new(api: Arc<dyn AttestationApi>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Query the oracle once
    pub async fn acquire(&self, domain: u32, tx_hash: &str) -> Result<OracleOutcome, OracleError> {
        let messages = self.api.fetch_messages(domain, tx_hash).await?;
        Ok(interpret_messages(messages))
    }

    /// Query until ready, failed, out of attempts or cancelled
    ///
    /// Transport errors count as a pending attempt. Holds no lock while
    /// sleeping, so any number of polls may run at once.
    pub async fn poll(
        &self,
        domain: u32,
        tx_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<Attestation, RelayError> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RelayError::Cancelled(format!("polling {} on domain {}", tx_hash, domain)));
                }
                result = self.acquire(domain, tx_hash) => result,
            };

            match outcome {
                Ok(OracleOutcome::Ready(attestation)) => {
                    log_attestation_event("oracle_attestation_ready", tx_hash, Some(attempt), true, None);
                    return Ok(attestation);
                }
                Ok(OracleOutcome::Failed(reason)) => {
                    log_attestation_event(
                        "oracle_attestation_failed",
                        tx_hash,
                        Some(attempt),
                        false,
                        Some(&reason),
                    );
                    return Err(RelayError::AttestationFailed(reason));
                }
                Ok(OracleOutcome::Pending(reason)) => {
                    tracing::debug!(
                        tx_hash = %tx_hash,
                        domain,
                        attempt,
                        max_attempts,
                        reason = %reason,
                        "Attestation pending"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        tx_hash = %tx_hash,
                        domain,
                        attempt,
                        error = %e,
                        "Oracle query failed, treating as pending"
                    );
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(RelayError::Cancelled(format!("polling {} on domain {}", tx_hash, domain)));
                    }
                    _ = tokio::time::sleep(self.policy.interval) => {}
                }
            }
        }

        log_attestation_event(
            "oracle_attestation_timeout",
            tx_hash,
            Some(max_attempts),
            false,
            Some("attempt budget exhausted"),
        );
        Err(RelayError::AttestationTimeout {
            attempts: max_attempts,
        })
    }
}
