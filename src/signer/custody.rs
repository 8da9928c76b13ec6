//! Custody-Backed Signer
//!
//! Delegates signing and broadcast to a custody service. The key never
//! leaves the service; the relay only holds an API token and an account
//! reference.

use async_trait::async_trait;
use ethers::types::{Address, Signature, H256};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use super::{RemoteSigner, SignerError, TxRequest};
use crate::common::config::{AccountRef, CustodyConfig, NetworkConfig};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Account as reported by the custody service
#[derive(Debug, Clone, Deserialize)]
struct AccountInfo {
    id: String,
    #[serde(default)]
    name: Option<String>,
    address: String,
}

#[derive(Debug, Deserialize)]
struct AccountList {
    accounts: Vec<AccountInfo>,
}

#[derive(Debug, Serialize)]
struct SignMessageRequest {
    /// 0x-hex of the raw message
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct SignMessageResponse {
    signature: String,
}

#[derive(Debug, Serialize)]
struct SubmitTransactionRequest {
    chain_id: u64,
    to: String,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas_limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitTransactionResponse {
    tx_hash: String,
}

/// Signer that proxies every operation to the custody service
pub struct CustodySigner {
    http_client: reqwest::Client,
    base_url: String,
    api_token: String,
    account_id: String,
    address: Address,
}

impl CustodySigner {
    /// Authenticate and resolve the configured account
    ///
    /// Fails with `MissingCredentials` or `AccountNotFound` before any signing
    /// can happen.
    pub async fn connect(config: &CustodyConfig) -> Result<Self, SignerError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SignerError::MissingCredentials(
                "RELAY_CUSTODY_URL not set".to_string(),
            ));
        }
        let api_token = config.api_token.clone().ok_or_else(|| {
            SignerError::MissingCredentials("RELAY_CUSTODY_API_TOKEN not set".to_string())
        })?;
        let account = config.account.clone().ok_or_else(|| {
            SignerError::MissingCredentials(
                "RELAY_CUSTODY_ACCOUNT_ID or RELAY_CUSTODY_ACCOUNT_NAME not set".to_string(),
            )
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| SignerError::Custody(e.to_string()))?;

        let info = resolve_account(&http_client, &base_url, &api_token, &account).await?;
        let address = Address::from_str(&info.address).map_err(|e| {
            SignerError::Custody(format!("account {} has invalid address: {}", info.id, e))
        })?;

        tracing::debug!(
            account_id = %info.id,
            account_name = ?info.name,
            address = ?address,
            "Custody account resolved"
        );

        Ok(Self {
            http_client,
            base_url,
            api_token,
            account_id: info.id,
            address,
        })
    }

    fn account_url(&self, suffix: &str) -> String {
        format!("{}/v1/accounts/{}/{}", self.base_url, self.account_id, suffix)
    }
}

async fn resolve_account(
    client: &reqwest::Client,
    base_url: &str,
    api_token: &str,
    account: &AccountRef,
) -> Result<AccountInfo, SignerError> {
    match account {
        AccountRef::Id(id) => {
            let response = client
                .get(format!("{}/v1/accounts/{}", base_url, id))
                .bearer_auth(api_token)
                .send()
                .await
                .map_err(|e| SignerError::Custody(e.to_string()))?;

            let status = response.status();
            match status {
                StatusCode::NOT_FOUND => Err(SignerError::AccountNotFound(id.clone())),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                    SignerError::MissingCredentials("custody service rejected the API token".to_string()),
                ),
                _ if !status.is_success() => Err(error_from_response(status, response).await),
                _ => response
                    .json::<AccountInfo>()
                    .await
                    .map_err(|e| SignerError::Custody(e.to_string())),
            }
        }
        AccountRef::Name(name) => {
            let response = client
                .get(format!("{}/v1/accounts", base_url))
                .query(&[("name", name.as_str())])
                .bearer_auth(api_token)
                .send()
                .await
                .map_err(|e| SignerError::Custody(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(SignerError::MissingCredentials(
                    "custody service rejected the API token".to_string(),
                ));
            }
            if !status.is_success() {
                return Err(error_from_response(status, response).await);
            }

            let list: AccountList = response
                .json()
                .await
                .map_err(|e| SignerError::Custody(e.to_string()))?;

            select_account_by_name(list.accounts, name)
        }
    }
}

/// Exact name match wins; the service may return fuzzy matches
fn select_account_by_name(
    accounts: Vec<AccountInfo>,
    name: &str,
) -> Result<AccountInfo, SignerError> {
    accounts
        .into_iter()
        .find(|a| a.name.as_deref() == Some(name))
        .ok_or_else(|| SignerError::AccountNotFound(name.to_string()))
}

async fn error_from_response(status: StatusCode, response: reqwest::Response) -> SignerError {
    let body = response.text().await.unwrap_or_default();
    SignerError::Custody(format!("{}: {}", status, body))
}

fn parse_signature(raw: &str) -> Result<Signature, SignerError> {
    let unprefixed = raw.trim().trim_start_matches("0x");
    Signature::from_str(unprefixed)
        .map_err(|e| SignerError::SigningFailed(format!("malformed signature: {}", e)))
}

#[async_trait]
impl RemoteSigner for CustodySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        let request = SignMessageRequest {
            message: format!("0x{}", hex::encode(message)),
            kind: "personal_sign",
        };

        let response = self
            .http_client
            .post(self.account_url("sign-message"))
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignerError::SigningFailed(format!("{}: {}", status, body)));
        }

        let body: SignMessageResponse = response
            .json()
            .await
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

        parse_signature(&body.signature)
    }

    async fn submit_transaction(
        &self,
        network: &NetworkConfig,
        tx: TxRequest,
    ) -> Result<H256, SignerError> {
        let request = SubmitTransactionRequest {
            chain_id: network.chain_id,
            to: format!("{:?}", tx.to),
            data: format!("0x{}", hex::encode(&tx.data)),
            value: tx.value.map(|v| v.to_string()),
            gas_limit: tx.gas_limit.map(|g| g.to_string()),
        };
        let idempotency_key = uuid::Uuid::new_v4().to_string();

        tracing::debug!(
            network = %network.name,
            idempotency_key = %idempotency_key,
            "Submitting transaction through custody"
        );

        let response = self
            .http_client
            .post(self.account_url("transactions"))
            .bearer_auth(&self.api_token)
            .header("Idempotency-Key", idempotency_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SignerError::SubmissionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignerError::SubmissionFailed(format!("{}: {}", status, body)));
        }

        let body: SubmitTransactionResponse = response
            .json()
            .await
            .map_err(|e| SignerError::SubmissionFailed(e.to_string()))?;

        H256::from_str(body.tx_hash.trim())
            .map_err(|e| SignerError::SubmissionFailed(format!("malformed tx hash: {}", e)))
    }

    fn signer_type(&self) -> &'static str {
        "custody"
    }
}
