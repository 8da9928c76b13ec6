//! Chain RPC
//!
//! Read-only JSON-RPC access to destination networks: gas estimation,
//! `eth_call` views and receipt status. Broadcasting belongs to the signer.

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError as _};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, H256, U256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[cfg(test)]
use mockall::automock;

use crate::common::config::NetworkConfig;

/// Chain RPC errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),

    /// Node rejected the call; carries the node's message verbatim
    #[error("{0}")]
    Reverted(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl From<ProviderError> for RpcError {
    fn from(err: ProviderError) -> Self {
        match err.as_error_response() {
            Some(response) => RpcError::Reverted(response.message.clone()),
            None => RpcError::Transport(err.to_string()),
        }
    }
}

/// Read-only call against a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: Option<U256>,
}

impl CallRequest {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            from: None,
            to,
            data,
            value: None,
        }
    }

    pub fn with_sender(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    fn to_typed(&self, chain_id: u64) -> TypedTransaction {
        let mut request = Eip1559TransactionRequest::new()
            .to(self.to)
            .data(self.data.clone())
            .chain_id(chain_id);
        if let Some(from) = self.from {
            request = request.from(from);
        }
        if let Some(value) = self.value {
            request = request.value(value);
        }
        TypedTransaction::Eip1559(request)
    }
}

/// Trait for destination network access
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn estimate_gas(
        &self,
        network: &NetworkConfig,
        request: &CallRequest,
    ) -> Result<U256, RpcError>;

    async fn call(&self, network: &NetworkConfig, request: &CallRequest) -> Result<Bytes, RpcError>;

    /// `Some(true)` mined and succeeded, `Some(false)` reverted, `None` not mined yet
    async fn transaction_status(
        &self,
        network: &NetworkConfig,
        tx_hash: H256,
    ) -> Result<Option<bool>, RpcError>;
}

/// ethers HTTP provider per network, created on first use
#[derive(Default)]
pub struct EthersRpc {
    providers: Arc<RwLock<HashMap<String, Provider<Http>>>>,
}

impl EthersRpc {
    pub fn new() -> Self {
        Self::default()
    }

    async fn provider(&self, network: &NetworkConfig) -> Result<Provider<Http>, RpcError> {
        if let Some(provider) = self.providers.read().await.get(&network.name) {
            return Ok(provider.clone());
        }

        let provider = Provider::<Http>::try_from(network.rpc_url.as_str())
            .map_err(|e| RpcError::InvalidUrl(format!("{}: {}", network.rpc_url, e)))?;
        self.providers
            .write()
            .await
            .insert(network.name.clone(), provider.clone());
        Ok(provider)
    }
}

#[async_trait]
impl ChainRpc for EthersRpc {
    async fn estimate_gas(
        &self,
        network: &NetworkConfig,
        request: &CallRequest,
    ) -> Result<U256, RpcError> {
        let provider = self.provider(network).await?;
        let tx = request.to_typed(network.chain_id);
        Ok(provider.estimate_gas(&tx, None).await?)
    }

    async fn call(&self, network: &NetworkConfig, request: &CallRequest) -> Result<Bytes, RpcError> {
        let provider = self.provider(network).await?;
        let tx = request.to_typed(network.chain_id);
        Ok(provider.call(&tx, None).await?)
    }

    async fn transaction_status(
        &self,
        network: &NetworkConfig,
        tx_hash: H256,
    ) -> Result<Option<bool>, RpcError> {
        let provider = self.provider(network).await?;
        let receipt = provider.get_transaction_receipt(tx_hash).await?;
        // Pre-Byzantium receipts carry no status; treat them as success
        Ok(receipt.map(|r| r.status.map_or(true, |s| s.as_u64() == 1)))
    }
}
