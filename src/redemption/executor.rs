//! Redemption Executor
//!
//! Builds, estimates and submits a single redemption transaction. Every
//! attempt walks `Building → Estimating → Submitting → Submitted`, or stops
//! in `Failed`. There is no automatic retry: a failed estimate usually means
//! the deposit was already redeemed, and the caller decides what to do.

use ethers::types::{Address, H256, U256};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::calls::RedemptionCall;
use super::rpc::{CallRequest, ChainRpc, RpcError};
use crate::common::config::{NetworkConfig, RelayConfig};
use crate::common::error::RelayError;
use crate::common::logging::{generate_correlation_id, log_redemption_event};
use crate::signer::{SignerChain, SignerError, TxRequest};

const DEFAULT_CONFIRMATION_POLL: Duration = Duration::from_secs(3);

/// Redemption stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionStage {
    Building,
    Estimating,
    Submitting,
    Submitted,
    Failed,
}

impl RedemptionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Estimating => "estimating",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RedemptionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scale a gas estimate by `percent` (never below the estimate)
pub fn apply_gas_margin(estimate: U256, percent: u64) -> U256 {
    let percent = percent.max(100);
    estimate.saturating_mul(U256::from(percent)) / U256::from(100u64)
}

/// Redemption executor
pub struct RedemptionExecutor {
    rpc: Arc<dyn ChainRpc>,
    signers: Arc<SignerChain>,
    gas_margin_percent: u64,
    network_timeout: Duration,
    confirmation_poll: Duration,
}

impl RedemptionExecutor {
    pub fn new(rpc: Arc<dyn ChainRpc>, signers: Arc<SignerChain>) -> Self {
        Self {
            rpc,
            signers,
            gas_margin_percent: 120,
            network_timeout: Duration::from_secs(45),
            confirmation_poll: DEFAULT_CONFIRMATION_POLL,
        }
    }

    pub fn from_config(
        rpc: Arc<dyn ChainRpc>,
        signers: Arc<SignerChain>,
        config: &RelayConfig,
    ) -> Self {
        Self::new(rpc, signers)
            .with_gas_margin(config.gas_margin_percent)
            .with_network_timeout(config.network_timeout)
    }

    pub fn with_gas_margin(mut self, percent: u64) -> Self {
        self.gas_margin_percent = percent;
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn with_confirmation_poll(mut self, interval: Duration) -> Self {
        self.confirmation_poll = interval;
        self
    }

    /// Build, estimate and submit `call` against `contract`
    ///
    /// Returns as soon as the transaction is broadcast.
    pub async fn redeem(
        &self,
        network: &NetworkConfig,
        contract: Address,
        call: &RedemptionCall,
    ) -> Result<H256, RelayError> {
        let correlation_id = generate_correlation_id();
        let started = Instant::now();

        match self.run(network, contract, call, &correlation_id).await {
            Ok(tx_hash) => {
                log_redemption_event(
                    RedemptionStage::Submitted.as_str(),
                    &network.name,
                    &correlation_id,
                    Some(&format!("{:?}", tx_hash)),
                    Some(started.elapsed().as_millis() as u64),
                    None,
                );
                Ok(tx_hash)
            }
            Err(e) => {
                log_redemption_event(
                    RedemptionStage::Failed.as_str(),
                    &network.name,
                    &correlation_id,
                    None,
                    Some(started.elapsed().as_millis() as u64),
                    Some((e.error_code(), &e.to_string())),
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        network: &NetworkConfig,
        contract: Address,
        call: &RedemptionCall,
        correlation_id: &str,
    ) -> Result<H256, RelayError> {
        let stage = |stage: RedemptionStage| {
            log_redemption_event(stage.as_str(), &network.name, correlation_id, None, None, None);
        };

        stage(RedemptionStage::Building);
        let signer = self.signers.get().await?;
        let data = call.encode();
        tracing::debug!(
            function = call.function_signature(),
            contract = ?contract,
            sender = ?signer.address(),
            "Built redemption call"
        );

        stage(RedemptionStage::Estimating);
        let request = CallRequest::new(contract, data.clone()).with_sender(signer.address());
        let estimate = match self.bounded(self.rpc.estimate_gas(network, &request)).await {
            Ok(gas) => gas,
            Err(RpcError::Reverted(reason)) => return Err(RelayError::GasEstimationFailed(reason)),
            Err(other) => return Err(other.into()),
        };
        let gas_limit = apply_gas_margin(estimate, self.gas_margin_percent);

        stage(RedemptionStage::Submitting);
        let tx = TxRequest {
            to: contract,
            data,
            value: None,
            gas_limit: Some(gas_limit),
        };
        let submission = tokio::time::timeout(
            self.network_timeout,
            signer.submit_transaction(network, tx),
        )
        .await
        .map_err(|_| {
            RelayError::SubmissionFailed(format!(
                "no answer after {}s",
                self.network_timeout.as_secs()
            ))
        })?;

        submission.map_err(|e| match e {
            SignerError::SubmissionFailed(msg) => RelayError::SubmissionFailed(msg),
            SignerError::Unavailable(msg) => RelayError::SignerUnavailable(msg),
            other => RelayError::SubmissionFailed(other.to_string()),
        })
    }

    /// Redeem, then wait up to `timeout` for the transaction to be mined
    pub async fn redeem_and_wait(
        &self,
        network: &NetworkConfig,
        contract: Address,
        call: &RedemptionCall,
        timeout: Duration,
    ) -> Result<H256, RelayError> {
        let tx_hash = self.redeem(network, contract, call).await?;
        self.wait_for_confirmation(network, tx_hash, timeout).await?;
        Ok(tx_hash)
    }

    /// Poll the receipt until success, revert or `timeout`
    pub async fn wait_for_confirmation(
        &self,
        network: &NetworkConfig,
        tx_hash: H256,
        timeout: Duration,
    ) -> Result<(), RelayError> {
        let waiting = async {
            loop {
                match self.bounded(self.rpc.transaction_status(network, tx_hash)).await {
                    Ok(Some(true)) => return Ok(()),
                    Ok(Some(false)) => {
                        return Err(RelayError::TransactionReverted(format!("{:?}", tx_hash)))
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(tx_hash = ?tx_hash, error = %e, "Receipt lookup failed");
                    }
                }
                tokio::time::sleep(self.confirmation_poll).await;
            }
        };

        match tokio::time::timeout(timeout, waiting).await {
            Ok(result) => {
                if result.is_ok() {
                    tracing::info!(network = %network.name, tx_hash = ?tx_hash, "Redemption confirmed");
                }
                result
            }
            Err(_) => Err(RelayError::ConfirmationTimeout {
                tx_hash: format!("{:?}", tx_hash),
                waited_secs: timeout.as_secs(),
            }),
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, RpcError>
    where
        F: Future<Output = Result<T, RpcError>>,
    {
        tokio::time::timeout(self.network_timeout, fut)
            .await
            .map_err(|_| RpcError::Timeout(self.network_timeout.as_secs()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redemption::rpc::MockChainRpc;
    use crate::signer::MockRemoteSigner;
    use ethers::types::Bytes;

    const ALREADY_REDEEMED: &str = "execution reverted: already redeemed";

    fn network() -> NetworkConfig {
        NetworkConfig {
            name: "base-sepolia".to_string(),
            label: "Base Sepolia".to_string(),
            chain_id: 84532,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            oracle_domain: Some(6),
            message_transmitter: None,
            receipt_contract: None,
        }
    }

    fn call() -> RedemptionCall {
        RedemptionCall::ReceiveMessage {
            message: Bytes::from(vec![1, 2, 3]),
            attestation: Bytes::from(vec![4, 5, 6]),
        }
    }

    fn signer_mock() -> MockRemoteSigner {
        let mut signer = MockRemoteSigner::new();
        signer.expect_address().return_const(Address::repeat_byte(0xaa));
        signer.expect_signer_type().return_const("mock");
        signer
    }

    fn executor(rpc: MockChainRpc, signer: MockRemoteSigner) -> RedemptionExecutor {
        let chain = Arc::new(SignerChain::with_signer(Arc::new(signer)));
        RedemptionExecutor::new(Arc::new(rpc), chain)
            .with_network_timeout(Duration::from_millis(200))
            .with_confirmation_poll(Duration::from_millis(5))
    }

    #[test]
    fn test_gas_margin() {
        assert_eq!(apply_gas_margin(U256::from(100_000u64), 120), U256::from(120_000u64));
        assert_eq!(apply_gas_margin(U256::from(100_000u64), 50), U256::from(100_000u64));
        assert_eq!(apply_gas_margin(U256::MAX, 200), U256::MAX / U256::from(100u64));
    }

    #[tokio::test]
    async fn test_revert_reason_is_verbatim_and_nothing_submitted() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_estimate_gas()
            .times(1)
            .returning(|_, _| Err(RpcError::Reverted(ALREADY_REDEEMED.to_string())));

        let mut signer = signer_mock();
        signer.expect_submit_transaction().never();

        let result = executor(rpc, signer)
            .redeem(&network(), Address::repeat_byte(0x11), &call())
            .await;

        match result {
            Err(RelayError::GasEstimationFailed(reason)) => assert_eq!(reason, ALREADY_REDEEMED),
            other => panic!("expected GasEstimationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submits_with_margin() {
        let contract = Address::repeat_byte(0x11);
        let tx_hash = H256::repeat_byte(0x42);

        let mut rpc = MockChainRpc::new();
        rpc.expect_estimate_gas()
            .withf(move |_, req| req.to == contract && req.from == Some(Address::repeat_byte(0xaa)))
            .returning(|_, _| Ok(U256::from(100_000u64)));

        let mut signer = signer_mock();
        signer
            .expect_submit_transaction()
            .withf(move |net, tx| {
                net.chain_id == 84532
                    && tx.to == contract
                    && tx.gas_limit == Some(U256::from(120_000u64))
                    && tx.data == call().encode()
            })
            .times(1)
            .returning(move |_, _| Ok(tx_hash));

        let result = executor(rpc, signer)
            .redeem(&network(), contract, &call())
            .await
            .unwrap();
        assert_eq!(result, tx_hash);
    }

    #[tokio::test]
    async fn test_submission_failure() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_estimate_gas().returning(|_, _| Ok(U256::from(21_000u64)));

        let mut signer = signer_mock();
        signer
            .expect_submit_transaction()
            .returning(|_, _| Err(SignerError::SubmissionFailed("nonce too low".to_string())));

        let result = executor(rpc, signer)
            .redeem(&network(), Address::repeat_byte(0x11), &call())
            .await;
        assert!(matches!(result, Err(RelayError::SubmissionFailed(msg)) if msg == "nonce too low"));
    }

    #[tokio::test]
    async fn test_estimation_transport_error_is_rpc() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_estimate_gas()
            .returning(|_, _| Err(RpcError::Transport("connection refused".to_string())));

        let mut signer = signer_mock();
        signer.expect_submit_transaction().never();

        let result = executor(rpc, signer)
            .redeem(&network(), Address::repeat_byte(0x11), &call())
            .await;
        assert!(matches!(result, Err(RelayError::Rpc(_))));
    }

    #[tokio::test]
    async fn test_wait_for_confirmation() {
        let mut rpc = MockChainRpc::new();
        let mut polls = 0;
        rpc.expect_transaction_status().returning(move |_, _| {
            polls += 1;
            Ok(if polls < 3 { None } else { Some(true) })
        });

        let exec = executor(rpc, signer_mock());
        exec.wait_for_confirmation(&network(), H256::zero(), Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_reports_revert_and_timeout() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_transaction_status().returning(|_, _| Ok(Some(false)));
        let exec = executor(rpc, signer_mock());
        let reverted = exec
            .wait_for_confirmation(&network(), H256::zero(), Duration::from_secs(5))
            .await;
        assert!(matches!(reverted, Err(RelayError::TransactionReverted(_))));

        let mut rpc = MockChainRpc::new();
        rpc.expect_transaction_status().returning(|_, _| Ok(None));
        let exec = executor(rpc, signer_mock());
        let pending = exec
            .wait_for_confirmation(&network(), H256::zero(), Duration::from_millis(30))
            .await;
        assert!(matches!(pending, Err(RelayError::ConfirmationTimeout { .. })));
    }
}
