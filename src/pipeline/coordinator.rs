//! Pipeline Coordinator
//!
//! Entry point for every relay operation. Tracks deposits through their
//! lifecycle:
//! notified → attested → redeemed (consumed from the ledger)
//!
//! # Flow:
//! 1. Caller notifies a deposit (source tx hash or receipt nonce)
//! 2. Attestation is acquired from the oracle or the trusted signer
//! 3. Redemption is estimated and submitted on the destination network
//! 4. On success the ledger record is consumed

use ethers::types::{Address, Bytes, H256};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::guard::InFlightGuard;
use crate::attestation::{
    generate_nonce, parse_signature, verify_receipt_signature, AttestationApi,
    AttestationDescriptor, OracleHttpClient, OracleSource, PollPolicy, ReceiptDescriptor,
    ReceiptSource,
};
use crate::common::config::{NetworkConfig, RelayConfig};
use crate::common::error::{RelayError, Result};
use crate::common::logging::log_deposit_event;
use crate::common::validation::{
    validate_amount, validate_evm_address, validate_nonce, validate_tx_hash, ValidationResult,
};
use crate::redemption::calls::decode_hex_field;
use crate::redemption::{
    decode_bool_return, encode_used_nonces_query, CallRequest, ChainRpc, EthersRpc, RedemptionCall,
    RedemptionExecutor, RpcError,
};
use crate::signer::SignerChain;
use crate::storage::{open_ledger, DepositLedger, StorageError};
use crate::types::deposit::{
    canonical_natural_key, Attestation, BridgePath, ConsumedDeposit, DepositCandidate, DepositRecord,
};

/// Nonce draws before giving up on finding an unused one
const NONCE_ATTEMPTS: u32 = 5;

/// Proof supplied to `verify_and_redeem`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemProof {
    /// Oracle message and its attestation, both 0x-hex
    Oracle { message: String, attestation: String },
    /// Receipt signature (0x-hex, 65 bytes) and the chain the funds arrived on
    Receipt {
        signature: String,
        source_chain_id: u64,
    },
}

impl RedeemProof {
    pub fn path(&self) -> BridgePath {
        match self {
            Self::Oracle { .. } => BridgePath::Oracle,
            Self::Receipt { .. } => BridgePath::Receipt,
        }
    }
}

/// Redemption request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemRequest {
    /// Destination network name; the default network when `None`
    pub network: Option<String>,
    pub amount: u128,
    /// Source tx hash (oracle) or nonce (receipt)
    pub natural_key: String,
    /// Restricts which ledger record is consumed on success
    pub user_address: Option<String>,
    pub proof: RedeemProof,
    /// Wait for the transaction to be mined before returning
    pub wait: bool,
}

/// Result of a successful redemption
#[derive(Debug, Clone, Serialize)]
pub struct RedeemOutcome {
    pub tx_hash: H256,
    pub network: String,
    /// Ledger record consumed by this redemption, if one was tracked
    pub consumed: Option<ConsumedDeposit>,
}

/// Signer chain state for operators
#[derive(Debug, Clone, Serialize)]
pub struct SignerStatus {
    pub candidates: Vec<&'static str>,
    pub active: Option<&'static str>,
    pub address: Option<Address>,
    pub error: Option<String>,
}

/// Coordinates ledger, attestation sources, signer and executor
pub struct PipelineCoordinator {
    config: RelayConfig,
    ledger: Arc<dyn DepositLedger>,
    oracle: OracleSource,
    receipts: ReceiptSource,
    executor: RedemptionExecutor,
    rpc: Arc<dyn ChainRpc>,
    signers: Arc<SignerChain>,
    in_flight: InFlightGuard,
}

impl PipelineCoordinator {
    /// Wire the pipeline from explicit parts
    pub fn new(
        config: RelayConfig,
        ledger: Arc<dyn DepositLedger>,
        oracle_api: Arc<dyn AttestationApi>,
        rpc: Arc<dyn ChainRpc>,
        signers: Arc<SignerChain>,
    ) -> Self {
        let oracle = OracleSource::new(oracle_api, PollPolicy::from_config(&config));
        let receipts = ReceiptSource::new(Arc::clone(&signers), config.trusted_signer);
        let executor =
            RedemptionExecutor::from_config(Arc::clone(&rpc), Arc::clone(&signers), &config);

        Self {
            config,
            ledger,
            oracle,
            receipts,
            executor,
            rpc,
            signers,
            in_flight: InFlightGuard::new(),
        }
    }

    /// Production wiring: SQLite ledger, HTTP oracle, ethers RPC, configured signers
    ///
    /// Signers are not contacted here.
    pub fn from_config(config: RelayConfig) -> Result<Self> {
        let ledger = open_ledger(&config.ledger_path)?;
        let oracle_api = Arc::new(OracleHttpClient::new(&config.oracle_url)?);
        let rpc = Arc::new(EthersRpc::new());
        let signers = Arc::new(SignerChain::from_config(&config));
        Ok(Self::new(config, ledger, oracle_api, rpc, signers))
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn network(&self, name: Option<&str>) -> Result<&NetworkConfig> {
        match name {
            Some(name) => Ok(self.config.network(name)?),
            None => Ok(self.config.default_network()?),
        }
    }

    // =========================================================================
    // Ledger operations
    // =========================================================================

    /// Record a new deposit
    pub async fn notify_deposit(&self, candidate: DepositCandidate) -> Result<DepositRecord> {
        validate_candidate(&candidate).into_result()?;
        let candidate = candidate.normalized();
        let amount = candidate.amount;
        let natural_key = candidate.natural_key.clone();

        match self.ledger.insert(candidate).await {
            Ok(record) => {
                log_deposit_event("deposit_notified", &record.id, amount, true, None);
                Ok(record)
            }
            Err(e) => {
                log_deposit_event("deposit_notify_failed", &natural_key, amount, false, Some(&e.to_string()));
                Err(e.into())
            }
        }
    }

    pub async fn get_deposit(&self, id: &str) -> Result<DepositRecord> {
        Ok(self.ledger.get_by_id(id).await?)
    }

    /// Unredeemed deposits of one user, newest first
    pub async fn get_unredeemed(&self, user_address: &str) -> Result<Vec<DepositRecord>> {
        validate_evm_address(user_address, "user_address").into_result()?;
        let user = user_address.trim().to_lowercase();
        Ok(self.ledger.list_unredeemed(Some(&user)).await?)
    }

    /// Every unredeemed deposit, newest first
    pub async fn get_all_unredeemed(&self) -> Result<Vec<DepositRecord>> {
        Ok(self.ledger.list_unredeemed(None).await?)
    }

    pub async fn find_deposit(
        &self,
        natural_key: &str,
        user_address: Option<&str>,
    ) -> Result<DepositRecord> {
        let user = user_address.map(|u| u.trim().to_lowercase());
        Ok(self
            .ledger
            .find_by_natural_key(&canonical_natural_key(natural_key), user.as_deref())
            .await?)
    }

    /// Attach an attestation obtained elsewhere
    pub async fn attach_attestation(
        &self,
        id: &str,
        attestation: Attestation,
    ) -> Result<DepositRecord> {
        let record = self.ledger.get_by_id(id).await?;
        if attestation.path() != record.path {
            return Err(RelayError::validation(format!(
                "{} attestation does not fit {} deposit {}",
                attestation.path(),
                record.path,
                id
            )));
        }
        Ok(self.ledger.attach_attestation(id, attestation).await?)
    }

    /// Consume a deposit redeemed outside the relay
    pub async fn mark_redeemed(&self, id: &str, redeem_tx_hash: &str) -> Result<ConsumedDeposit> {
        validate_tx_hash(redeem_tx_hash, "redeem_tx_hash").into_result()?;
        let consumed = self
            .ledger
            .consume_and_delete(id, &redeem_tx_hash.trim().to_lowercase())
            .await?;
        log_deposit_event("deposit_redeemed", id, consumed.deposit.amount, true, None);
        Ok(consumed)
    }

    // =========================================================================
    // Attestation
    // =========================================================================

    /// Acquire an attestation from the source matching `descriptor`
    pub async fn poll_attestation(
        &self,
        descriptor: &AttestationDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Attestation> {
        match descriptor {
            AttestationDescriptor::Oracle {
                source_domain,
                tx_hash,
            } => {
                validate_tx_hash(tx_hash, "tx_hash").into_result()?;
                self.oracle
                    .poll(*source_domain, &tx_hash.trim().to_lowercase(), cancel)
                    .await
            }
            AttestationDescriptor::Receipt(receipt) => {
                validate_amount(receipt.amount, 1, None).into_result()?;
                self.receipts.acquire(receipt).await
            }
        }
    }

    /// Acquire and attach the attestation for a stored deposit
    ///
    /// Returns the record unchanged if it is already attested. `network`
    /// names the destination for receipt deposits.
    pub async fn acquire_for_deposit(
        &self,
        id: &str,
        network: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<DepositRecord> {
        let record = self.ledger.get_by_id(id).await?;
        if record.is_attested() {
            return Ok(record);
        }

        let descriptor = self.descriptor_for(&record, network)?;
        let attestation = self.poll_attestation(&descriptor, cancel).await?;
        Ok(self.ledger.attach_attestation(id, attestation).await?)
    }

    fn descriptor_for(
        &self,
        record: &DepositRecord,
        network: Option<&str>,
    ) -> Result<AttestationDescriptor> {
        match record.path {
            BridgePath::Oracle => {
                let source_domain = record.source.domain.ok_or_else(|| {
                    RelayError::validation(format!("deposit {} has no source domain", record.id))
                })?;
                Ok(AttestationDescriptor::Oracle {
                    source_domain,
                    tx_hash: record.natural_key.clone(),
                })
            }
            BridgePath::Receipt => {
                let destination = self.network(network)?;
                let source_chain_id = record.source.chain_id.ok_or_else(|| {
                    RelayError::validation(format!("deposit {} has no source chain id", record.id))
                })?;
                Ok(AttestationDescriptor::Receipt(ReceiptDescriptor {
                    amount: record.amount,
                    nonce: parse_nonce(&record.natural_key)?,
                    source_chain_id,
                    destination_chain_id: destination.chain_id,
                    destination_contract: destination.require_receipt_contract()?,
                }))
            }
        }
    }

    /// Draw a receipt nonce the destination contract has not seen
    pub async fn issue_receipt_nonce(&self, network: Option<&str>) -> Result<u128> {
        let network = self.network(network)?;
        let contract = network.require_receipt_contract()?;

        for attempt in 1..=NONCE_ATTEMPTS {
            let nonce = generate_nonce();
            let request = CallRequest::new(contract, encode_used_nonces_query(nonce));
            let data = tokio::time::timeout(self.config.network_timeout, self.rpc.call(network, &request))
                .await
                .map_err(|_| RpcError::Timeout(self.config.network_timeout.as_secs()))??;

            if !decode_bool_return(&data)? {
                return Ok(nonce);
            }
            tracing::debug!(network = %network.name, nonce = %nonce, attempt, "Nonce already used, drawing again");
        }

        Err(RelayError::internal(format!(
            "no unused nonce after {} draws",
            NONCE_ATTEMPTS
        )))
    }

    // =========================================================================
    // Redemption
    // =========================================================================

    /// Verify the proof, redeem, and consume the matching ledger record
    ///
    /// A missing ledger record is not an error: the redemption may have been
    /// requested for a deposit the relay never saw.
    pub async fn verify_and_redeem(&self, request: RedeemRequest) -> Result<RedeemOutcome> {
        let path = request.proof.path();
        validate_amount(request.amount, 1, None).into_result()?;
        validate_natural_key(path, &request.natural_key).into_result()?;
        if let Some(user) = &request.user_address {
            validate_evm_address(user, "user_address").into_result()?;
        }

        let natural_key = canonical_natural_key(&request.natural_key);
        let network = self.network(request.network.as_deref())?;

        let guard_key = format!("{}:{}", path, natural_key);
        let _permit = self
            .in_flight
            .try_acquire(&guard_key)
            .ok_or_else(|| RelayError::conflict("redemption already in flight"))?;

        let (contract, call) = match &request.proof {
            RedeemProof::Oracle {
                message,
                attestation,
            } => (
                network.require_message_transmitter()?,
                RedemptionCall::ReceiveMessage {
                    message: decode_hex_field(message, "message")?,
                    attestation: decode_hex_field(attestation, "attestation")?,
                },
            ),
            RedeemProof::Receipt {
                signature,
                source_chain_id,
            } => {
                let contract = network.require_receipt_contract()?;
                let nonce = parse_nonce(&natural_key)?;
                let receipt = ReceiptDescriptor {
                    amount: request.amount,
                    nonce,
                    source_chain_id: *source_chain_id,
                    destination_chain_id: network.chain_id,
                    destination_contract: contract,
                };
                let signature = parse_signature(signature)?;
                let expected = self.receipts.expected_signer().await?;
                verify_receipt_signature(&receipt, &signature, expected)?;

                (
                    contract,
                    RedemptionCall::RedeemReceipt {
                        amount: request.amount,
                        nonce,
                        source_chain_id: *source_chain_id,
                        signature: Bytes::from(signature.to_vec()),
                    },
                )
            }
        };

        let tx_hash = if request.wait {
            self.executor
                .redeem_and_wait(network, contract, &call, self.config.confirmation_timeout)
                .await?
        } else {
            self.executor.redeem(network, contract, &call).await?
        };

        let consumed = self
            .consume_after_redeem(&natural_key, request.user_address.as_deref(), tx_hash)
            .await;

        Ok(RedeemOutcome {
            tx_hash,
            network: network.name.clone(),
            consumed,
        })
    }

    /// Redeem a stored, attested deposit
    pub async fn redeem_deposit(
        &self,
        id: &str,
        network: Option<&str>,
        wait: bool,
    ) -> Result<RedeemOutcome> {
        let record = self.ledger.get_by_id(id).await?;
        let attestation = record.attestation.clone().ok_or_else(|| {
            RelayError::AttestationPending(format!("deposit {} has no attestation yet", id))
        })?;

        let proof = match attestation {
            Attestation::Oracle { message, proof, .. } => RedeemProof::Oracle {
                message,
                attestation: proof,
            },
            Attestation::Receipt { signature } => RedeemProof::Receipt {
                signature,
                source_chain_id: record.source.chain_id.ok_or_else(|| {
                    RelayError::validation(format!("deposit {} has no source chain id", id))
                })?,
            },
        };

        self.verify_and_redeem(RedeemRequest {
            network: network.map(String::from),
            amount: record.amount,
            natural_key: record.natural_key,
            user_address: Some(record.user_address),
            proof,
            wait,
        })
        .await
    }

    /// The transaction is already out; ledger trouble is logged, not returned
    async fn consume_after_redeem(
        &self,
        natural_key: &str,
        user_address: Option<&str>,
        tx_hash: H256,
    ) -> Option<ConsumedDeposit> {
        let user = user_address.map(|u| u.trim().to_lowercase());
        let record = match self.ledger.find_by_natural_key(natural_key, user.as_deref()).await {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(natural_key = %natural_key, "Redeemed deposit was not tracked");
                return None;
            }
            Err(e) => {
                tracing::error!(natural_key = %natural_key, error = %e, "Ledger lookup after redemption failed");
                return None;
            }
        };

        match self
            .ledger
            .consume_and_delete(&record.id, &format!("{:?}", tx_hash))
            .await
        {
            Ok(consumed) => {
                log_deposit_event("deposit_redeemed", &record.id, record.amount, true, None);
                Some(consumed)
            }
            Err(StorageError::NotFound(_)) => None,
            Err(e) => {
                log_deposit_event(
                    "deposit_consume_failed",
                    &record.id,
                    record.amount,
                    false,
                    Some(&e.to_string()),
                );
                None
            }
        }
    }

    // =========================================================================
    // Signer
    // =========================================================================

    /// Initialize the signer chain if needed and report its state
    pub async fn signer_status(&self) -> SignerStatus {
        let error = self.signers.get().await.err().map(|e| e.to_string());
        SignerStatus {
            candidates: self.signers.candidate_labels(),
            active: self.signers.active_signer_type(),
            address: self.signers.active_address(),
            error,
        }
    }
}

fn validate_natural_key(path: BridgePath, natural_key: &str) -> ValidationResult {
    match path {
        BridgePath::Oracle => validate_tx_hash(natural_key, "natural_key"),
        BridgePath::Receipt => validate_nonce(natural_key),
    }
}

fn validate_candidate(candidate: &DepositCandidate) -> ValidationResult {
    let source = match candidate.path {
        BridgePath::Oracle if candidate.source.domain.is_none() => {
            ValidationResult::error("oracle deposits need a source domain")
        }
        BridgePath::Receipt if candidate.source.chain_id.is_none() => {
            ValidationResult::error("receipt deposits need a source chain id")
        }
        _ => ValidationResult::ok(),
    };

    validate_evm_address(&candidate.user_address, "user_address")
        .merge(validate_natural_key(candidate.path, &candidate.natural_key))
        .merge(validate_amount(candidate.amount, 1, None))
        .merge(source)
}

fn parse_nonce(natural_key: &str) -> Result<u128> {
    natural_key
        .trim()
        .parse::<u128>()
        .map_err(|e| RelayError::validation(format!("invalid nonce {}: {}", natural_key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::oracle::{MockAttestationApi, OracleMessage};
    use crate::attestation::receipt_digest;
    use crate::redemption::rpc::MockChainRpc;
    use crate::signer::{LocalKeySigner, RemoteSigner};
    use crate::storage::MemoryDepositLedger;
    use crate::types::deposit::SourceDescriptor;
    use ethers::types::U256;
    use std::time::Duration;

    const USER: &str = "0xAAAaaaaaAAAAaaaaaaaaAAAAAAAAaaaaaaaaAAAA";
    const TX: &str = "0x912F22A13E9CCB979B621500F6952B2AFD6E75BE7EADAED93FC2625FE11C52A2";
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const RECEIPT_CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn config() -> RelayConfig {
        let mut config = RelayConfig::from_lookup(|key| match key {
            "RELAY_LEDGER_PATH" => Some(":memory:".to_string()),
            "RELAY_BASE_SEPOLIA_RECEIPT_CONTRACT" => Some(RECEIPT_CONTRACT.to_string()),
            _ => None,
        })
        .unwrap();
        config.poll_interval = Duration::from_millis(1);
        config.poll_max_attempts = 3;
        config.network_timeout = Duration::from_millis(500);
        config
    }

    fn coordinator(api: MockAttestationApi, rpc: MockChainRpc) -> PipelineCoordinator {
        let signer = LocalKeySigner::from_key_str(DEV_KEY).unwrap();
        PipelineCoordinator::new(
            config(),
            Arc::new(MemoryDepositLedger::new()),
            Arc::new(api),
            Arc::new(rpc),
            Arc::new(SignerChain::with_signer(Arc::new(signer))),
        )
    }

    fn oracle_candidate() -> DepositCandidate {
        DepositCandidate {
            path: BridgePath::Oracle,
            user_address: USER.to_string(),
            natural_key: TX.to_string(),
            source: SourceDescriptor::oracle(0, "Ethereum Sepolia"),
            amount: 1_000_000,
        }
    }

    fn receipt_candidate(nonce: &str) -> DepositCandidate {
        DepositCandidate {
            path: BridgePath::Receipt,
            user_address: USER.to_string(),
            natural_key: nonce.to_string(),
            source: SourceDescriptor::receipt(7, "Source"),
            amount: 1_000_000,
        }
    }

    fn complete_message() -> OracleMessage {
        OracleMessage {
            message: Some("0x0102".to_string()),
            attestation: Some("0x0304".to_string()),
            status: "complete".to_string(),
        }
    }

    #[tokio::test]
    async fn test_notify_validates_input() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());

        let mut bad_address = oracle_candidate();
        bad_address.user_address = "0x1234".to_string();
        assert!(matches!(
            coord.notify_deposit(bad_address).await,
            Err(RelayError::Validation(_))
        ));

        let mut zero = oracle_candidate();
        zero.amount = 0;
        assert!(matches!(coord.notify_deposit(zero).await, Err(RelayError::Validation(_))));

        let mut bad_key = oracle_candidate();
        bad_key.natural_key = "tx123".to_string();
        assert!(matches!(coord.notify_deposit(bad_key).await, Err(RelayError::Validation(_))));

        let mut no_domain = oracle_candidate();
        no_domain.source = SourceDescriptor::receipt(1, "wrong");
        assert!(matches!(coord.notify_deposit(no_domain).await, Err(RelayError::Validation(_))));

        assert_eq!(coord.get_all_unredeemed().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_notify_conflict() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        let record = coord.notify_deposit(oracle_candidate()).await.unwrap();
        assert_eq!(record.user_address, USER.to_lowercase());
        assert_eq!(record.natural_key, TX.to_lowercase());

        let again = coord.notify_deposit(oracle_candidate()).await;
        assert!(matches!(again, Err(RelayError::Conflict(_))));
        assert_eq!(again.unwrap_err().status_code(), 409);
    }

    #[tokio::test]
    async fn test_get_unredeemed_is_case_insensitive() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        coord.notify_deposit(oracle_candidate()).await.unwrap();

        let listed = coord.get_unredeemed(&USER.to_uppercase().replace("0X", "0x")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(coord.get_unredeemed("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_attach_rejects_wrong_path() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        let record = coord.notify_deposit(oracle_candidate()).await.unwrap();

        let wrong = Attestation::Receipt {
            signature: "0x00".to_string(),
        };
        assert!(matches!(
            coord.attach_attestation(&record.id, wrong).await,
            Err(RelayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_redeemed_once() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        let record = coord.notify_deposit(oracle_candidate()).await.unwrap();
        let redeem_tx = format!("0x{}", "ab".repeat(32));

        let consumed = coord.mark_redeemed(&record.id, &redeem_tx).await.unwrap();
        assert!(consumed.deposit.redeemed);
        assert!(matches!(
            coord.mark_redeemed(&record.id, &redeem_tx).await,
            Err(RelayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_acquire_for_oracle_deposit() {
        let mut api = MockAttestationApi::new();
        api.expect_fetch_messages()
            .withf(|domain, hash| *domain == 0 && hash == TX.to_lowercase())
            .times(1)
            .returning(|_, _| Ok(Some(vec![complete_message()])));

        let coord = coordinator(api, MockChainRpc::new());
        let record = coord.notify_deposit(oracle_candidate()).await.unwrap();

        let attested = coord
            .acquire_for_deposit(&record.id, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(attested.is_attested());

        // Already attested: no further oracle calls
        coord
            .acquire_for_deposit(&record.id, None, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_acquire_for_receipt_deposit() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        let record = coord.notify_deposit(receipt_candidate("42")).await.unwrap();

        let attested = coord
            .acquire_for_deposit(&record.id, Some("base-sepolia"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(attested.attestation, Some(Attestation::Receipt { .. })));
    }

    #[tokio::test]
    async fn test_oracle_redeem_consumes_record() {
        let tx_hash = H256::repeat_byte(0x42);
        let mut rpc = MockChainRpc::new();
        rpc.expect_estimate_gas().returning(|_, _| Ok(U256::from(90_000u64)));

        let signer = LocalKeySigner::from_key_str(DEV_KEY).unwrap();
        let ledger = Arc::new(MemoryDepositLedger::new());
        let mut mock_signer = crate::signer::MockRemoteSigner::new();
        mock_signer.expect_address().return_const(signer.address());
        mock_signer.expect_signer_type().return_const("mock");
        mock_signer
            .expect_submit_transaction()
            .times(1)
            .returning(move |_, _| Ok(tx_hash));

        let coord = PipelineCoordinator::new(
            config(),
            ledger.clone(),
            Arc::new(MockAttestationApi::new()),
            Arc::new(rpc),
            Arc::new(SignerChain::with_signer(Arc::new(mock_signer))),
        );
        coord.notify_deposit(oracle_candidate()).await.unwrap();

        let outcome = coord
            .verify_and_redeem(RedeemRequest {
                network: None,
                amount: 1_000_000,
                natural_key: TX.to_string(),
                user_address: Some(USER.to_string()),
                proof: RedeemProof::Oracle {
                    message: "0x0102".to_string(),
                    attestation: "0x0304".to_string(),
                },
                wait: false,
            })
            .await
            .unwrap();

        assert_eq!(outcome.tx_hash, tx_hash);
        assert_eq!(outcome.network, "base-sepolia");
        let consumed = outcome.consumed.unwrap();
        assert_eq!(consumed.redeem_tx_hash, format!("{:?}", tx_hash));
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redeem_without_record_is_fine() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_estimate_gas().returning(|_, _| Ok(U256::from(90_000u64)));

        let mut mock_signer = crate::signer::MockRemoteSigner::new();
        mock_signer.expect_address().return_const(Address::repeat_byte(1));
        mock_signer.expect_signer_type().return_const("mock");
        mock_signer
            .expect_submit_transaction()
            .returning(|_, _| Ok(H256::repeat_byte(7)));

        let coord = PipelineCoordinator::new(
            config(),
            Arc::new(MemoryDepositLedger::new()),
            Arc::new(MockAttestationApi::new()),
            Arc::new(rpc),
            Arc::new(SignerChain::with_signer(Arc::new(mock_signer))),
        );

        let outcome = coord
            .verify_and_redeem(RedeemRequest {
                network: None,
                amount: 5,
                natural_key: TX.to_string(),
                user_address: None,
                proof: RedeemProof::Oracle {
                    message: "0x01".to_string(),
                    attestation: "0x02".to_string(),
                },
                wait: false,
            })
            .await
            .unwrap();
        assert!(outcome.consumed.is_none());
    }

    #[tokio::test]
    async fn test_receipt_redeem_rejects_foreign_signature() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_estimate_gas().never();
        let coord = coordinator(MockAttestationApi::new(), rpc);

        let contract: Address = RECEIPT_CONTRACT.parse().unwrap();
        let receipt = ReceiptDescriptor {
            amount: 1_000_000,
            nonce: 42,
            source_chain_id: 7,
            destination_chain_id: 84532,
            destination_contract: contract,
        };
        let stranger = LocalKeySigner::from_seed(b"stranger").unwrap();
        let signature = stranger.sign_message(&receipt_digest(&receipt)).await.unwrap();

        let result = coord
            .verify_and_redeem(RedeemRequest {
                network: Some("base-sepolia".to_string()),
                amount: 1_000_000,
                natural_key: "42".to_string(),
                user_address: None,
                proof: RedeemProof::Receipt {
                    signature: format!("0x{}", hex::encode(signature.to_vec())),
                    source_chain_id: 7,
                },
                wait: false,
            })
            .await;
        assert!(matches!(result, Err(RelayError::SignatureMismatch { .. })));
    }

    #[tokio::test]
    async fn test_in_flight_redemption_conflicts() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        let _held = coord
            .in_flight
            .try_acquire(&format!("oracle:{}", TX.to_lowercase()))
            .unwrap();

        let result = coord
            .verify_and_redeem(RedeemRequest {
                network: None,
                amount: 1,
                natural_key: TX.to_string(),
                user_address: None,
                proof: RedeemProof::Oracle {
                    message: "0x01".to_string(),
                    attestation: "0x02".to_string(),
                },
                wait: false,
            })
            .await;
        assert!(matches!(result, Err(RelayError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_zero_padded_nonce_maps_to_same_deposit() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        let record = coord.notify_deposit(receipt_candidate("42")).await.unwrap();

        let padded = coord.notify_deposit(receipt_candidate("042")).await;
        assert!(matches!(padded, Err(RelayError::Conflict(_))));
        assert_eq!(coord.find_deposit("0042", Some(USER)).await.unwrap().id, record.id);

        // Redemption keys on the canonical nonce too
        let _held = coord.in_flight.try_acquire("receipt:42").unwrap();
        let result = coord
            .verify_and_redeem(RedeemRequest {
                network: Some("base-sepolia".to_string()),
                amount: 1_000_000,
                natural_key: "042".to_string(),
                user_address: Some(USER.to_string()),
                proof: RedeemProof::Receipt {
                    signature: "0x01".to_string(),
                    source_chain_id: 7,
                },
                wait: false,
            })
            .await;
        assert!(matches!(result, Err(RelayError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_issue_nonce_skips_used() {
        let mut rpc = MockChainRpc::new();
        let mut calls = 0;
        rpc.expect_call().times(2).returning(move |_, _| {
            calls += 1;
            let mut word = [0u8; 32];
            word[31] = u8::from(calls == 1);
            Ok(Bytes::from(word.to_vec()))
        });

        let coord = coordinator(MockAttestationApi::new(), rpc);
        let nonce = coord.issue_receipt_nonce(Some("base-sepolia")).await.unwrap();
        assert!(nonce > 0);
    }

    #[tokio::test]
    async fn test_issue_nonce_needs_receipt_contract() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        let result = coord.issue_receipt_nonce(Some("ethereum-sepolia")).await;
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[tokio::test]
    async fn test_signer_status() {
        let coord = coordinator(MockAttestationApi::new(), MockChainRpc::new());
        let status = coord.signer_status().await;
        assert_eq!(status.candidates, vec!["prebuilt"]);
        assert_eq!(status.active, Some("local-key"));
        assert!(status.error.is_none());
    }
}
