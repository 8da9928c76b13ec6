//! Local-Key Signer
//!
//! Signs with a private key held in process and broadcasts straight to the
//! network's JSON-RPC endpoint.

use async_trait::async_trait;
use base64::Engine;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Eip1559TransactionRequest, Signature, H256};
use k256::ecdsa::SigningKey;
use sha2::{Digest, Sha256};

use super::{RemoteSigner, SignerError, TxRequest};
use crate::common::config::NetworkConfig;

/// Signer backed by a raw secp256k1 key
#[derive(Clone)]
pub struct LocalKeySigner {
    wallet: LocalWallet,
}

impl std::fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.wallet.address())
            .finish()
    }
}

impl LocalKeySigner {
    /// Create from secret key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignerError> {
        let key =
            SigningKey::from_slice(bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self {
            wallet: LocalWallet::from(key),
        })
    }

    /// Create from a configured key string
    ///
    /// Accepts 64 hex digits (with or without `0x`) or standard base64 of the
    /// 32 raw bytes.
    pub fn from_key_str(key: &str) -> Result<Self, SignerError> {
        let bytes = decode_key(key)?;
        Self::from_bytes(&bytes)
    }

    /// Deterministic key derived from a seed (testing only)
    pub fn from_seed(seed: &[u8]) -> Result<Self, SignerError> {
        let hash = Sha256::digest(seed);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self::from_bytes(&bytes)
    }

    /// Generate a new random signer
    pub fn generate() -> Self {
        Self {
            wallet: LocalWallet::new(&mut rand::thread_rng()),
        }
    }

    /// Get secret key hex (for backup)
    pub fn secret_hex(&self) -> String {
        hex::encode(self.wallet.signer().to_bytes())
    }
}

/// Decode a 32-byte key from hex or base64
fn decode_key(key: &str) -> Result<[u8; 32], SignerError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(SignerError::InvalidKey("key is empty".to_string()));
    }

    let unprefixed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let bytes = if unprefixed.len() == 64 && unprefixed.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(unprefixed).map_err(|e| SignerError::InvalidKey(e.to_string()))?
    } else {
        base64::engine::general_purpose::STANDARD
            .decode(trimmed)
            .map_err(|_| {
                SignerError::InvalidKey("key is neither 32-byte hex nor base64".to_string())
            })?
    };

    if bytes.len() != 32 {
        return Err(SignerError::InvalidKey(format!(
            "key must be 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

#[async_trait]
impl RemoteSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        self.wallet
            .sign_message(message)
            .await
            .map_err(|e| SignerError::SigningFailed(e.to_string()))
    }

    async fn submit_transaction(
        &self,
        network: &NetworkConfig,
        tx: TxRequest,
    ) -> Result<H256, SignerError> {
        let provider = Provider::<Http>::try_from(network.rpc_url.as_str()).map_err(|e| {
            SignerError::SubmissionFailed(format!("invalid rpc url {}: {}", network.rpc_url, e))
        })?;
        let wallet = self.wallet.clone().with_chain_id(network.chain_id);
        let client = SignerMiddleware::new(provider, wallet);

        let mut request = Eip1559TransactionRequest::new()
            .from(self.address())
            .to(tx.to)
            .data(tx.data)
            .chain_id(network.chain_id);
        if let Some(value) = tx.value {
            request = request.value(value);
        }
        if let Some(gas) = tx.gas_limit {
            request = request.gas(gas);
        }

        let pending = client
            .send_transaction(request, None)
            .await
            .map_err(|e| SignerError::SubmissionFailed(e.to_string()))?;
        let tx_hash = pending.tx_hash();

        tracing::debug!(
            network = %network.name,
            tx_hash = ?tx_hash,
            "Local signer broadcast transaction"
        );

        Ok(tx_hash)
    }

    fn signer_type(&self) -> &'static str {
        "local-key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key
    const DEV_KEY_HEX: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_KEY_B64: &str = "rAl0vsOaF+NrpKa00jj/lEustHjL7V78rnhNe/Ty/4A=";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn dev_address() -> Address {
        DEV_ADDRESS.parse().unwrap()
    }

    #[test]
    fn test_key_encodings_agree() {
        let plain = LocalKeySigner::from_key_str(DEV_KEY_HEX).unwrap();
        let prefixed = LocalKeySigner::from_key_str(&format!("0x{}", DEV_KEY_HEX)).unwrap();
        let b64 = LocalKeySigner::from_key_str(DEV_KEY_B64).unwrap();

        assert_eq!(plain.address(), dev_address());
        assert_eq!(prefixed.address(), dev_address());
        assert_eq!(b64.address(), dev_address());
        assert_eq!(plain.secret_hex(), DEV_KEY_HEX);
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            LocalKeySigner::from_key_str(""),
            Err(SignerError::InvalidKey(_))
        ));
        assert!(matches!(
            LocalKeySigner::from_key_str("0x1234"),
            Err(SignerError::InvalidKey(_))
        ));
        assert!(matches!(
            LocalKeySigner::from_bytes(&[0u8; 32]),
            Err(SignerError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_seeded_signer_is_deterministic() {
        let a = LocalKeySigner::from_seed(b"relay-test").unwrap();
        let b = LocalKeySigner::from_seed(b"relay-test").unwrap();
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), LocalKeySigner::generate().address());
    }

    #[tokio::test]
    async fn test_sign_message_recovers() {
        let signer = LocalKeySigner::from_key_str(DEV_KEY_HEX).unwrap();
        let signature = signer.sign_message(b"hello relay").await.unwrap();

        let recovered = signature.recover(&b"hello relay"[..]).unwrap();
        assert_eq!(recovered, dev_address());
        assert_eq!(signer.signer_type(), "local-key");
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = LocalKeySigner::from_key_str(DEV_KEY_HEX).unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains(DEV_KEY_HEX));
    }
}
