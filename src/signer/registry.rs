//! Signer Fallback Chain
//!
//! Ordered list of signer constructors tried on first use. The first one
//! that initializes is cached for the life of the process; read-only
//! operations never touch the chain, so a misconfigured signer only fails
//! the calls that need it.

use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{CustodySigner, LocalKeySigner, RemoteSigner, SignerError};
use crate::common::config::{CustodyConfig, RelayConfig};
use crate::common::logging::log_signer_event;

/// One way of obtaining a signer
pub enum SignerCandidate {
    Custody(CustodyConfig),
    /// Key string in hex or base64
    LocalKey(String),
    /// Already constructed signer
    Prebuilt(Arc<dyn RemoteSigner>),
}

impl std::fmt::Debug for SignerCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custody(config) => f.debug_tuple("Custody").field(config).finish(),
            Self::LocalKey(_) => f.write_str("LocalKey(<redacted>)"),
            Self::Prebuilt(signer) => f.debug_tuple("Prebuilt").field(&signer.signer_type()).finish(),
        }
    }
}

impl SignerCandidate {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Custody(_) => "custody",
            Self::LocalKey(_) => "local-key",
            Self::Prebuilt(_) => "prebuilt",
        }
    }

    async fn build(&self) -> Result<Arc<dyn RemoteSigner>, SignerError> {
        match self {
            Self::Custody(config) => Ok(Arc::new(CustodySigner::connect(config).await?)),
            Self::LocalKey(key) => Ok(Arc::new(LocalKeySigner::from_key_str(key)?)),
            Self::Prebuilt(signer) => Ok(Arc::clone(signer)),
        }
    }
}

/// Lazily selected relay wallet signer
pub struct SignerChain {
    candidates: Vec<SignerCandidate>,
    active: OnceCell<Arc<dyn RemoteSigner>>,
}

impl SignerChain {
    pub fn new(candidates: Vec<SignerCandidate>) -> Self {
        Self {
            candidates,
            active: OnceCell::new(),
        }
    }

    /// Custody first, then the local key
    pub fn from_config(config: &RelayConfig) -> Self {
        let mut candidates = Vec::new();
        if let Some(custody) = &config.custody {
            candidates.push(SignerCandidate::Custody(custody.clone()));
        }
        if let Some(key) = &config.private_key {
            candidates.push(SignerCandidate::LocalKey(key.clone()));
        }
        Self::new(candidates)
    }

    /// Chain with a single, already constructed signer
    pub fn with_signer(signer: Arc<dyn RemoteSigner>) -> Self {
        Self::new(vec![SignerCandidate::Prebuilt(signer)])
    }

    /// The active signer, initializing the chain on first call
    pub async fn get(&self) -> Result<Arc<dyn RemoteSigner>, SignerError> {
        let signer = self
            .active
            .get_or_try_init(|| self.select())
            .await?;
        Ok(Arc::clone(signer))
    }

    async fn select(&self) -> Result<Arc<dyn RemoteSigner>, SignerError> {
        if self.candidates.is_empty() {
            return Err(SignerError::Unavailable(
                "no custody or local key configured".to_string(),
            ));
        }

        let mut failures = Vec::new();
        for candidate in &self.candidates {
            match candidate.build().await {
                Ok(signer) => {
                    let address = format!("{:?}", signer.address());
                    if !failures.is_empty() {
                        tracing::warn!(
                            selected = signer.signer_type(),
                            skipped = %failures.join("; "),
                            "Falling back to secondary signer"
                        );
                    }
                    log_signer_event(
                        "signer_selected",
                        signer.signer_type(),
                        Some(&address),
                        true,
                        None,
                    );
                    return Ok(signer);
                }
                Err(e) => {
                    log_signer_event(
                        "signer_init_failed",
                        candidate.label(),
                        None,
                        false,
                        Some(&e.to_string()),
                    );
                    failures.push(format!("{}: {}", candidate.label(), e));
                }
            }
        }

        Err(SignerError::Unavailable(failures.join("; ")))
    }

    /// Type of the cached signer, if one has been selected
    pub fn active_signer_type(&self) -> Option<&'static str> {
        self.active.get().map(|s| s.signer_type())
    }

    /// Address of the cached signer, if one has been selected
    pub fn active_address(&self) -> Option<Address> {
        self.active.get().map(|s| s.address())
    }

    /// Configured candidates in priority order
    pub fn candidate_labels(&self) -> Vec<&'static str> {
        self.candidates.iter().map(|c| c.label()).collect()
    }
}
