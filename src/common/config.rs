//! Environment-based Configuration
//!
//! Secrets (custody token, private key) come only from the environment.
//! Every other value has a testnet default.
//!
//! # General
//! - `RELAY_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! - `RELAY_LOG_JSON` - "1"/"true" for JSON logs
//! - `RELAY_LEDGER_PATH` - SQLite file, or `:memory:` (default: data/deposits.db)
//!
//! # Attestation
//! - `RELAY_ORACLE_URL` - oracle messages endpoint
//! - `RELAY_POLL_INTERVAL_SECS` / `RELAY_POLL_MAX_ATTEMPTS` - poll budget (5s x 30)
//! - `RELAY_TRUSTED_SIGNER` - expected receipt signer address
//!
//! # Redemption
//! - `RELAY_GAS_MARGIN_PERCENT` - gas multiplier in percent (default: 120)
//! - `RELAY_NETWORK_TIMEOUT_SECS` - per-call timeout (default: 45)
//! - `RELAY_CONFIRMATION_TIMEOUT_SECS` - bounded confirmation wait (default: 120)
//!
//! # Signers
//! - `RELAY_CUSTODY_URL`, `RELAY_CUSTODY_API_TOKEN`
//! - `RELAY_CUSTODY_ACCOUNT_ID` or `RELAY_CUSTODY_ACCOUNT_NAME`
//! - `RELAY_PRIVATE_KEY` - hex (with or without 0x) or base64
//!
//! # Networks
//! - `RELAY_NETWORKS` - comma-separated names
//! - `RELAY_DEFAULT_NETWORK` - destination used when none is given
//! - `RELAY_<NAME>_RPC_URL`, `_CHAIN_ID`, `_DOMAIN`, `_MESSAGE_TRANSMITTER`,
//!   `_RECEIPT_CONTRACT`, `_LABEL` (name upper-cased, `-` becomes `_`)

use ethers::types::Address;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default oracle endpoint (sandbox)
pub const DEFAULT_ORACLE_URL: &str = "https://iris-api-sandbox.circle.com/v2/messages";

/// Message transmitter deployed at the same address on every supported testnet
const TESTNET_MESSAGE_TRANSMITTER: &str = "0xE737e5cEBEEBa77EFE34D4aa090756590b1CE275";

const DEFAULT_NETWORKS: &str = "base-sepolia,ethereum-sepolia,arbitrum-sepolia";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

/// Built-in network parameters
struct KnownNetwork {
    name: &'static str,
    label: &'static str,
    chain_id: u64,
    domain: u32,
    rpc_url: &'static str,
}

const KNOWN_NETWORKS: &[KnownNetwork] = &[
    KnownNetwork {
        name: "base-sepolia",
        label: "Base Sepolia",
        chain_id: 84532,
        domain: 6,
        rpc_url: "https://sepolia.base.org",
    },
    KnownNetwork {
        name: "ethereum-sepolia",
        label: "Ethereum Sepolia",
        chain_id: 11155111,
        domain: 0,
        rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    },
    KnownNetwork {
        name: "arbitrum-sepolia",
        label: "Arbitrum Sepolia",
        chain_id: 421614,
        domain: 3,
        rpc_url: "https://sepolia-rollup.arbitrum.io/rpc",
    },
];

/// Parameters of one EVM network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Short name used on the command line (e.g. "base-sepolia")
    pub name: String,
    /// Human-readable label
    pub label: String,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Oracle domain, if the network takes part in the oracle path
    pub oracle_domain: Option<u32>,
    /// Destination of `receiveMessage` calls
    pub message_transmitter: Option<Address>,
    /// Destination of receipt redemptions
    pub receipt_contract: Option<Address>,
}

impl NetworkConfig {
    /// Message transmitter, or an error naming the network
    pub fn require_message_transmitter(&self) -> Result<Address, ConfigError> {
        self.message_transmitter
            .ok_or_else(|| ConfigError::MissingEnvVar(network_var(&self.name, "MESSAGE_TRANSMITTER")))
    }

    /// Receipt contract, or an error naming the network
    pub fn require_receipt_contract(&self) -> Result<Address, ConfigError> {
        self.receipt_contract
            .ok_or_else(|| ConfigError::MissingEnvVar(network_var(&self.name, "RECEIPT_CONTRACT")))
    }
}

/// Account reference understood by the custody service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRef {
    Id(String),
    Name(String),
}

/// Custody service settings
///
/// Fields stay optional so that incomplete settings surface when a signer
/// is first needed rather than at startup.
#[derive(Clone)]
pub struct CustodyConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub account: Option<AccountRef>,
}

impl std::fmt::Debug for CustodyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("account", &self.account)
            .finish()
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub log_level: String,
    pub log_json: bool,

    /// SQLite path or `:memory:`
    pub ledger_path: String,

    pub oracle_url: String,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,

    /// Gas multiplier in percent, never below 100
    pub gas_margin_percent: u64,
    pub network_timeout: Duration,
    pub confirmation_timeout: Duration,

    /// Expected signer of receipts; the active signer's address when unset
    pub trusted_signer: Option<Address>,
    pub custody: Option<CustodyConfig>,
    pub private_key: Option<String>,

    pub networks: Vec<NetworkConfig>,
    pub default_network: String,
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let log_level = get("RELAY_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_json = get("RELAY_LOG_JSON")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let ledger_path = get("RELAY_LEDGER_PATH").unwrap_or_else(|| "data/deposits.db".to_string());

        let oracle_url = get("RELAY_ORACLE_URL").unwrap_or_else(|| DEFAULT_ORACLE_URL.to_string());
        let poll_interval =
            Duration::from_secs(parse_or(&get, "RELAY_POLL_INTERVAL_SECS", 5u64)?);
        let poll_max_attempts: u32 = parse_or(&get, "RELAY_POLL_MAX_ATTEMPTS", 30)?;
        if poll_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "RELAY_POLL_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let gas_margin_percent: u64 = parse_or(&get, "RELAY_GAS_MARGIN_PERCENT", 120)?;
        if gas_margin_percent < 100 {
            return Err(ConfigError::InvalidValue(
                "RELAY_GAS_MARGIN_PERCENT".to_string(),
                "must be at least 100".to_string(),
            ));
        }
        let network_timeout =
            Duration::from_secs(parse_or(&get, "RELAY_NETWORK_TIMEOUT_SECS", 45u64)?);
        let confirmation_timeout =
            Duration::from_secs(parse_or(&get, "RELAY_CONFIRMATION_TIMEOUT_SECS", 120u64)?);

        let trusted_signer = get("RELAY_TRUSTED_SIGNER")
            .map(|v| parse_address("RELAY_TRUSTED_SIGNER", &v))
            .transpose()?;

        let custody = load_custody_config(&get);
        let private_key = get("RELAY_PRIVATE_KEY");

        let names: Vec<String> = get("RELAY_NETWORKS")
            .unwrap_or_else(|| DEFAULT_NETWORKS.to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ConfigError::InvalidValue(
                "RELAY_NETWORKS".to_string(),
                "at least one network is required".to_string(),
            ));
        }

        let networks = names
            .iter()
            .map(|name| load_network(&get, name))
            .collect::<Result<Vec<_>, _>>()?;

        let default_network = get("RELAY_DEFAULT_NETWORK")
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|| names[0].clone());
        if !networks.iter().any(|n| n.name == default_network) {
            return Err(ConfigError::UnknownNetwork(default_network));
        }

        Ok(Self {
            log_level,
            log_json,
            ledger_path,
            oracle_url,
            poll_interval,
            poll_max_attempts,
            gas_margin_percent,
            network_timeout,
            confirmation_timeout,
            trusted_signer,
            custody,
            private_key,
            networks,
            default_network,
        })
    }

    /// Look up a network by name
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        let name = name.trim().to_lowercase();
        self.networks
            .iter()
            .find(|n| n.name == name)
            .ok_or(ConfigError::UnknownNetwork(name))
    }

    /// The destination used when the caller names none
    pub fn default_network(&self) -> Result<&NetworkConfig, ConfigError> {
        self.network(&self.default_network)
    }

    pub fn network_by_chain_id(&self, chain_id: u64) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    pub fn network_by_domain(&self, domain: u32) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.oracle_domain == Some(domain))
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== Bridge Relay Configuration ===");
        println!("Ledger: {}", self.ledger_path);
        println!("Oracle: {}", self.oracle_url);
        println!(
            "Polling: every {}s, {} attempts",
            self.poll_interval.as_secs(),
            self.poll_max_attempts
        );
        println!("Gas Margin: {}%", self.gas_margin_percent);
        println!("Network Timeout: {}s", self.network_timeout.as_secs());
        println!(
            "Trusted Signer: {}",
            self.trusted_signer
                .map(|a| format!("{:?}", a))
                .unwrap_or_else(|| "(active signer)".to_string())
        );
        println!(
            "Custody: {}",
            match &self.custody {
                Some(c) => c.base_url.as_str(),
                None => "(not configured)",
            }
        );
        println!(
            "Local Key: {}",
            if self.private_key.is_some() { "set" } else { "(not set)" }
        );
        for network in &self.networks {
            let marker = if network.name == self.default_network { "*" } else { " " };
            println!(
                "{} {} ({}) chain={} domain={} rpc={}",
                marker,
                network.name,
                network.label,
                network.chain_id,
                network
                    .oracle_domain
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                network.rpc_url
            );
        }
        println!("Log Level: {}", self.log_level);
        println!("==================================");
    }
}

/// `RELAY_<NAME>_<FIELD>`
fn network_var(name: &str, field: &str) -> String {
    format!("RELAY_{}_{}", name.to_uppercase().replace('-', "_"), field)
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value)
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}: {}", value, e)))
}

fn load_custody_config<G>(get: &G) -> Option<CustodyConfig>
where
    G: Fn(&str) -> Option<String>,
{
    let base_url = get("RELAY_CUSTODY_URL");
    let api_token = get("RELAY_CUSTODY_API_TOKEN");
    if base_url.is_none() && api_token.is_none() {
        return None;
    }

    let account = get("RELAY_CUSTODY_ACCOUNT_ID")
        .map(AccountRef::Id)
        .or_else(|| get("RELAY_CUSTODY_ACCOUNT_NAME").map(AccountRef::Name));

    Some(CustodyConfig {
        base_url: base_url.unwrap_or_default(),
        api_token,
        account,
    })
}

fn load_network<G>(get: &G, name: &str) -> Result<NetworkConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let known = KNOWN_NETWORKS.iter().find(|k| k.name == name);

    let rpc_url = match (get(&network_var(name, "RPC_URL")), known) {
        (Some(url), _) => url,
        (None, Some(k)) => k.rpc_url.to_string(),
        (None, None) => return Err(ConfigError::MissingEnvVar(network_var(name, "RPC_URL"))),
    };

    let chain_id_var = network_var(name, "CHAIN_ID");
    let chain_id = match (get(&chain_id_var), known) {
        (Some(v), _) => v
            .parse()
            .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue(chain_id_var, e.to_string()))?,
        (None, Some(k)) => k.chain_id,
        (None, None) => return Err(ConfigError::MissingEnvVar(chain_id_var)),
    };

    let domain_var = network_var(name, "DOMAIN");
    let oracle_domain = match get(&domain_var) {
        Some(v) => Some(
            v.parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue(domain_var, e.to_string()))?,
        ),
        None => known.map(|k| k.domain),
    };

    let transmitter_var = network_var(name, "MESSAGE_TRANSMITTER");
    let message_transmitter = match get(&transmitter_var) {
        Some(v) => Some(parse_address(&transmitter_var, &v)?),
        None if known.is_some() => Some(parse_address(&transmitter_var, TESTNET_MESSAGE_TRANSMITTER)?),
        None => None,
    };

    let receipt_var = network_var(name, "RECEIPT_CONTRACT");
    let receipt_contract = get(&receipt_var)
        .map(|v| parse_address(&receipt_var, &v))
        .transpose()?;

    let label = get(&network_var(name, "LABEL"))
        .or_else(|| known.map(|k| k.label.to_string()))
        .unwrap_or_else(|| name.to_string());

    Ok(NetworkConfig {
        name: name.to_string(),
        label,
        chain_id,
        rpc_url,
        oracle_domain,
        message_transmitter,
        receipt_contract,
    })
}
