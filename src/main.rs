//! Bridge Relay - Operator CLI
//!
//! Commands:
//!   bridge-relay status                          - Configuration, signer and ledger state
//!   bridge-relay networks                        - Configured destination networks
//!   bridge-relay notify <path> <user> <key> <amount> [--domain <n> | --chain-id <n>] [--label <name>]
//!   bridge-relay unredeemed [<user>]             - List unredeemed deposits
//!   bridge-relay find <key> [--user <addr>]      - Look up a deposit by tx hash or nonce
//!   bridge-relay attest <id> [--network <name>]  - Acquire and attach an attestation
//!   bridge-relay redeem <id> [--network <name>] [--wait]
//!   bridge-relay mark-redeemed <id> <tx_hash>    - Consume a deposit redeemed elsewhere
//!   bridge-relay nonce [--network <name>]        - Issue an unused receipt nonce
//!   bridge-relay keygen                          - Generate a local relay key

use bridge_relay::common::logging::init_from_config;
use bridge_relay::common::RelayConfig;
use bridge_relay::pipeline::PipelineCoordinator;
use bridge_relay::types::{parse_amount, parse_units, units_to_display, TOKEN_DECIMALS};
use bridge_relay::{
    BridgePath, DepositCandidate, DepositRecord, LocalKeySigner, RelayError, RemoteSigner,
    SourceDescriptor,
};
use std::env;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = args[1].as_str();
    match command {
        "help" | "--help" | "-h" => {
            print_usage();
            return;
        }
        "keygen" => {
            run_keygen();
            return;
        }
        _ => {}
    }

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    let coordinator = match PipelineCoordinator::from_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.error_code(), e);
            std::process::exit(1);
        }
    };

    let rest = &args[2..];
    let result = match command {
        "status" => run_status(&coordinator).await,
        "networks" => run_networks(&coordinator),
        "notify" => run_notify(&coordinator, rest).await,
        "unredeemed" => run_unredeemed(&coordinator, rest).await,
        "find" => run_find(&coordinator, rest).await,
        "attest" => run_attest(&coordinator, rest).await,
        "redeem" => run_redeem(&coordinator, rest).await,
        "mark-redeemed" => run_mark_redeemed(&coordinator, rest).await,
        "nonce" => run_nonce(&coordinator, rest).await,
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Bridge Relay - Cross-Chain Deposit Redemption");
    println!();
    println!("Usage:");
    println!("  bridge-relay status                               Show configuration and signer");
    println!("  bridge-relay networks                             List destination networks");
    println!("  bridge-relay notify <oracle|receipt> <user> <key> <amount>");
    println!("               [--domain <n>] [--chain-id <n>] [--label <name>]");
    println!("                                                    Record a deposit");
    println!("  bridge-relay unredeemed [<user>]                  List unredeemed deposits");
    println!("  bridge-relay find <key> [--user <addr>]           Find a deposit");
    println!("  bridge-relay attest <id> [--network <name>]       Acquire an attestation");
    println!("  bridge-relay redeem <id> [--network <name>] [--wait]");
    println!("                                                    Redeem an attested deposit");
    println!("  bridge-relay mark-redeemed <id> <tx_hash>         Consume a deposit");
    println!("  bridge-relay nonce [--network <name>]             Issue a receipt nonce");
    println!("  bridge-relay keygen                               Generate a local key");
    println!();
    println!("Amounts are smallest units, or decimal tokens when they contain a '.'");
    println!();
    println!("Environment Variables:");
    println!("  RELAY_LEDGER_PATH        SQLite ledger (default: data/deposits.db)");
    println!("  RELAY_ORACLE_URL         Attestation oracle base URL");
    println!("  RELAY_PRIVATE_KEY        Local relay key (hex or base64)");
    println!("  RELAY_CUSTODY_URL        Custody service base URL");
    println!("  RELAY_CUSTODY_API_TOKEN  Custody API token");
    println!("  RELAY_NETWORKS           Comma-separated destination networks");
    println!("  RELAY_LOG_LEVEL          trace|debug|info|warn|error");
}

/// Value following `flag`, if present
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Positional arguments, skipping flags and their values
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--wait" => i += 1,
            a if a.starts_with("--") => i += 2,
            a => {
                out.push(a);
                i += 1;
            }
        }
    }
    out
}

fn parse_cli_amount(s: &str) -> Result<u128, RelayError> {
    let parsed = if s.contains('.') {
        parse_units(s, TOKEN_DECIMALS)
    } else {
        parse_amount(s)
    };
    parsed.ok_or_else(|| RelayError::validation(format!("invalid amount: {}", s)))
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, RelayError> {
    value
        .parse()
        .map_err(|_| RelayError::validation(format!("invalid {}: {}", what, value)))
}

fn print_deposit(record: &DepositRecord) {
    println!("{}", record.id);
    println!("  Path:      {}", record.path);
    println!("  User:      {}", record.user_address);
    println!("  Key:       {}", record.natural_key);
    println!("  Source:    {}", record.source.label);
    println!("  Amount:    {}", units_to_display(record.amount));
    println!("  Attested:  {}", if record.is_attested() { "yes" } else { "no" });
}

fn run_keygen() {
    let signer = LocalKeySigner::generate();
    println!("Address:     {:?}", signer.address());
    println!("Private key: 0x{}", signer.secret_hex());
    println!();
    println!("Set RELAY_PRIVATE_KEY to use it as the fallback signer.");
}

async fn run_status(coordinator: &PipelineCoordinator) -> Result<(), RelayError> {
    coordinator.config().print_summary();
    println!();

    let status = coordinator.signer_status().await;
    println!("Signer candidates: {}", status.candidates.join(" → "));
    match (status.active, status.address) {
        (Some(kind), Some(address)) => println!("Active signer:     {} ({:?})", kind, address),
        _ => println!(
            "Active signer:     none ({})",
            status.error.unwrap_or_else(|| "not initialized".to_string())
        ),
    }

    let deposits = coordinator.get_all_unredeemed().await?;
    let attested = deposits.iter().filter(|d| d.is_attested()).count();
    println!("Unredeemed:        {} ({} attested)", deposits.len(), attested);
    Ok(())
}

fn run_networks(coordinator: &PipelineCoordinator) -> Result<(), RelayError> {
    let config = coordinator.config();
    for network in &config.networks {
        let marker = if network.name == config.default_network { "*" } else { " " };
        println!("{} {:<20} {}", marker, network.name, network.label);
        println!("    chain id:            {}", network.chain_id);
        if let Some(domain) = network.oracle_domain {
            println!("    oracle domain:       {}", domain);
        }
        if let Some(addr) = network.message_transmitter {
            println!("    message transmitter: {:?}", addr);
        }
        if let Some(addr) = network.receipt_contract {
            println!("    receipt contract:    {:?}", addr);
        }
    }
    Ok(())
}

async fn run_notify(coordinator: &PipelineCoordinator, args: &[String]) -> Result<(), RelayError> {
    let pos = positional(args);
    if pos.len() < 4 {
        return Err(RelayError::validation(
            "usage: notify <oracle|receipt> <user> <key> <amount>",
        ));
    }

    let path: BridgePath = pos[0].parse().map_err(RelayError::Validation)?;
    let config = coordinator.config();
    // Unlabelled sources take the name of the matching configured network
    let label = flag_value(args, "--label");
    let source = match path {
        BridgePath::Oracle => {
            let domain = flag_value(args, "--domain")
                .ok_or_else(|| RelayError::validation("oracle deposits need --domain"))?;
            let domain: u32 = parse_number(domain, "domain")?;
            let known = config.network_by_domain(domain).map(|n| n.name.as_str());
            SourceDescriptor::oracle(domain, label.or(known).unwrap_or("unknown"))
        }
        BridgePath::Receipt => {
            let chain_id = flag_value(args, "--chain-id")
                .ok_or_else(|| RelayError::validation("receipt deposits need --chain-id"))?;
            let chain_id: u64 = parse_number(chain_id, "chain id")?;
            let known = config.network_by_chain_id(chain_id).map(|n| n.name.as_str());
            SourceDescriptor::receipt(chain_id, label.or(known).unwrap_or("unknown"))
        }
    };

    let record = coordinator
        .notify_deposit(DepositCandidate {
            path,
            user_address: pos[1].to_string(),
            natural_key: pos[2].to_string(),
            source,
            amount: parse_cli_amount(pos[3])?,
        })
        .await?;

    println!("Recorded deposit:");
    print_deposit(&record);
    Ok(())
}

async fn run_unredeemed(
    coordinator: &PipelineCoordinator,
    args: &[String],
) -> Result<(), RelayError> {
    let deposits = match positional(args).first() {
        Some(user) => coordinator.get_unredeemed(user).await?,
        None => coordinator.get_all_unredeemed().await?,
    };

    if deposits.is_empty() {
        println!("No unredeemed deposits");
    }
    for record in &deposits {
        print_deposit(record);
    }
    Ok(())
}

async fn run_find(coordinator: &PipelineCoordinator, args: &[String]) -> Result<(), RelayError> {
    let key = positional(args)
        .first()
        .copied()
        .ok_or_else(|| RelayError::validation("usage: find <key> [--user <addr>]"))?;
    let record = coordinator
        .find_deposit(key, flag_value(args, "--user"))
        .await?;
    print_deposit(&record);
    Ok(())
}

async fn run_attest(coordinator: &PipelineCoordinator, args: &[String]) -> Result<(), RelayError> {
    let id = positional(args)
        .first()
        .copied()
        .ok_or_else(|| RelayError::validation("usage: attest <id> [--network <name>]"))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    println!("Acquiring attestation for {} (Ctrl+C to stop)...", id);
    let record = coordinator
        .acquire_for_deposit(id, flag_value(args, "--network"), &cancel)
        .await?;
    print_deposit(&record);
    Ok(())
}

async fn run_redeem(coordinator: &PipelineCoordinator, args: &[String]) -> Result<(), RelayError> {
    let id = positional(args)
        .first()
        .copied()
        .ok_or_else(|| RelayError::validation("usage: redeem <id> [--network <name>] [--wait]"))?;

    let outcome = coordinator
        .redeem_deposit(id, flag_value(args, "--network"), has_flag(args, "--wait"))
        .await?;

    println!("Submitted on {}: {:?}", outcome.network, outcome.tx_hash);
    match outcome.consumed {
        Some(consumed) => println!("Consumed deposit {}", consumed.deposit.id),
        None => println!("No ledger record consumed"),
    }
    Ok(())
}

async fn run_mark_redeemed(
    coordinator: &PipelineCoordinator,
    args: &[String],
) -> Result<(), RelayError> {
    let pos = positional(args);
    if pos.len() < 2 {
        return Err(RelayError::validation("usage: mark-redeemed <id> <tx_hash>"));
    }
    let consumed = coordinator.mark_redeemed(pos[0], pos[1]).await?;
    println!(
        "Deposit {} marked redeemed by {}",
        consumed.deposit.id, consumed.redeem_tx_hash
    );
    Ok(())
}

async fn run_nonce(coordinator: &PipelineCoordinator, args: &[String]) -> Result<(), RelayError> {
    let nonce = coordinator
        .issue_receipt_nonce(flag_value(args, "--network"))
        .await?;
    println!("{}", nonce);
    Ok(())
}
