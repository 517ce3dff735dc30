//! Safe Executor - submit a call through a Safe multisig with a single owner key
//!
//! Reads the Safe nonce, signs the Safe transaction hash with the owner key from the
//! environment, and submits `execTransaction` with fee escalation on transient errors.

use anyhow::{Context, Result};
use clap::Parser;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use safe_executor::config::{LogFormat, LoggingConfig};
use safe_executor::tx::gas::gwei;
use safe_executor::{
    ChainProvider, FeeOverrides, SafeClient, SafeExecutor, SafeTransaction, SafeTxError, Settings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "safe-executor", version, about = "Execute a call through a Safe multisig")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "SAFE_EXEC_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    /// Target of the Safe call
    #[arg(long)]
    to: String,

    /// Hex calldata for the Safe call
    #[arg(long, default_value = "0x")]
    data: String,

    /// Gas limit for the outer transaction
    #[arg(long)]
    gas_limit: Option<u64>,

    #[arg(long, requires = "priority_fee_gwei")]
    max_fee_gwei: Option<u64>,

    #[arg(long, requires = "max_fee_gwei")]
    priority_fee_gwei: Option<u64>,

    /// Print the signed payload and resolved fees without submitting
    #[arg(long)]
    dry_run: bool,

    /// Do not wait for the receipt
    #[arg(long)]
    no_wait: bool,
}

impl Cli {
    fn overrides(&self) -> FeeOverrides {
        let mut overrides = match (self.max_fee_gwei, self.priority_fee_gwei) {
            (Some(max_fee), Some(priority_fee)) => FeeOverrides::eip1559(gwei(max_fee), gwei(priority_fee)),
            _ => FeeOverrides::default(),
        };
        if let Some(gas_limit) = self.gas_limit {
            overrides = overrides.with_gas_limit(gas_limit);
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::load(&cli.config)?;

    // Initialize logging
    init_logging(&settings.logging);

    info!("Starting Safe Executor v{}", env!("CARGO_PKG_VERSION"));

    let to: Address = cli
        .to
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid --to address {:?}: {:?}", cli.to, e))?;
    let data = hex::decode(cli.data.trim_start_matches("0x")).context("Invalid --data hex")?;

    let wallet = load_wallet(&settings.wallet.private_key_env)?.with_chain_id(settings.chain.chain_id);
    info!("Owner wallet: {:?}", wallet.address());

    let provider = Provider::<Http>::try_from(settings.chain.rpc_url.as_str())
        .with_context(|| format!("Invalid RPC URL: {}", settings.chain.rpc_url))?;
    let client = Arc::new(SignerMiddleware::new(provider, wallet.clone()));

    let chain = ChainProvider::new(client.clone(), settings.chain.chain_id);
    let safe = SafeClient::new(settings.safe_address()?, client);
    let executor = SafeExecutor::new(settings.retry.clone());

    // Ctrl+C aborts an in-flight retry sequence
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Shutdown signal received, cancelling");
            cancel.cancel();
        }
    });

    let tx = SafeTransaction::call(to, data);
    let overrides = cli.overrides();

    if cli.dry_run {
        let prepared = executor.prepare(&wallet, &safe, tx, &cancel).await?;
        let overrides = executor.resolve_overrides(&chain, &overrides, &cancel).await?;
        let report = serde_json::json!({
            "safe": safe.address(),
            "prepared": prepared,
            "overrides": overrides,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let tx_hash = match executor
        .execute_with_cancel(&wallet, &chain, &safe, tx, overrides, &cancel)
        .await
    {
        Ok(tx_hash) => tx_hash,
        Err(e) => {
            if e.is_input_error() {
                error!("Rejected before submission: {}", e);
            } else {
                error!("Safe execution failed: {}", e);
            }
            return Err(e.into());
        }
    };
    println!("{:?}", tx_hash);

    if settings.receipt.wait && !cli.no_wait {
        chain
            .wait_for_receipt(
                tx_hash,
                Duration::from_secs(settings.receipt.timeout_secs),
                Duration::from_millis(settings.receipt.poll_interval_ms),
                &cancel,
            )
            .await?;
    }

    Ok(())
}

/// Load the owner wallet from the configured environment variable
fn load_wallet(var_name: &str) -> Result<LocalWallet, SafeTxError> {
    let key = std::env::var(var_name)
        .map_err(|_| SafeTxError::Wallet(format!("No wallet configured. Set {}", var_name)))?;

    key.trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|e| SafeTxError::Wallet(format!("Invalid private key: {}", e)))
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the transaction hash / dry-run report
    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
