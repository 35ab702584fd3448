//! CLI command implementations

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::native_token::lamports_to_sol;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::forwarder::{ConfirmationTracker, ForwardingService};
use crate::wallet::{
    load_keypair, AddressWatcher, DryRunWallet, EventDispatcher, RpcWallet, Wallet,
};

fn rpc_client(config: &Config) -> Arc<RpcClient> {
    Arc::new(RpcClient::new_with_timeout_and_commitment(
        config.rpc_endpoint(),
        Duration::from_millis(config.rpc.timeout_ms),
        CommitmentConfig::from(config.rpc.commitment),
    ))
}

/// Start the forwarder and run until ctrl-c
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - nothing will be forwarded on-chain");
    }

    info!("Starting forwarder on {} network...", config.forwarder.network);
    let settings = config.forwarder_settings()?;

    let keypair = load_keypair(&config.wallet.keypair_path)?;
    let client = rpc_client(config);
    let rpc_wallet = Arc::new(RpcWallet::new(client.clone(), keypair));

    // Bootstrap: fatal if the node never becomes reachable
    rpc_wallet
        .wait_until_ready(Duration::from_secs(config.rpc.startup_timeout_secs))
        .await?;

    let address = rpc_wallet.receive_address();
    match rpc_wallet.balance().await {
        Ok(balance) => info!("Wallet {} balance: {} SOL", address, lamports_to_sol(balance)),
        Err(e) => warn!("Could not read wallet balance: {}", e),
    }

    let wallet: Arc<dyn Wallet> = if dry_run {
        Arc::new(DryRunWallet::new(rpc_wallet))
    } else {
        rpc_wallet
    };

    let dispatcher = Arc::new(EventDispatcher::new());
    let tracker = Arc::new(ConfirmationTracker::new());
    let service = ForwardingService::new(settings, wallet, dispatcher.clone(), tracker.clone())?;

    println!("Send coins to: {}", address);
    println!(
        "They will be forwarded to {} after {} confirmation(s)",
        config.forwarder.destination_address, config.forwarder.confirmation_depth
    );

    let watcher_cancel = CancellationToken::new();
    let watcher = AddressWatcher::new(
        client,
        address,
        dispatcher,
        tracker,
        Duration::from_millis(config.rpc.poll_interval_ms),
        config.rpc.commitment.into(),
    )
    .spawn(watcher_cancel.clone());

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    };

    let stats = service.run_until(shutdown_signal).await?;

    // Unsubscribed already; now stop the event source itself
    watcher_cancel.cancel();
    if let Err(e) = watcher.await {
        error!("Address watcher task failed: {}", e);
    }

    println!(
        "Forwarded {} payment(s), {} SOL total, {} failed",
        stats.forwarded,
        lamports_to_sol(stats.forwarded_lamports),
        stats.failed
    );
    Ok(())
}

/// Print the receive address (and balance if the node is reachable)
pub async fn address(config: &Config) -> Result<()> {
    let keypair = load_keypair(&config.wallet.keypair_path)?;
    let wallet = RpcWallet::new(rpc_client(config), keypair);

    println!("Receive address: {}", wallet.receive_address());
    match wallet.balance().await {
        Ok(balance) => println!("Balance: {} SOL", lamports_to_sol(balance)),
        Err(e) => println!("Balance: unavailable ({})", e),
    }
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check system health
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;

    print!("RPC Endpoint... ");
    match check_rpc(config).await {
        Ok(latency) => println!("OK ({}ms)", latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Keypair... ");
    match load_keypair(&config.wallet.keypair_path) {
        Ok(_) => println!("OK"),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!();
    if all_healthy {
        println!("All systems operational");
        Ok(())
    } else {
        anyhow::bail!("Health check failed")
    }
}

async fn check_rpc(config: &Config) -> Result<u64> {
    let client = rpc_client(config);

    let start = Instant::now();
    client.get_health().await?;
    client.get_slot().await?;
    let latency = start.elapsed().as_millis() as u64;

    Ok(latency)
}
