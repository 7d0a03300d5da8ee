//! CLI command implementations

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{mask_url, Config, Secrets, MNEMONIC_ENV};
use crate::error::Error;
use crate::ledger::{AccountState, JsonRpcClient, LedgerClient};
use crate::sweep::{Preview, SweepController, SweepDecision};
use crate::wallet::{format_xrp, Address, KeyDeriver, Keypair, SecretPhrase};

/// Derive the sweep keypair and read the destination
///
/// The phrase is dropped, and zeroized, before this returns.
fn load_identity() -> crate::Result<(Keypair, Address)> {
    let secrets = Secrets::from_env()?;
    let keypair = KeyDeriver::default().derive(&secrets.phrase)?;
    Ok((keypair, secrets.destination))
}

fn phrase_from_env() -> crate::Result<SecretPhrase> {
    let phrase = SecretPhrase::new(std::env::var(MNEMONIC_ENV).unwrap_or_default());
    if phrase.is_empty() {
        return Err(Error::MissingEnvVar(MNEMONIC_ENV.to_string()));
    }
    Ok(phrase)
}

/// Start the sweeper
pub async fn run(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - nothing will be submitted");
    }

    let (keypair, destination) = load_identity()?;
    info!("Sweep account: {} ({})", keypair.address(), keypair.path());
    info!("Destination: {}", destination);

    info!("Initializing RPC client ({})...", mask_url(&config.rpc.endpoint));
    let client = JsonRpcClient::new(&config.rpc)?;
    let controller = SweepController::new(client, keypair, destination, config);

    if dry_run {
        let preview = controller.preview().await?;
        print_preview(config, &controller.address(), &destination, &preview);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(watch_signals(shutdown.clone()));

    let result = controller.run(shutdown).await;
    signals.abort();

    match result {
        Ok(receipt) => {
            println!("\n=== SWEEP COMPLETE ===\n");
            println!("Hash:        {}", receipt.hash);
            println!("Amount:      {} XRP", format_xrp(receipt.amount));
            println!("Destination: {}", receipt.destination);
            println!("Ledger:      {}", receipt.ledger_index);
            println!("Submissions: {}", receipt.submissions);
            println!("Completed:   {}", receipt.completed_at.to_rfc3339());
            Ok(())
        }
        Err(Error::UnknownOutcome { hash }) => {
            error!(
                "Stopped with {} in flight. Look it up before restarting; it may still validate.",
                hash
            );
            Err(Error::UnknownOutcome { hash }.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Cancel `shutdown` on SIGINT, or SIGTERM on Unix
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = terminate.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Cannot listen for SIGINT: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl-C");
    }

    shutdown.cancel();
}

fn print_preview(config: &Config, account: &Address, destination: &Address, preview: &Preview) {
    println!("\n=== SWEEP STATUS ===\n");
    println!("Account:     {}", account);
    println!("Destination: {}", destination);

    match preview.account {
        AccountState::NotFound => println!("State:       not activated"),
        AccountState::Funded {
            balance,
            sequence,
            ledger_index,
        } => {
            println!("Balance:     {} XRP", format_xrp(balance));
            println!("Sequence:    {}", sequence);
            println!("Ledger:      {}", ledger_index);
        }
    }
    println!("Floor:       {} XRP", format_xrp(config.policy.floor()));

    match preview.decision {
        SweepDecision::Wait(reason) => println!("Decision:    wait ({})", reason),
        SweepDecision::Sweep { amount } => {
            println!("Decision:    sweep {} XRP", format_xrp(amount))
        }
    }

    if let Some(tx) = &preview.transaction {
        println!("\n=== SIGNED (NOT SUBMITTED) ===\n");
        println!("Hash:        {}", tx.hash());
        println!("Fee:         {} drops", tx.payment().fee);
        println!("Valid until: ledger {}", tx.last_ledger_sequence());
        println!("Blob:        {}", tx.blob_hex());
    }
}

/// Show the derived account
pub fn address() -> Result<()> {
    let phrase = phrase_from_env()?;
    let keypair = KeyDeriver::default().derive(&phrase)?;

    println!("Address:    {}", keypair.address());
    println!("Public key: {}", keypair.public_key_hex());
    println!("Path:       {}", keypair.path());
    Ok(())
}

/// Fetch the account once and show what a sweep would do
pub async fn status(config: &Config) -> Result<()> {
    let (keypair, destination) = load_identity()?;
    let client = JsonRpcClient::new(&config.rpc)?;
    let controller = SweepController::new(client, keypair, destination, config);

    let preview = controller
        .preview()
        .await
        .context("Failed to fetch account state")?;
    print_preview(config, &controller.address(), &destination, &preview);
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check system health
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;

    // Check RPC
    print!("RPC Endpoint... ");
    let client = JsonRpcClient::new(&config.rpc)?;
    match client.health().await {
        Ok(health) => println!(
            "OK ({}ms, validated ledger {})",
            health.latency.as_millis(),
            health.validated_ledger
        ),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    // Check secrets
    print!("Secrets... ");
    match load_identity() {
        Ok((keypair, destination)) => {
            println!("OK (account {}, destination {})", keypair.address(), destination)
        }
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy!");
        Ok(())
    } else {
        println!("Some systems are unhealthy. Check the errors above.");
        anyhow::bail!("Health check failed")
    }
}
