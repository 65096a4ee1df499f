//! mint-submit
//!
//! Mints tokens to a destination account and waits for confirmation.
//!
//! # Architecture Overview
//!
//! ```text
//!   mint.toml / settings.json ──▶ config ──▶ MintRequest
//!                                               │
//!                                               ▼
//!   ┌──────────────────────────── pipeline ─────────────────────────────┐
//!   │  instruction ──▶ checkpoint ──▶ assemble ──▶ sign ──▶ broadcast   │
//!   │                     ▲                                  │    ▲     │
//!   └─────────────────────┼──────────────────────────────────┼────┼─────┘
//!                         │            JSON-RPC (HTTP)       │    │ signatureNotification
//!                         └──────────── RpcClient ◀──────────┘    │ (WebSocket)
//!                                                        PubsubClient
//! ```
//!
//! The transaction signature goes to stdout; logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::Parser;

use mint_submit::chain::{Commitment, Keypair, PubsubClient, RpcClient};
use mint_submit::config::{read_config, validate_config, ConfigError};
use mint_submit::lifecycle::{signals, Shutdown};
use mint_submit::observability::logging;
use mint_submit::pipeline::{MintPipeline, MintRequest, PipelineOptions};

#[derive(Parser)]
#[command(name = "mint-submit")]
#[command(about = "Mint tokens and wait for confirmation", long_about = None)]
struct Cli {
    /// TOML config, or a legacy `.json` settings file
    #[arg(short, long, default_value = "mint.toml")]
    config: PathBuf,

    /// Amount to mint, in base units
    #[arg(short, long)]
    amount: Option<u64>,

    /// Destination token account (defaults to the wallet's associated token account)
    #[arg(short, long)]
    destination: Option<String>,

    /// Commitment to wait for (processed, confirmed, finalized)
    #[arg(long)]
    commitment: Option<Commitment>,

    /// Build and sign, then print the base64 transaction instead of sending it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = read_config(&cli.config)?;
    if let Some(amount) = cli.amount {
        config.mint.amount = amount;
    }
    if let Some(destination) = cli.destination {
        config.mint.destination = Some(destination);
    }
    if let Some(commitment) = cli.commitment {
        config.rpc.commitment = commitment;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(
        config = %cli.config.display(),
        rpc_url = %config.rpc.rpc_url,
        commitment = %config.rpc.commitment,
        "mint-submit v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let keypair = Keypair::load(&config.wallet)?;
    let rpc = RpcClient::new(&config.rpc)?;

    let request = MintRequest::from_config(&config.mint, &keypair.pubkey());
    let options = PipelineOptions::from_config(&config.rpc).with_fee_payer(keypair.pubkey());
    let pipeline = MintPipeline::new(&rpc, &keypair, options);

    if cli.dry_run {
        let tx = pipeline.prepare(&request).await?;
        println!("{}", BASE64.encode(tx.to_wire_bytes()?));
        return Ok(());
    }

    let pubsub = PubsubClient::connect(
        &config.rpc.ws_url,
        Duration::from_secs(config.rpc.request_timeout_secs),
    )
    .await?;

    let shutdown = Shutdown::new();
    let mut shutdown_rx = shutdown.subscribe();
    let _signals = signals::spawn_ctrl_c_handler(shutdown.clone());

    let confirmation = pipeline.run(&pubsub, &request, &mut shutdown_rx).await?;
    tracing::info!(
        signature = %confirmation.signature,
        slot = confirmation.slot,
        commitment = %confirmation.commitment,
        "Mint complete"
    );
    println!("{}", confirmation.signature);
    Ok(())
}
