//! # Tessera Agent CLI
//!
//! Command-line surface over the marketplace client. One subcommand per
//! user intent, plus `assets` (one-shot listing) and `watch` (live view
//! with the rental countdown running).
//!
//! ## Commands
//! - `create`: mint a new asset from an image and an attributes document
//! - `assets`: refresh and list the connected account's assets
//! - `watch`: live view, re-rendered on every registry change
//! - `set-sale-price` / `buy`: direct sale management
//! - `set-rental-price` / `set-rental-duration` / `rent`: rental management
//! - `create-auction` / `bid` / `end-auction`: auction management
//! - `transfer`: send a token to another account
//!
//! ## Environment Variables
//! - `TESSERA_LEDGER_URL`: ledger RPC endpoint (default: http://127.0.0.1:8545)
//! - `TESSERA_BLOB_URL`: blob store endpoint (default: http://127.0.0.1:3001)
//! - `TESSERA_ACCOUNT`: connected account (0x + 40 hex chars)
//! - `TESSERA_TIMEOUT_MS`: remote call timeout
//! - `TESSERA_USE_MOCK`: use the in-memory backends

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::info;

use tessera_client::{
    AssetRegistry, BlobStore, CommandDispatcher, HttpBlobStore, HttpLedger, Ledger, MockBlobStore,
    MockLedger, Refresher, RentalExpiryMonitor, SnapshotFetcher,
};
use tessera_common::{config, Account, AssetRecord, CommercialState};

#[derive(Parser)]
#[command(name = "tessera-agent", version, about = "Tessera marketplace CLI")]
struct Cli {
    /// Ledger RPC endpoint (overrides TESSERA_LEDGER_URL)
    #[arg(long)]
    ledger_url: Option<String>,

    /// Blob store endpoint (overrides TESSERA_BLOB_URL)
    #[arg(long)]
    blob_url: Option<String>,

    /// Connected account, 0x + 40 hex chars (overrides TESSERA_ACCOUNT)
    #[arg(long)]
    account: Option<String>,

    /// Use the in-memory mock ledger and blob store
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a new asset from an image file and an attributes document
    Create {
        name: String,
        description: String,
        image: PathBuf,
        /// JSON like {"attributes": [{"traitType": "Size", "value": "100x100"}]}
        #[arg(long, default_value = "")]
        attributes: String,
    },

    /// Refresh and list the connected account's assets
    Assets,

    /// Live view: re-renders on every registry change until ctrl-c
    Watch,

    /// List a token for sale (price in ETH; 0 withdraws the offer)
    SetSalePrice { token: String, price: String },

    /// Buy a listed token at its asking price (ETH)
    Buy { token: String, price: String },

    /// Advertise a token for rent (price in ETH; 0 withdraws the offer)
    SetRentalPrice { token: String, price: String },

    /// Set the rental period, in seconds
    SetRentalDuration { token: String, seconds: String },

    /// Rent a token, paying its advertised price (ETH)
    Rent { token: String, amount: String },

    /// Open an auction on a token, running for the given seconds
    CreateAuction { token: String, seconds: String },

    /// Bid on a running auction (ETH)
    Bid { token: String, amount: String },

    /// Settle an auction that has reached its end time
    EndAuction { token: String },

    /// Transfer a token to another account
    Transfer { token: String, to: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut cfg = config::from_env();
    if cli.ledger_url.is_some() {
        cfg.ledger_url = cli.ledger_url.clone();
    }
    if cli.blob_url.is_some() {
        cfg.blob_url = cli.blob_url.clone();
    }
    if cli.account.is_some() {
        cfg.account = cli.account.clone();
    }

    let account = match cfg.account.as_deref() {
        Some(s) => Account::parse(s)?,
        None => bail!("no account configured; pass --account or set TESSERA_ACCOUNT"),
    };
    let timeout_ms = cfg.timeout_ms.unwrap_or(10_000);
    let use_mock = cli.mock || cfg.use_mock.unwrap_or(false);

    let (ledger, blobs): (Arc<dyn Ledger>, Arc<dyn BlobStore>) = if use_mock {
        info!("using in-memory mock ledger and blob store");
        (Arc::new(MockLedger::new()), Arc::new(MockBlobStore::new()))
    } else {
        let ledger_url = cfg
            .ledger_url
            .unwrap_or_else(|| "http://127.0.0.1:8545".to_string());
        let blob_url = cfg
            .blob_url
            .unwrap_or_else(|| "http://127.0.0.1:3001".to_string());
        (
            Arc::new(HttpLedger::new(ledger_url, timeout_ms)),
            Arc::new(HttpBlobStore::new(blob_url, timeout_ms)),
        )
    };

    let registry = Arc::new(AssetRegistry::new());
    let fetcher = SnapshotFetcher::new(ledger.clone());
    let refresher = Arc::new(Refresher::new(fetcher, registry.clone(), account.clone()));
    let dispatcher = CommandDispatcher::new(
        ledger,
        blobs,
        registry.clone(),
        refresher.clone(),
        account.clone(),
    );

    match cli.cmd {
        Commands::Create {
            name,
            description,
            image,
            attributes,
        } => {
            let bytes = fs::read(&image)
                .with_context(|| format!("reading image {}", image.display()))?;
            let filename = image
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("image")
                .to_string();
            let id = dispatcher
                .create_asset(&name, &description, &filename, bytes, &attributes)
                .await?;
            println!("asset created: token {id}");
        }

        Commands::Assets => {
            dispatcher.refresh().await?;
            render_assets(&dispatcher.assets());
        }

        Commands::Watch => {
            dispatcher.refresh().await?;
            render_assets(&dispatcher.assets());

            let monitor_shutdown = Arc::new(Notify::new());
            let monitor = Arc::new(RentalExpiryMonitor::new(
                registry.clone(),
                refresher.clone(),
                monitor_shutdown.clone(),
            ));
            let monitor_handle = monitor.start();

            let listener_shutdown = Arc::new(Notify::new());
            let listener = dispatcher.spawn_transfer_listener(listener_shutdown.clone());

            let mut changes = registry.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        render_assets(&dispatcher.assets());
                    }
                }
            }

            monitor_shutdown.notify_one();
            monitor_handle.await?;
            if let Some(listener) = listener {
                listener_shutdown.notify_one();
                listener.await?;
            }
        }

        Commands::SetSalePrice { token, price } => {
            dispatcher.set_sale_price(&token, &price).await?;
            println!("sale price for token {token} set to {price} ETH");
        }

        Commands::Buy { token, price } => {
            dispatcher.confirm_purchase(&token, &price).await?;
            println!("purchased token {token} for {price} ETH");
        }

        Commands::SetRentalPrice { token, price } => {
            dispatcher.set_rental_price(&token, &price).await?;
            println!("rental price for token {token} set to {price} ETH");
        }

        Commands::SetRentalDuration { token, seconds } => {
            dispatcher.set_rental_duration(&token, &seconds).await?;
            println!("rental duration for token {token} set to {seconds}s");
        }

        Commands::Rent { token, amount } => {
            dispatcher.confirm_rent(&token, &amount).await?;
            println!("rented token {token} for {amount} ETH");
        }

        Commands::CreateAuction { token, seconds } => {
            dispatcher.create_auction(&token, &seconds).await?;
            println!("auction created for token {token} ({seconds}s)");
        }

        Commands::Bid { token, amount } => {
            dispatcher.place_bid(&token, &amount).await?;
            println!("bid {amount} ETH placed on token {token}");
        }

        Commands::EndAuction { token } => {
            dispatcher.end_auction(&token).await?;
            println!("auction for token {token} ended");
        }

        Commands::Transfer { token, to } => {
            dispatcher.transfer(&token, &to).await?;
            println!("token {token} transferred to {to}");
        }
    }

    Ok(())
}

fn render_assets(records: &[AssetRecord]) {
    if records.is_empty() {
        println!("no assets found");
        return;
    }
    for record in records {
        println!("token {}: {}", record.token_id, record.info.name);
        if !record.info.description.is_empty() {
            println!("  {}", record.info.description);
        }
        if !record.info.metadata_uri.is_empty() {
            println!("  metadata: {}", record.info.metadata_uri);
        }
        for attr in &record.attributes {
            println!("  {}: {}", attr.trait_type, attr.value);
        }
        match &record.state {
            CommercialState::Rented { renter, .. } => {
                if record.time_left_secs > 0 {
                    println!("  rented by {renter}, {}s left", record.time_left_secs);
                } else {
                    println!("  rented by {renter}, rental ended");
                }
            }
            state => println!("  {state}"),
        }
        if record.stale {
            println!("  (stale: pending finalization against the ledger)");
        }
    }
}
