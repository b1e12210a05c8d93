mod api;
mod config;
mod consensus;
mod error;
mod ledger;
mod miner;
mod wallet;

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::info;

use api::AppState;
use config::{EmuConfig, Network};
use consensus::{ChainState, MIN_SEED_AMOUNT, Payment};
use ledger::{Ledger, NodeClient, ensure_bootstrapped};
use miner::{Coordinator, MinerSettings};
use wallet::Account;

/// Native units the localnet faucet hands to a deploying account.
const DEPLOY_FUNDING: u64 = 1_000_000;

#[derive(Parser)]
#[command(name = "emu-chain", version, about = "Proof-of-work chain emulator")]
struct Cli {
    /// Key-value settings file
    #[arg(long, global = true, default_value = config::DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Select localnet, testnet or mainnet
    Network { name: String },
    /// Show the configured account, creating one on first use
    Account,
    /// Serve an in-memory ledger over HTTP
    Node {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create and bootstrap the emulator application
    Deploy,
    /// Mine blocks until interrupted
    Mine {
        /// Coinbase tag; defaults to the account address bytes
        #[arg(long)]
        coinbase: Option<String>,
    },
    /// Print the latest chain state
    Chain,
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = dotenv();
    env_logger::init();

    let cli = Cli::parse();
    let mut config = EmuConfig::load(&cli.env_file)?;

    match cli.command {
        Command::Network { name } => {
            let network: Network = name.parse()?;
            config.set(config::NETWORK, network.as_str())?;
            println!("Network set to {network}");
        }
        Command::Account => {
            let account = account_or_create(&mut config)?;
            println!("{}", account.address());
        }
        Command::Node { host, port } => serve(host, port).await?,
        Command::Deploy => deploy(&mut config).await?,
        Command::Mine { coinbase } => mine(&config, coinbase).await?,
        Command::Chain => {
            // reads need no identity; any key will do
            let account = config.account().unwrap_or_else(|_| Account::generate());
            let node = NodeClient::new(config.node_url()?, account);
            let state = node.app(config.app_id()?).get_state().await?;
            print_state(&state);
        }
    }
    Ok(())
}

fn account_or_create(config: &mut EmuConfig) -> Result<Account, Box<dyn Error>> {
    if config.get(config::ACCOUNT_SECRET).is_some() {
        return Ok(config.account()?);
    }
    let account = Account::generate();
    config.set(config::ACCOUNT_SECRET, account.secret_hex())?;
    info!("generated account {}", account.address());
    Ok(account)
}

async fn serve(host: Option<String>, port: Option<u16>) -> std::io::Result<()> {
    let host = host
        .or_else(|| env::var("HOST").ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = port
        .or_else(|| env::var("PORT").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(8080);

    println!("⛓️ Starting emulator node at http://{host}:{port}");

    let state = web::Data::new(AppState::default());

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

async fn deploy(config: &mut EmuConfig) -> Result<(), Box<dyn Error>> {
    config.ensure_not_deployed()?;
    let network = config.network()?;
    let node = NodeClient::new(config.node_url()?, account_or_create(config)?);

    if network == Network::Localnet {
        node.fund(DEPLOY_FUNDING).await?;
    }
    let app_info = node.create_app().await?;
    let app = node.app(app_info.app_id);

    let seed = Payment {
        sender: node.address(),
        receiver: app_info.app_address.clone(),
        amount: MIN_SEED_AMOUNT,
    };
    let asset_id = ensure_bootstrapped(&app, seed).await?;
    node.opt_in(asset_id).await?;

    config.set(config::CREATOR, node.address())?;
    config.set(config::APP_ID, app_info.app_id.to_string())?;
    config.set(config::APP_ADDRESS, app_info.app_address.as_str())?;
    config.set(config::ASSET_ID, asset_id.to_string())?;

    println!(
        "Deployed app {} ({}) with reward asset {asset_id} on {network}",
        app_info.app_id, app_info.app_address
    );
    Ok(())
}

async fn mine(config: &EmuConfig, coinbase: Option<String>) -> Result<(), Box<dyn Error>> {
    let node = NodeClient::new(config.node_url()?, config.account()?);
    let app_id = config.app_id()?;
    let asset_id = config.asset_id()?;

    if !node.account().await?.is_opted_in(asset_id) {
        node.opt_in(asset_id).await?;
    }

    let coinbase = coinbase.map(String::into_bytes).unwrap_or_else(|| {
        let address = node.address();
        hex::decode(&address).unwrap_or_else(|_| address.into_bytes())
    });
    let settings = MinerSettings {
        coinbase,
        ..MinerSettings::default()
    };

    println!("Mining app {app_id} as {} (Ctrl-C to stop)", node.address());
    let mut coordinator = Coordinator::new(Arc::new(node.app(app_id)), settings);
    coordinator
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}

fn timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

fn print_state(state: &ChainState) {
    let row = |k: &str, v: String| println!("{k:<20} {v}");
    row("block height", state.block_height.to_string());
    row("block hash", hex::encode(consensus::pow::u256_to_bytes(&state.block_hash)));
    row("coinbase", hex::encode(&state.coinbase));
    row("time", timestamp(state.time));
    row("prev retarget time", timestamp(state.prev_retarget_time));
    row("target", hex::encode(consensus::pow::u256_to_bytes(&state.target)));
    row(
        "asset id",
        state
            .asset_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    row("creator", state.creator.clone());
}
