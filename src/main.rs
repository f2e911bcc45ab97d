//! Quickstart command-line client for a DAppChain.
//!
//! ```text
//! dappchain-client keygen
//! dappchain-client set 123 1          # BluePrint SetMsg
//! dappchain-client get 123            # BluePrint GetMsg
//! dappchain-client check 123 1        # compare, increment, submit
//! dappchain-client evm-set "hello 42" # tile-map SetTileMapState
//! dappchain-client evm-get            # tile-map GetTileMapState
//! dappchain-client watch --count 3    # stream OnTileMapStateUpdate
//! ```

use alloy::dyn_abi::DynSolValue;
use clap::{Parser, Subcommand};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use dappchain_client::account::keys::PRIVATE_KEY_ENV_VAR;
use dappchain_client::config::{load_config, ClientConfig};
use dappchain_client::contract::{ChainEvent, Contract, EvmContract};
use dappchain_client::observability::{logging, metrics};
use dappchain_client::quickstart::{
    check_set_send, CheckOutcome, MapEntry, OnTileMapStateUpdate, GET_MSG, GET_TILE_MAP_STATE,
    SET_MSG, SET_TILE_MAP_STATE, TILE_MAP_ABI,
};
use dappchain_client::{Address, ChainClient, ChainError, KeyPair};

#[derive(Parser)]
#[command(name = "dappchain-client")]
#[command(about = "Quickstart client for a DAppChain", long_about = None)]
struct Cli {
    /// TOML config file; built-in local defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the local WebSocket endpoints instead of HTTP (ignored with --config).
    #[arg(long)]
    ws: bool,

    /// Hex private key; falls back to the environment, then a fresh key.
    #[arg(long)]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair and print it
    Keygen,
    /// Store a value in the key/value contract
    Set { key: String, value: String },
    /// Read a value from the key/value contract
    Get { key: String },
    /// Check the stored counter against a local one, then increment it
    Check { key: String, local: i64 },
    /// Store the tile-map state
    EvmSet { state: Option<String> },
    /// Read the tile-map state
    EvmGet,
    /// Print tile-map state updates as they are emitted
    Watch {
        /// Stop after this many events.
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Keygen = cli.command {
        let keys = KeyPair::generate();
        println!("private key: {}", keys.private_key_hex());
        println!("public key:  {}", alloy::primitives::hex::encode_prefixed(keys.public_key()));
        println!("address:     {}", keys.address());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None if cli.ws => ClientConfig::local_websocket(),
        None => ClientConfig::local_http(),
    };

    logging::init_logging(&config.observability)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let keys = Arc::new(load_keys(cli.private_key.as_deref())?);
    tracing::info!(
        caller = %keys.address(),
        writer = %config.writer.endpoint_url,
        reader = %config.reader.endpoint_url,
        "Connecting to DAppChain"
    );
    let client = Arc::new(ChainClient::connect(&config, keys.clone()).await?);

    match cli.command {
        Commands::Keygen => {}
        Commands::Set { key, value } => {
            let contract = plain_contract(&client, &config, &keys).await?;
            let receipt = contract
                .call_with_retry(&config.retries, SET_MSG, &MapEntry::new(key, value))
                .await?;
            println!("committed {} at height {}", receipt.hash, receipt.height);
        }
        Commands::Get { key } => {
            let contract = plain_contract(&client, &config, &keys).await?;
            match contract
                .static_call::<_, MapEntry>(GET_MSG, &MapEntry::lookup(key.as_str()))
                .await
            {
                Ok(entry) => println!("{} = {}", entry.key, entry.value),
                Err(ChainError::EmptyResult { .. }) => println!("{} has no value", key),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Check { key, local } => {
            let contract = plain_contract(&client, &config, &keys).await?;
            match check_set_send(&contract, &config.retries, &key, local).await? {
                CheckOutcome::CheaterDetected { chain, local } => {
                    tracing::warn!(key = %key, chain, local, "Counter mismatch");
                    println!("CHEATER IS DETECTED! chain has {}, local has {}", chain, local);
                }
                CheckOutcome::Advanced { value, receipt } => {
                    println!("{} = {} (tx {})", key, value, receipt.hash);
                }
            }
        }
        Commands::EvmSet { state } => {
            let contract = tile_contract(&client, &config, &keys)?;
            let state =
                state.unwrap_or_else(|| format!("hello {}", rand::thread_rng().gen_range(0..10000)));
            let receipt = contract
                .call_with_retry(
                    &config.retries,
                    SET_TILE_MAP_STATE,
                    &[DynSolValue::String(state.clone())],
                )
                .await?;
            println!("stored '{}' (tx {})", state, receipt.hash);
        }
        Commands::EvmGet => {
            let contract = tile_contract(&client, &config, &keys)?;
            let state: String = contract.static_call_simple(GET_TILE_MAP_STATE, &[]).await?;
            println!("{}", state);
        }
        Commands::Watch { count } => {
            let contract = tile_contract(&client, &config, &keys)?;
            watch(&contract, count).await?;
        }
    }

    Ok(())
}

fn load_keys(private_key: Option<&str>) -> Result<KeyPair, ChainError> {
    if let Some(hex) = private_key {
        return Ok(KeyPair::from_private_key(hex)?);
    }
    if std::env::var_os(PRIVATE_KEY_ENV_VAR).is_some() {
        return Ok(KeyPair::from_env()?);
    }
    tracing::info!("No private key supplied, using a fresh one");
    Ok(KeyPair::generate())
}

async fn plain_contract(
    client: &Arc<ChainClient>,
    config: &ClientConfig,
    keys: &KeyPair,
) -> Result<Contract, ChainError> {
    Contract::resolve(client.clone(), &config.contracts.plain_name, keys.address()).await
}

fn tile_contract(
    client: &Arc<ChainClient>,
    config: &ClientConfig,
    keys: &KeyPair,
) -> Result<EvmContract, ChainError> {
    let address = Address::from_hex(&config.contracts.evm_address)?;
    EvmContract::new(client.clone(), address, keys.address(), TILE_MAP_ABI)
}

async fn watch(contract: &EvmContract, count: Option<usize>) -> Result<(), ChainError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChainEvent>();
    let subscription = contract
        .subscribe(move |event| {
            let _ = tx.send(event);
        })
        .await?;
    println!("watching {} (ctrl-c to stop)", contract.address());

    let mut seen = 0;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event.decode::<OnTileMapStateUpdate>() {
                    Ok(update) => println!("[{}] {}", event.block_height, update.state),
                    Err(e) => tracing::warn!(
                        event = event.event_name.as_deref().unwrap_or("<unknown>"),
                        error = %e,
                        "Skipping undecodable event"
                    ),
                }
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscription.unsubscribe().await
}
