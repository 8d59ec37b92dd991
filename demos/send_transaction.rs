use alloy::primitives::{Address, Bytes, U256};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use txn_dispatcher::{
    ConfigManager, DispatchEvent, Dispatcher, DispatcherConfig, HttpChainProvider, WriteRequest,
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(long, value_parser)]
    private_key: String,
    #[clap(long, value_parser, default_value = "https://sepolia-rollup.arbitrum.io/rpc")]
    rpc_url: String,
    #[clap(long, value_parser, default_value_t = 421614)]
    chain_id: u64,
    /// Dispatcher config file (toml, yaml or json). Overrides --chain-id.
    #[clap(long, value_parser)]
    config: Option<String>,
    #[clap(long, value_parser)]
    to: Address,
    #[clap(long, value_parser, default_value = "0x")]
    data: Bytes,
    #[clap(long, value_parser, default_value_t = 0)]
    value_wei: u128,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigManager::new(path).load_config().unwrap(),
        None => DispatcherConfig::for_chain(cli.chain_id),
    };
    let provider = HttpChainProvider::new(&cli.rpc_url, config.chain_id, &cli.private_key).unwrap();
    let dispatcher = Dispatcher::new(provider, config).unwrap();
    let chain_id = dispatcher.config().chain_id;
    println!(
        "Signer: {:?} on chain {}",
        dispatcher.provider().address(),
        chain_id
    );
    dispatcher.run().await;

    let mut events = dispatcher.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    println!("missed {missed} events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let transaction = event.transaction();
            let stage = match &event {
                DispatchEvent::Submitted(_) => "submitted",
                DispatchEvent::Mined(_) => "mined",
                DispatchEvent::Confirmed(_) => "confirmed",
                DispatchEvent::Failed(_) => "failed",
            };
            println!(
                "{stage}: nonce {} hashes {:?}",
                transaction.nonce,
                transaction.hashes()
            );
        }
    });

    let request =
        WriteRequest::new(cli.to, cli.data, chain_id).with_value(U256::from(cli.value_wei));
    match dispatcher.send(request, "demo").await {
        Ok(receipt) => println!("Confirmed in block {}: {:?}", receipt.block_number, receipt),
        Err(err) => println!("Send failed: {}", err),
    }

    dispatcher.shutdown().await;
}
