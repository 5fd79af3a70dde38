// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use bls_bundle::bls::{BlsDomain, DEFAULT_DOMAIN_LABEL};
use bls_bundle::rpc::{BlsRpcImpl, BlsRpcServer};
use bls_bundle::BlsSignatureAggregator;
use clap::Parser;
use dotenv::dotenv;
use ethers::types::Address;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, default_value = "127.0.0.1:8545")]
    rpc_server_addr: String,

    #[clap(short, long)]
    chain_id: u64,

    #[clap(short, long)]
    entry_point: String,

    #[clap(short, long, default_value = DEFAULT_DOMAIN_LABEL)]
    domain_label: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let entry_point: Address = args
        .entry_point
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid entry point address {}: {}", args.entry_point, e))?;

    // The helpers never report the aggregator's own address
    let aggregator = BlsSignatureAggregator::new(
        Address::zero(),
        entry_point,
        args.chain_id,
        BlsDomain::from_label(&args.domain_label),
    );

    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    let bls_rpc = BlsRpcImpl::new(Arc::new(aggregator));

    info!(
        "Starting BLS bundler helper RPC server on {} for entry point {:?}",
        server_addr, entry_point
    );

    let server_handle = start_server(server_addr, bls_rpc).await?;

    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server(server_addr: SocketAddr, bls_rpc: BlsRpcImpl) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    let server_handle = server.start(bls_rpc.into_rpc());
    Ok(server_handle)
}
