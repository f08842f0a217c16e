// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

mod api;
mod cache;
mod config;
mod error;
mod hashing;
mod normalizer;
mod operation;
mod paymaster;
mod paymaster_data;
mod rpc;
mod signer;
mod types;
mod version;

use crate::cache::MemoryCache;
use crate::config::{Args, PaymasterConfig};
use crate::paymaster::Paymaster;
use crate::rpc::{PaymasterRpcImpl, PaymasterRpcServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing before the configuration logs anything
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.max_log_level().unwrap_or(Level::INFO))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = PaymasterConfig::from_args(&args)?;

    let mut paymaster = Paymaster::new(config.signing.clone(), config.settings.clone());
    if let Some(ttl) = config.cache_ttl {
        info!(
            "Result cache enabled with TTL {:?} and at most {} entries",
            ttl, config.cache_max_entries
        );
        let cache = Arc::new(MemoryCache::with_max_entries(ttl, config.cache_max_entries));
        spawn_cache_cleanup(cache.clone(), ttl);
        paymaster = paymaster.with_cache(cache);
    }
    let paymaster = Arc::new(paymaster);

    info!("Starting ERC-4337 Paymaster RPC server on {}", config.rpc_addr);
    let server_handle = start_server(config.rpc_addr, PaymasterRpcImpl::new(paymaster.clone())).await?;

    info!("Starting HTTP API on http://{}", config.http_addr);
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;

    // Keep the servers running until Ctrl+C is pressed
    axum::serve(listener, api::routes(paymaster))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

fn spawn_cache_cleanup(cache: Arc<MemoryCache>, interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            cache.purge_expired().await;
            debug!("Purged expired cache entries, {} remaining", cache.len().await);
        }
    });
}

async fn start_server(
    server_addr: SocketAddr,
    paymaster_rpc: PaymasterRpcImpl,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    let server_handle = server.start(paymaster_rpc.into_rpc());

    Ok(server_handle)
}
