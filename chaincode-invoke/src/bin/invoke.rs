//! Chaincode invoke demo binary
//!
//! Usage: `invoke <fcn> [args...]`
//!
//! Runs against the in-process network. Peer URLs come from `INVOKE_PEERS`
//! (comma separated), configuration from the TOML file named by
//! `INVOKE_CONFIG` or from `INVOKE_*` environment variables.

use anyhow::{bail, Context};
use chaincode_invoke::{network::memory::MemoryNetwork, Config, InvokeRequest, Invoker};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

const DEFAULT_PEERS: &str = "grpc://peer0.org1:7051,grpc://peer1.org1:8051,grpc://peer0.org2:9051";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if std::env::var("INVOKE_LOG_JSON").map(|v| v == "1").unwrap_or(false) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut args = std::env::args().skip(1);
    let Some(fcn) = args.next() else {
        bail!("usage: invoke <fcn> [args...]");
    };
    let fcn_args: Vec<String> = args.collect();

    // Load configuration
    let config = match std::env::var("INVOKE_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => Config::from_env().context("loading configuration from environment")?,
    };
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        wait_ms = config.event_wait_time_ms,
        "Starting chaincode invoke"
    );

    let peer_urls: Vec<String> = std::env::var("INVOKE_PEERS")
        .unwrap_or_else(|_| DEFAULT_PEERS.to_string())
        .split(',')
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();

    let channel_id = std::env::var("INVOKE_CHANNEL").unwrap_or_else(|_| "mychannel".to_string());
    let chaincode_id = std::env::var("INVOKE_CHAINCODE").unwrap_or_else(|_| "assets".to_string());

    let network = Arc::new(MemoryNetwork::new());
    let invoker = Invoker::new(network.clone(), network.clone(), network, config)?;

    let request = InvokeRequest::new(peer_urls, channel_id, chaincode_id, fcn)
        .with_args(fcn_args)
        .with_identity("admin", "org1");

    let tx_id = invoker.invoke_chaincode(&request).await?;
    println!("{}", tx_id);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&invoker.metrics().registry().gather(), &mut buffer)?;
    tracing::debug!("metrics:\n{}", String::from_utf8_lossy(&buffer));

    Ok(())
}
