//! Chain gateway binary.

use anyhow::{Context, Result};
use chain_gateway::{GatewayConfig, GatewayService, VERSION};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Cached HTTP reads and WebSocket push updates over an EVM JSON-RPC node
#[derive(Debug, Parser)]
#[command(name = "chain-gateway", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream JSON-RPC endpoint
    #[arg(long)]
    rpc_url: Option<String>,

    /// HTTP listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Expected chain id; startup fails if the node reports another
    #[arg(long)]
    chain_id: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// File, then environment, then flags.
fn load_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GatewayConfig::default(),
    };

    config
        .apply_env_overrides(|key| std::env::var(key).ok())
        .context("applying environment overrides")?;

    if let Some(url) = &args.rpc_url {
        config.chain.rpc_url = url.clone();
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(chain_id) = args.chain_id {
        config.chain.chain_id = chain_id;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json)?;

    info!(version = VERSION, "Starting chain gateway");

    let config = load_config(&args)?;
    let service = GatewayService::new(config).await?;
    service.start().await?;

    Ok(())
}
