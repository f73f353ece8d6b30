//! Credence node entry point.
//!
//! Starts the node with configuration from a TOML file or defaults.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use credence_node::{CredenceConfig, CredenceNode};

/// Credence credential service node
#[derive(Parser, Debug)]
#[command(name = "credence-node", version, about = "Credence credential service node")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "credence.toml")]
    config: PathBuf,

    /// Override the API port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Installation API key. Takes precedence over CREDENCE_API_KEY.
    #[arg(long)]
    api_key: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init {
        let config = CredenceConfig::default();
        config.save(&args.config)?;
        println!("wrote default config to {}", args.config.display());
        return Ok(());
    }

    let mut config = CredenceConfig::load(&args.config)?;
    config.apply_env();
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(ref data_dir) = args.data_dir {
        config.storage.data_dir = data_dir.clone();
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(key) = args.api_key {
        config.auth.api_key = Some(key);
    }

    init_tracing(&config.logging.level, &config.logging.format);
    tracing::info!("Credence node v{}", env!("CARGO_PKG_VERSION"));
    if config.auth.api_key.is_none() {
        tracing::warn!("no installation API key configured, root access disabled");
    }

    let mut node = CredenceNode::new(config)?;
    node.start().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("received shutdown signal");
    };

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server task failed");
            }
        }
        _ = shutdown => {
            tracing::info!("initiating graceful shutdown");
        }
    }

    node.shutdown().await?;
    tracing::info!("Credence node exited cleanly");
    Ok(())
}
