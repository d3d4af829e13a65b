//! Metadata replica binary

use anyhow::Context;
use blocksync::common::{socket_addr_of, ClusterConfig};
use blocksync::MetadataServer;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "blocksync-meta")]
#[command(about = "blocksync metadata replica")]
#[command(version)]
struct Args {
    /// Cluster configuration file (TOML)
    config_file: PathBuf,

    /// Which replica this server is (1-based)
    #[arg(short, long, default_value = "1")]
    number: usize,

    /// Maximum number of concurrent requests (overrides config)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Bind address (defaults to the configured replica address)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ClusterConfig::load(&args.config_file)
        .with_context(|| format!("loading {}", args.config_file.display()))?;
    if let Some(threads) = args.threads {
        anyhow::ensure!(threads > 0, "--threads must be positive");
        config.threads = threads;
    }

    let level = args.log_level.unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind = match args.bind {
        Some(addr) => addr,
        None => socket_addr_of(config.replica_addr(args.number)?)?,
    };
    let server = MetadataServer::new(&config, args.number)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .thread_name("blocksync-meta")
        .enable_all()
        .build()?;

    runtime.block_on(server.serve(bind))?;
    Ok(())
}
