//! Block store binary

use anyhow::Context;
use blocksync::common::{socket_addr_of, ClusterConfig};
use blocksync::{BlockServer, BlockStore};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "blocksync-block")]
#[command(about = "blocksync content-addressed block store")]
#[command(version)]
struct Args {
    /// Cluster configuration file (TOML)
    config_file: PathBuf,

    /// Maximum number of concurrent requests (overrides config)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Bind address (defaults to the configured block store address)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Persist blocks in a sled database at this path
    #[cfg(feature = "sled-backend")]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ClusterConfig::load(&args.config_file)
        .with_context(|| format!("loading {}", args.config_file.display()))?;
    let threads = args.threads.unwrap_or(config.threads).max(1);

    let level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind = match args.bind {
        Some(addr) => addr,
        None => socket_addr_of(&config.block_store)?,
    };

    #[cfg(feature = "sled-backend")]
    let store = match &args.data_dir {
        Some(dir) => BlockStore::open_sled(dir)?,
        None => BlockStore::in_memory(),
    };
    #[cfg(not(feature = "sled-backend"))]
    let store = BlockStore::in_memory();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name("blocksync-block")
        .enable_all()
        .build()?;

    runtime.block_on(BlockServer::new(store, threads).serve(bind))?;
    Ok(())
}
