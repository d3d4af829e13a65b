//! CLI for blocksync clusters

use anyhow::{bail, Context};
use blocksync::blockstore::{Block, BlockStoreClient, HttpBlockClient};
use blocksync::common::utils::{retry_with_backoff, DEFAULT_BLOCK_SIZE};
use blocksync::common::{split_blocks, ClusterConfig};
use blocksync::metadata::MetadataClient;
use blocksync::WriteOutcome;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Attempts before giving up on a contended upload/delete
const MAX_WRITE_ATTEMPTS: usize = 8;

#[derive(Parser)]
#[command(name = "blocksync")]
#[command(about = "blocksync cluster CLI")]
#[command(version)]
struct Cli {
    /// Cluster configuration file (TOML)
    #[arg(long, default_value = "cluster.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the block store and every metadata replica
    Ping,

    /// Check whether a block is stored
    HasBlock { hash: String },

    /// Store a file's contents as a single block
    StoreBlock { file: PathBuf },

    /// Fetch a block by hash
    GetBlock {
        hash: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show a file's record
    Read {
        name: String,
        /// Replica to ask (defaults to the leader)
        #[arg(long)]
        number: Option<usize>,
    },

    /// Upload a file (blocks + metadata)
    Upload {
        path: PathBuf,
        /// Filename to register (defaults to the path's file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Download a file by name
    Download { name: String, output: PathBuf },

    /// Delete a file (writes a tombstone)
    Delete { name: String },

    /// Put a replica into the crashed state
    Crash {
        #[arg(long)]
        number: usize,
    },

    /// Bring a crashed replica back
    Restore {
        #[arg(long)]
        number: usize,
    },

    /// Show role and crash state of every replica
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClusterConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let blocks = HttpBlockClient::new(config.block_store.clone())?;
    let leader = MetadataClient::new(config.leader_addr()?)?;

    match cli.command {
        Commands::Ping => {
            retry_with_backoff(|| blocks.ping(), 3, Duration::from_millis(200)).await?;
            println!("block store  {}  ok", blocks.base_url());
            for (i, addr) in config.metadata.iter().enumerate() {
                let client = MetadataClient::new(addr.clone())?;
                match client.ping().await {
                    Ok(()) => println!("metadata{}    {}  ok", i + 1, addr),
                    Err(e) => println!("metadata{}    {}  {}", i + 1, addr, e),
                }
            }
        }
        Commands::HasBlock { hash } => {
            println!("{}", blocks.has_block(&hash).await?);
        }
        Commands::StoreBlock { file } => {
            let data = tokio::fs::read(&file).await?;
            let block = Block::new(data);
            blocks.store_block(&block).await?;
            println!("{}", block.hash);
        }
        Commands::GetBlock { hash, output } => {
            let Some(block) = blocks.get_block(&hash).await? else {
                bail!("block {} not found", hash);
            };
            match output {
                Some(path) => tokio::fs::write(path, &block.data).await?,
                None => println!("{} bytes", block.data.len()),
            }
        }
        Commands::Read { name, number } => {
            let client = match number {
                Some(n) => MetadataClient::new(config.replica_addr(n)?)?,
                None => leader,
            };
            let record = client.read_file(&name).await?;
            println!("{} v{}", record.filename, record.version);
            for hash in &record.blocklist {
                println!("  {}", hash);
            }
        }
        Commands::Upload { path, name } => {
            let name = match name {
                Some(n) => n,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("cannot derive a filename from path")?,
            };
            let data = tokio::fs::read(&path).await?;
            let version = upload(&leader, &blocks, &name, &data).await?;
            println!("{} uploaded at version {}", name, version);
        }
        Commands::Download { name, output } => {
            let record = leader.read_file(&name).await?;
            if !record.is_live() {
                bail!("{} not found", name);
            }
            let mut data = Vec::new();
            for hash in &record.blocklist {
                let block = blocks
                    .get_block(hash)
                    .await?
                    .with_context(|| format!("block {} missing from block store", hash))?;
                data.extend_from_slice(&block.data);
            }
            tokio::fs::write(&output, &data).await?;
            println!("{} v{} -> {}", name, record.version, output.display());
        }
        Commands::Delete { name } => {
            for _ in 0..MAX_WRITE_ATTEMPTS {
                let current = leader.read_file(&name).await?;
                if !current.is_live() {
                    bail!("{} not found", name);
                }
                match leader.delete_file(&name, current.version + 1).await? {
                    WriteOutcome::Ok { version } => {
                        println!("{} deleted at version {}", name, version);
                        return Ok(());
                    }
                    WriteOutcome::OldVersion { .. } => continue,
                    other => bail!("delete failed: {}", other),
                }
            }
            bail!("delete of {} kept racing with other writers", name);
        }
        Commands::Crash { number } => {
            MetadataClient::new(config.replica_addr(number)?)?.crash().await?;
            println!("metadata{} crashed", number);
        }
        Commands::Restore { number } => {
            MetadataClient::new(config.replica_addr(number)?)?.restore().await?;
            println!("metadata{} restored", number);
        }
        Commands::Status => {
            for (i, addr) in config.metadata.iter().enumerate() {
                let client = MetadataClient::new(addr.clone())?;
                let leader = client.is_leader().await;
                let crashed = client.is_crashed().await;
                match (leader, crashed) {
                    (Ok(l), Ok(c)) => println!(
                        "metadata{}  {}  {}  {}",
                        i + 1,
                        addr,
                        if l { "leader" } else { "follower" },
                        if c { "CRASHED" } else { "up" }
                    ),
                    (Err(e), _) | (_, Err(e)) => println!("metadata{}  {}  {}", i + 1, addr, e),
                }
            }
        }
    }

    Ok(())
}

/// Split `data` into blocks and register them under `name`, uploading
/// whatever the leader reports missing.
async fn upload(
    meta: &MetadataClient,
    blocks: &HttpBlockClient,
    name: &str,
    data: &[u8],
) -> anyhow::Result<u64> {
    let chunks: Vec<Block> = split_blocks(data, DEFAULT_BLOCK_SIZE)
        .into_iter()
        .map(|c| Block::new(Bytes::copy_from_slice(c)))
        .collect();
    let hashes: Vec<String> = chunks.iter().map(|b| b.hash.clone()).collect();
    let by_hash: HashMap<&str, &Block> = chunks.iter().map(|b| (b.hash.as_str(), b)).collect();

    for _ in 0..MAX_WRITE_ATTEMPTS {
        let current = meta.read_file(name).await?;
        match meta
            .modify_file(name, current.version + 1, hashes.clone())
            .await?
        {
            WriteOutcome::Ok { version } => return Ok(version),
            WriteOutcome::MissingBlocks { missing, .. } => {
                for hash in &missing {
                    let block = by_hash
                        .get(hash.as_str())
                        .with_context(|| format!("leader asked for unknown block {}", hash))?;
                    blocks.store_block(block).await?;
                }
            }
            WriteOutcome::OldVersion { .. } => {}
            other => bail!("upload failed: {}", other),
        }
    }
    bail!("upload of {} did not converge", name)
}
