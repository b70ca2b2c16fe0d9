#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use cfs_core::{FsManager, FsSnapshot, inspect_image};
use cfs_server::{DEFAULT_WORKERS, FileServer};
use cfs_types::{IMAGE_LEN, MAX_BLOCKS, MAX_FILES};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "cfs", about = "ChainFS — a networked miniature file system")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve a disk image over TCP.
    Serve {
        /// Path to the backing image (created and formatted if absent).
        #[arg(long)]
        image: PathBuf,
        /// Port to listen on.
        #[arg(long, default_value_t = 7777)]
        port: u16,
        /// Name the file system announces in its logs.
        #[arg(long, default_value = "chainfs")]
        fs_name: String,
        /// Accepted for compatibility; the on-disk layout is fixed.
        #[arg(long, default_value_t = IMAGE_LEN)]
        size: u64,
        /// Worker threads servicing connections.
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
    },
    /// Print a disk image's metadata tables without serving it.
    Inspect {
        /// Path to the backing image.
        image: PathBuf,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            image,
            port,
            fs_name,
            size,
            workers,
        } => serve(&image, port, &fs_name, size, workers),
        Command::Inspect { image, json } => inspect(&image, json),
    }
}

fn serve(image: &PathBuf, port: u16, fs_name: &str, size: u64, workers: usize) -> Result<()> {
    let fs = FsManager::open(image, fs_name, size)
        .with_context(|| format!("failed to open image: {}", image.display()))?;
    let server = FileServer::bind(("0.0.0.0", port), Arc::new(fs), workers)
        .with_context(|| format!("failed to bind port {port}"))?;
    eprintln!(
        "Serving {} on {} ({} files max, {} blocks)",
        image.display(),
        server.local_addr().context("local addr")?,
        MAX_FILES,
        MAX_BLOCKS
    );
    server.run().context("server terminated")?;
    Ok(())
}

fn inspect(image: &PathBuf, json: bool) -> Result<()> {
    let snapshot = inspect_image(image)
        .with_context(|| format!("failed to inspect image: {}", image.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?
        );
        return Ok(());
    }

    print_snapshot(image, &snapshot);
    Ok(())
}

fn print_snapshot(image: &PathBuf, snapshot: &FsSnapshot) {
    println!("ChainFS image: {}", image.display());
    println!(
        "files: {}/{MAX_FILES}, free blocks: {}/{MAX_BLOCKS}",
        snapshot.file_count(),
        snapshot.free_count()
    );
    for (slot, record) in snapshot.inodes.iter().enumerate() {
        match record {
            Some(record) => {
                let chain = snapshot.chain_of(record);
                println!(
                    "  slot {slot}: '{}' size={} blocks={chain:?}",
                    record.name, record.size
                );
            }
            None => println!("  slot {slot}: (empty)"),
        }
    }
    let chained: Vec<usize> = snapshot
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.block_index >= 0)
        .map(|(k, _)| k)
        .collect();
    println!("allocated blocks: {chained:?}");
}
