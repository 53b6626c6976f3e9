use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_cache::{CacheConfig, FileCache};

#[derive(Parser)]
#[command(name = "portal-cache")]
#[command(about = "Maintenance commands for the portal's file cache", long_about = None)]
struct Cli {
    /// Cache directory (overrides PORTAL_CACHE_DIR)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache usage and statistics
    Stats,

    /// Remove expired entries
    Cleanup,

    /// Remove every entry and tag
    Clear,

    /// Shrink the cache below its size limit
    Evict,

    /// Invalidate every entry filed under the given tags
    Invalidate {
        /// Tags to invalidate (e.g. table_students)
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Print the value stored under a key
    Get {
        key: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "portal_cache=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = CacheConfig::from_env().context("Invalid cache configuration")?;
    if let Some(dir) = cli.dir {
        config.cache_dir = dir;
    }
    let cache = FileCache::new(config)
        .context("Failed to open cache directory")?;

    match cli.command {
        Commands::Stats => {
            let stats = cache.stats();
            println!("Cache: {}", cache.root().display());
            println!("{}", "=".repeat(50));
            println!("{}", stats.summary());
            println!("  Limit:    {} bytes", cache.config().max_size_bytes);
        }

        Commands::Cleanup => {
            let removed = cache.cleanup();
            println!("Removed {} expired entries", removed);
        }

        Commands::Clear => {
            let removed = cache.clear();
            println!("Removed {} entries", removed);
        }

        Commands::Evict => {
            let report = cache.evict_to_limit();
            println!(
                "Scanned {} entries, removed {} ({} -> {} bytes)",
                report.scanned, report.removed, report.bytes_before, report.bytes_after
            );
        }

        Commands::Invalidate { tags } => {
            for tag in tags {
                let removed = cache.invalidate_tag(&tag);
                println!("{}: removed {} entries", tag, removed);
            }
        }

        Commands::Get { key } => {
            match cache.get::<serde_json::Value>(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => {
                    println!("Not cached: {}", key);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
