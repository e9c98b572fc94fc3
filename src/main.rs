//! veto CLI - refresh and query the decision cache from the command line

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use veto::{
    CacheBackend, CacheStore, EngineConfig, FileFeed, MemoryBackend, RemediationEngine,
    SqliteBackend,
};

#[derive(Parser)]
#[command(name = "veto", version, about = "Decision cache and remediation resolution core")]
struct Cli {
    /// Path to the configuration file (defaults to ~/.veto/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the SQLite cache (defaults to ~/.cache/veto)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Use a throwaway in-memory cache instead of SQLite
    #[arg(long, global = true)]
    memory: bool,

    /// Enable debug logging
    #[arg(long, global = true, env = "VETO_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull a decision batch from a JSON file and update the cache
    Refresh {
        /// Batch file: {"new": [...], "deleted": [...]}
        #[arg(long)]
        input: PathBuf,
    },
    /// Resolve the remediation that currently applies to an IP
    Check {
        /// IP address to check
        ip: String,
    },
    /// Show per-origin counters of resolved queries
    Origins,
    /// Actively sweep expired cache entries
    Prune,
    /// Drop every cache entry
    Clear,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let config = load_config(&cli)?;
    let cache = Arc::new(CacheStore::new(open_backend(&cli)?));

    match cli.command {
        Commands::Refresh { input } => {
            let engine = RemediationEngine::new(config, FileFeed::new(input), cache)?;
            let summary = engine.refresh_decisions().await?;
            println!("{} new, {} deleted", summary.new, summary.deleted);
        }
        Commands::Check { ip } => {
            let engine = RemediationEngine::new(config, noop_feed(), cache)?;
            let remediation = engine.get_ip_remediation(&ip).await?;
            let display = match remediation.as_str() {
                "bypass" => remediation.as_str().green(),
                "ban" => remediation.as_str().red(),
                _ => remediation.as_str().yellow(),
            };
            println!("{}", display);
        }
        Commands::Origins => {
            let engine = RemediationEngine::new(config, noop_feed(), cache)?;
            let mut counts: Vec<_> = engine.origins_count()?.into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1));
            for (origin, count) in counts {
                println!("{origin}: {count}");
            }
        }
        Commands::Prune => {
            let swept = cache.prune().context("cache backend cannot prune")?;
            println!("{} expired entries removed", swept);
        }
        Commands::Clear => {
            cache.clear()?;
            println!("cache cleared");
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    match &cli.config {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => {
            let default = EngineConfig::default_path()?;
            if default.exists() {
                Ok(EngineConfig::load_from(&default)?)
            } else {
                Ok(EngineConfig::default())
            }
        }
    }
}

fn open_backend(cli: &Cli) -> anyhow::Result<Arc<dyn CacheBackend>> {
    if cli.memory {
        return Ok(Arc::new(MemoryBackend::new()));
    }
    let backend = match &cli.cache_dir {
        Some(dir) => SqliteBackend::open_at(dir)?,
        None => SqliteBackend::open()?,
    };
    Ok(Arc::new(backend))
}

/// Feed for query-only subcommands; pulling from it is a usage error
fn noop_feed() -> FileFeed {
    FileFeed::new("/dev/null")
}
