//! Driftnet main entry point
//!
//! Command-line interface for the driftnet crawl engine.

use clap::Parser;
use driftnet::config::{load_config_with_hash, Config};
use driftnet::crawler::crawl;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Driftnet: a concurrent web-crawling engine
#[derive(Parser, Debug)]
#[command(name = "driftnet")]
#[command(version)]
#[command(about = "A concurrent web-crawling engine", long_about = None)]
struct Cli {
    /// Seed URLs to start crawling from
    #[arg(value_name = "URL", required = true)]
    seeds: Vec<String>,

    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)?;
            tracing::info!(
                "configuration loaded from {} (hash: {})",
                path.display(),
                hash
            );
            config
        }
        None => Config::default(),
    };

    let seeds: Vec<&str> = cli.seeds.iter().map(String::as_str).collect();
    let store = crawl(&seeds, config).await?;

    // The sharded backend intentionally refuses enumeration; only the
    // in-memory backend can report a count.
    match store.len() {
        Ok(count) => println!("Crawl finished: {} pages stored", count),
        Err(_) => println!("Crawl finished"),
    }

    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("driftnet=info,warn"),
            1 => EnvFilter::new("driftnet=debug,info"),
            2 => EnvFilter::new("driftnet=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
