//! nssync CLI
//!
//! Mirrors one Nightscout server into another.
//!
//! # Commands
//!
//! - `sync` - Copy recent records, then revisit cached overrides
//! - `reconcile` - Only revisit cached overrides
//! - `overrides` - List the cached active overrides
//!
//! Servers are configured through `SOURCE_NIGHTSCOUT_URL`,
//! `SOURCE_NIGHTSCOUT_API_SECRET`, `DESTINATION_NIGHTSCOUT_URL` and
//! `DESTINATION_NIGHTSCOUT_API_SECRET`.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Nightscout to Nightscout sync.
#[derive(Parser)]
#[command(name = "nssync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the override cache file
    #[arg(global = true, short, long)]
    cache_path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy records from the source to the destination
    Sync {
        /// Endpoint to sync; repeat for several (default: all)
        #[arg(short, long = "endpoint")]
        endpoints: Vec<String>,

        /// Days before now to start from
        #[arg(long)]
        days_back: Option<u64>,

        /// Days after now to stop at
        #[arg(long)]
        days_forward: Option<u64>,

        /// Skip the override reconcile pass
        #[arg(long)]
        skip_overrides: bool,
    },

    /// Revisit cached overrides and post the ones that have finished
    Reconcile,

    /// List cached active overrides
    Overrides {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync {
            endpoints,
            days_back,
            days_forward,
            skip_overrides,
        } => {
            let config = load_config_or_exit(cli.cache_path);
            commands::sync::run(config, &endpoints, days_back, days_forward, skip_overrides)?;
        }
        Commands::Reconcile => {
            let config = load_config_or_exit(cli.cache_path);
            commands::reconcile::run(config)?;
        }
        Commands::Overrides { format } => {
            let path = cli.cache_path.unwrap_or_else(nssync_engine::default_cache_path);
            commands::overrides::run(&path, &format)?;
        }
        Commands::Version => {
            println!("nssync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Loads configuration, exiting with status 1 before any network activity
/// if it is incomplete.
fn load_config_or_exit(cache_path: Option<PathBuf>) -> nssync_engine::SyncConfig {
    match commands::load_config(cache_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
