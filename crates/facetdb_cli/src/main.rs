//! facetdb CLI
//!
//! Runs the facetdb HTTP server and inspects data directories.
//!
//! # Commands
//!
//! - `serve` - Serve the HTTP API
//! - `inspect` - Display document counts and facets per entity
//! - `check` - Validate a configuration file

mod commands;
mod config;
mod error;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// facetdb schema-aware document server.
#[derive(Parser)]
#[command(name = "facetdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(global = true, short, long, default_value = "facetdb.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on (overrides the file)
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Data directory (overrides the file)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Display document counts and facets per entity
    Inspect {
        /// Data directory (overrides the file)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate a configuration file
    Check,

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Serve { bind, data_dir } => commands::serve::run(&cli.config, bind, data_dir),
        Commands::Inspect { data_dir, format } => {
            commands::inspect::run(&cli.config, data_dir, &format)
        }
        Commands::Check => commands::check::run(&cli.config),
        Commands::Version => {
            println!("facetdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("facetdb core v{}", facetdb_core::VERSION);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
