use clap::{Parser, Subcommand};
use std::path::PathBuf;

use relay_config::ConfigLoader;

mod start;

/// Task relay between agent sockets and the coordinating system
#[derive(Parser)]
#[command(name = "relay", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to relay.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Start {
        /// Listen address, overrides config and RELAY_LISTEN
        #[arg(long)]
        listen: Option<String>,
    },
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> relay_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };

        let filter = || {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
        };
        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .json()
                .with_target(true)
                .init();
        } else if config.logging.format == "compact" {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .compact()
                .with_target(false)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .init();
        }

        match self.command {
            Commands::Start { listen } => start::cmd_start(config, listen).await,
            Commands::Config { json } => Self::cmd_config(&config, json),
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_config(config: &relay_config::RelayConfig, json: bool) -> relay_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config)
                    .map_err(|e| relay_core::RelayError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_version() -> relay_core::Result<()> {
        println!("Relay v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }
}
