// ============================================
// File: crates/securechat-client/src/main.rs
// ============================================
//! # Securechat Client Entry Point
//!
//! ## Creation Reason
//! Main entry point for the interactive client binary.
//! Handles CLI parsing, logging setup, and the console session.
//!
//! ## Usage
//! ```bash
//! # Write a starting configuration
//! securechat-client gen-config --output ./client.toml
//!
//! # Connect using the configuration
//! securechat-client run --config ./client.toml
//!
//! # Connect to another relay with a separate identity file
//! securechat-client run --server relay.example.org:35360 --store ./bob.json
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Logs go to stderr so they do not interleave with chat output
//! - `RUST_LOG` overrides the configured log level
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use securechat_client::{Client, ClientConfig};

const DEFAULT_CONFIG_PATH: &str = "securechat-client.toml";

// ============================================
// CLI Definition
// ============================================

/// Securechat client
///
/// Holds your identity key, logs in to a relay and runs end-to-end
/// encrypted conversations with other clients.
#[derive(Parser, Debug)]
#[command(name = "securechat-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the relay and start the console
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the relay address (host:port)
        #[arg(short, long)]
        server: Option<String>,

        /// Override the local store file
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Print a configuration file with default values
    GenConfig {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            server,
            store,
        } => cmd_run(config, server, store).await,
        Commands::GenConfig { output } => cmd_gen_config(output).await,
        Commands::Validate { config } => cmd_validate(config).await,
    };

    if let Err(e) = result {
        init_logging("error");
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Runs the console session.
async fn cmd_run(
    config_path: PathBuf,
    server: Option<String>,
    store: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = load_or_default_config(&config_path).await?;

    if let Some(addr) = server {
        config.network.server_addr = addr;
    }
    if let Some(path) = store {
        config.storage.store_path = Some(path);
    }
    config.validate().context("invalid command-line override")?;

    init_logging(&config.logging.level);

    info!(
        server = %config.network.server_addr,
        store = ?config.storage.store_path,
        "Effective configuration"
    );

    let client = Client::new(config).context("failed to open local store")?;
    client.run().await?;

    Ok(())
}

/// Writes the default configuration.
async fn cmd_gen_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    let content = ClientConfig::default().to_toml();

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            tokio::fs::write(&path, content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Configuration written to {}", path.display());
        }
        None => print!("{content}"),
    }

    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("Config file not found: {}", config_path.display());
        println!("   Client will use default values.");
        return Ok(());
    }

    let config = ClientConfig::load(&config_path).await?;

    println!("Configuration is valid");
    println!();
    println!("Network:");
    println!("   Relay:              {}", config.network.server_addr);
    println!();
    println!("Messaging:");
    println!("   Rekey After:        {} messages", config.messaging.rekey_min_sequence);
    println!("   Handshake Timeout:  {}s", config.messaging.handshake_timeout_secs);
    println!();
    println!("Identity:");
    println!("   Key Size:           {} bits", config.identity.key_bits);
    println!();
    println!("Storage:");
    match &config.storage.store_path {
        Some(path) => println!("   Store:              {}", path.display()),
        None => println!("   Store:              (in memory)"),
    }
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber on stderr.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads config, falling back to defaults when the file does not exist.
async fn load_or_default_config(path: &Path) -> anyhow::Result<ClientConfig> {
    if path.exists() {
        Ok(ClientConfig::load(path).await?)
    } else {
        eprintln!("Config file {} not found, using defaults", path.display());
        Ok(ClientConfig::default())
    }
}
