// ============================================
// File: crates/securechat-server/src/main.rs
// ============================================
//! # Securechat Relay Entry Point
//!
//! ## Creation Reason
//! Main entry point for the relay server binary.
//! Handles CLI parsing, logging setup, and server initialization.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration loading with command-line overrides
//! - Server execution
//!
//! ## Usage
//! ```bash
//! # Write a starting configuration
//! securechat-server gen-config --output /etc/securechat/server.toml
//!
//! # Start the relay
//! securechat-server run --config /etc/securechat/server.toml
//!
//! # Quick start on another port, identities kept in a file
//! securechat-server run --listen 0.0.0.0:4000 --directory ./identities.json
//!
//! # Check a configuration file
//! securechat-server validate --config ./server.toml
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A missing config file is not an error for `run`; defaults apply
//! - `RUST_LOG` overrides the configured log level
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use securechat_server::{Server, ServerConfig};

const DEFAULT_CONFIG_PATH: &str = "/etc/securechat/server.toml";

// ============================================
// CLI Definition
// ============================================

/// Securechat relay server
///
/// Registers identities, authenticates clients by challenge signature and
/// relays end-to-end encrypted payloads between logged-in clients.
#[derive(Parser, Debug)]
#[command(name = "securechat-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the listen address
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Override the identity directory file
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Override the concurrent connection limit
        #[arg(long)]
        max_clients: Option<usize>,
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
            listen,
            directory,
            max_clients,
        } => cmd_run(config, listen, directory, max_clients).await,
        Commands::GenConfig { output } => cmd_gen_config(output).await,
        Commands::Validate { config } => cmd_validate(config).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the server.
async fn cmd_run(
    config_path: PathBuf,
    listen: Option<SocketAddr>,
    directory: Option<PathBuf>,
    max_clients: Option<usize>,
) -> anyhow::Result<()> {
    let mut config = load_or_default_config(&config_path).await?;

    if let Some(addr) = listen {
        config.network.listen_addr = addr;
    }
    if let Some(path) = directory {
        config.storage.directory_path = Some(path);
    }
    if let Some(limit) = max_clients {
        config.network.max_clients = limit;
    }
    config.validate().context("invalid command-line override")?;

    init_logging(&config.logging.level);

    info!(
        listen = %config.listen_addr(),
        signup_timeout_ms = config.auth.signup_timeout_ms,
        directory = ?config.storage.directory_path,
        "Effective configuration"
    );

    let server = Server::new(config).context("failed to open identity directory")?;
    server.run().await?;

    Ok(())
}

/// Writes the default configuration.
async fn cmd_gen_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    init_logging("info");
    let content = ServerConfig::default().to_toml();

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
            info!("Configuration written to {}", path.display());
        }
        None => print!("{content}"),
    }

    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    init_logging("info");
    if !config_path.exists() {
        println!("Config file not found: {}", config_path.display());
        println!("   Server will use default values.");
        return Ok(());
    }

    let config = ServerConfig::load(&config_path).await?;

    println!("Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:          {}", config.listen_addr());
    println!("   Max Clients:     {}", config.network.max_clients);
    println!();
    println!("Auth:");
    println!("   Signup Timeout:  {}ms", config.auth.signup_timeout_ms);
    println!();
    println!("Storage:");
    match &config.storage.directory_path {
        Some(path) => println!("   Directory:       {}", path.display()),
        None => println!("   Directory:       (in memory)"),
    }
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads config, falling back to defaults when the file does not exist.
async fn load_or_default_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if path.exists() {
        Ok(ServerConfig::load(path).await?)
    } else {
        eprintln!("Config file {} not found, using defaults", path.display());
        Ok(ServerConfig::default())
    }
}
