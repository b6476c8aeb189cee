//! Follix - operations CLI
//!
//! # Usage
//!
//! ```bash
//! # Create the database schema
//! follix --config configs/follix.toml init
//!
//! # Create the first platform operator
//! follix seed-admin root@follix.example --first-name Ada --last-name Admin
//!
//! # Create a clinic
//! follix create-clinic "North Hair Center"
//!
//! # Validate a configuration file
//! follix check-config configs/follix.toml
//! ```

mod cmd;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use follix_config::{Config, LogFormat};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Follix - clinic hair analysis backend operations
#[derive(Parser, Debug)]
#[command(name = "follix")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true, env = "FOLLIX_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and its schema
    Init(cmd::init::InitArgs),

    /// Create the initial SuperAdmin account
    SeedAdmin(cmd::seed_admin::SeedAdminArgs),

    /// Create a clinic
    CreateClinic(cmd::create_clinic::CreateClinicArgs),

    /// Validate a configuration file
    CheckConfig(cmd::check_config::CheckConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Reports on stdout, no logging needed
    if let Command::CheckConfig(args) = cli.command {
        return cmd::check_config::run(args);
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&resolve_log_level(cli.log_level.as_deref(), &config), config.log.format)?;

    match cli.command {
        Command::Init(args) => cmd::init::run(args, &config).await,
        Command::SeedAdmin(args) => cmd::seed_admin::run(args, &config).await,
        Command::CreateClinic(args) => cmd::create_clinic::run(args, &config).await,
        Command::CheckConfig(args) => cmd::check_config::run(args),
    }
}

/// Load and validate the config file, or use defaults when none is given
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path).with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Resolve log level: CLI flag > config file > default "info"
fn resolve_log_level(cli_level: Option<&str>, config: &Config) -> String {
    match cli_level {
        Some(level) => level.to_string(),
        None => config.log.level.as_str().to_string(),
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Console => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
    }

    Ok(())
}
