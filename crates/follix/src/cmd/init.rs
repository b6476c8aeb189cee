//! Database init command
//!
//! Creates the database file and applies the schema. Safe to run again.
//!
//! # Usage
//!
//! ```bash
//! follix --config configs/follix.toml init
//! ```

use anyhow::Result;
use clap::Args;
use follix_config::Config;
use owo_colors::OwoColorize;
use tracing::info;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Show what would be created without touching the disk
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: InitArgs, config: &Config) -> Result<()> {
    println!();
    println!("{}", "Follix Init".bold());
    println!("{}", "─".repeat(50));
    println!("Environment   {}", config.app.environment.as_str().cyan());
    if config.database.in_memory {
        println!("Database      {}", "in-memory".yellow());
    } else {
        println!("Database      {}", config.database.path.display().to_string().dimmed());
    }
    println!("{}", "─".repeat(50));
    println!();

    if args.dry_run {
        println!("{}", "Dry run, nothing created.".dimmed());
        return Ok(());
    }

    print!("Applying schema... ");
    let _store = super::open_store(config).await?;
    println!("{}", "✓".green());
    info!(path = %config.database.path.display(), "database initialized");

    println!();
    println!(
        "Next: {} to create the first platform operator.",
        "follix seed-admin <email>".cyan()
    );
    Ok(())
}
