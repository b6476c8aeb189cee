//! Validate a configuration file
//!
//! Runs the same checks the server applies at startup and prints the
//! resolved settings.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use follix_config::Config;
use owo_colors::OwoColorize;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Configuration file to check
    pub path: PathBuf,
}

pub fn run(args: CheckConfigArgs) -> Result<()> {
    let config = match Config::from_file(&args.path) {
        Ok(config) => config,
        Err(e) => {
            println!("{} {}", "✗".red(), args.path.display());
            println!("  {}", e.to_string().red());
            bail!("configuration is invalid");
        }
    };

    println!("{} {}", "✓".green(), args.path.display());
    println!("  Environment   {}", config.app.environment.as_str().cyan());
    println!("  Log           {} ({:?})", config.log.level.as_str(), config.log.format);
    if config.database.in_memory {
        println!("  Database      {}", "in-memory".yellow());
    } else {
        println!("  Database      {}", config.database.path.display());
    }
    println!(
        "  JWT secret    {}",
        if config.auth.jwt_secret.is_some() { "set".green().to_string() } else { "not set".yellow().to_string() }
    );
    println!("  Token TTL     {}", humanize(config.auth.token_ttl));
    println!("  Invite TTL    {}", humanize(config.invitations.ttl));
    Ok(())
}

fn humanize(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    match secs {
        s if s >= 86_400 && s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s >= 3_600 && s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s >= 60 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::from_secs(7 * 86_400)), "7d");
        assert_eq!(humanize(Duration::from_secs(3_600)), "1h");
        assert_eq!(humanize(Duration::from_secs(90)), "90s");
    }
}
