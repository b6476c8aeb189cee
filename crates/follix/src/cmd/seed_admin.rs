//! Seed the first SuperAdmin
//!
//! Platform operators cannot be invited, so the first one is created here.
//!
//! # Usage
//!
//! ```bash
//! follix seed-admin root@follix.example --first-name Ada --last-name Admin
//! FOLLIX_ADMIN_PASSWORD=... follix seed-admin root@follix.example
//! ```

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use follix_auth::{Role, password};
use follix_config::Config;
use follix_control::Account;
use owo_colors::OwoColorize;
use tracing::info;

#[derive(Args, Debug)]
pub struct SeedAdminArgs {
    /// Login email of the new operator
    pub email: String,

    /// Given name
    #[arg(long, default_value = "Platform")]
    pub first_name: String,

    /// Family name
    #[arg(long, default_value = "Admin")]
    pub last_name: String,

    /// Password (a temporary one is generated if not provided)
    #[arg(long, env = "FOLLIX_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

pub async fn run(args: SeedAdminArgs, config: &Config) -> Result<()> {
    let email = args.email.trim();
    if !looks_like_email(email) {
        bail!("'{}' is not a valid email address", email);
    }

    let generated = args.password.is_none();
    let secret = args.password.unwrap_or_else(password::generate_temporary_password);
    if let Err(problems) = password::check_policy(&secret) {
        bail!("password rejected: {}", problems.join("; "));
    }

    let store = super::open_store(config).await?;
    let users = store.users();
    if users.get_by_email(email).await?.is_some() {
        bail!("an account for {} already exists", email);
    }

    let hash = password::hash_password(&secret).map_err(|e| anyhow!("failed to hash password: {}", e))?;
    let account = Account::new(email, hash, args.first_name, args.last_name, Role::SuperAdmin, None);
    users.create(&account).await.context("failed to create account")?;
    info!(user_id = %account.id, "super admin seeded");

    println!("{} {}", "✓".green(), "SuperAdmin created".bold());
    println!("  Email      {}", account.email.cyan());
    println!("  User ID    {}", account.id.to_string().dimmed());
    if generated {
        println!("  Password   {}", secret.yellow());
        println!();
        println!("{}", "Store this password now. It is not shown again.".yellow());
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
