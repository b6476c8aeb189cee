//! Command implementations for the Follix CLI

pub mod check_config;
pub mod create_clinic;
pub mod init;
pub mod seed_admin;

use anyhow::{Context, Result};
use follix_config::Config;
use follix_control::Store;
use owo_colors::OwoColorize;

/// Open the configured store
///
/// An in-memory store is accepted but nothing written to it survives the
/// command, so the operator is warned.
pub(crate) async fn open_store(config: &Config) -> Result<Store> {
    if config.database.in_memory {
        println!("{}", "database.in_memory is set; changes will not persist".yellow());
        return Store::new_memory().await.context("failed to create in-memory database");
    }

    Store::open(&config.database.path)
        .await
        .with_context(|| format!("failed to open database {}", config.database.path.display()))
}
