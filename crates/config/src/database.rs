//! Database configuration

use std::path::PathBuf;

use serde::Deserialize;

/// Database configuration
///
/// ```toml
/// [database]
/// path = "/var/lib/follix/follix.db"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; parent directories are created on open
    pub path: PathBuf,

    /// Ignore `path` and keep everything in memory
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/follix.db"),
            in_memory: false,
        }
    }
}
