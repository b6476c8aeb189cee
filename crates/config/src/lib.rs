//! Follix Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid development setup once `[app]` says so.
//!
//! # Parsing
//!
//! ```
//! use follix_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[app]\nenvironment = \"development\"").unwrap();
//! assert!(config.app.is_development());
//! ```
//!
//! # Example
//!
//! ```toml
//! [app]
//! environment = "production"
//!
//! [log]
//! level = "info"
//! format = "json"
//!
//! [database]
//! path = "/var/lib/follix/follix.db"
//!
//! [auth]
//! jwt_secret = "replace-with-at-least-thirty-two-characters"
//! token_ttl = "24h"
//!
//! [invitations]
//! ttl = "7d"
//! accept_url = "https://app.follix.example/invitations/accept"
//! ```

mod app;
mod auth;
mod database;
mod error;
mod invitations;
mod logging;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use app::{AppConfig, Environment};
pub use auth::{AuthConfig, MIN_JWT_SECRET_LEN};
pub use database::DatabaseConfig;
pub use error::{ConfigError, Result};
pub use invitations::InvitationConfig;
pub use logging::{LogConfig, LogFormat, LogLevel};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment environment
    pub app: AppConfig,

    /// Logging
    pub log: LogConfig,

    /// Storage location
    pub database: DatabaseConfig,

    /// Token signing
    pub auth: AuthConfig,

    /// Clinic invitations
    pub invitations: InvitationConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Section checks run first. Production additionally requires a
    /// signing secret.
    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.invitations.validate()?;

        if !self.app.is_development() && self.auth.jwt_secret.is_none() {
            return Err(ConfigError::missing_field("auth", "jwt_secret"));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SECRET: &str = "this-is-a-very-long-secret-key-for-testing";

    #[test]
    fn test_empty_config_needs_secret_in_production() {
        let err = Config::from_str("").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                section: "auth",
                field: "jwt_secret"
            }
        ));
    }

    #[test]
    fn test_development_defaults() {
        let config = Config::from_str("[app]\nenvironment = \"development\"").unwrap();
        assert!(config.app.is_development());
        assert_eq!(config.log.level, LogLevel::Info);
        assert!(!config.database.in_memory);
        assert_eq!(config.auth.token_ttl, Duration::from_secs(86_400));
        assert_eq!(config.invitations.ttl, Duration::from_secs(604_800));
    }

    #[test]
    fn test_full_config() {
        let toml = format!(
            r#"
[app]
environment = "production"

[log]
level = "debug"
format = "json"

[database]
path = "/tmp/follix-test.db"

[auth]
jwt_secret = "{SECRET}"
token_ttl = "1h"

[invitations]
ttl = "3d"
accept_url = "https://app.follix.test/accept"
"#
        );
        let config = Config::from_str(&toml).unwrap();
        assert_eq!(config.app.environment, Environment::Production);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.database.path.to_str(), Some("/tmp/follix-test.db"));
        assert_eq!(config.auth.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.invitations.ttl, Duration::from_secs(3 * 86_400));
    }

    #[test]
    fn test_short_secret_rejected_everywhere() {
        let toml = "[app]\nenvironment = \"development\"\n[auth]\njwt_secret = \"short\"";
        let err = Config::from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { section: "auth", .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_str("[app").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_file("/nonexistent/follix.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
        assert!(err.to_string().contains("/nonexistent/follix.toml"));
    }
}
