//! Token signing configuration

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Shortest accepted signing secret
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Token signing configuration
///
/// ```toml
/// [auth]
/// jwt_secret = "a-secret-of-at-least-thirty-two-characters"
/// token_ttl = "12h"
/// issuer = "follix"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret, at least 32 characters
    pub jwt_secret: Option<String>,

    /// Lifetime of issued tokens
    /// Default: 24 hours
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// `iss` claim written to and required from tokens
    pub issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl: Duration::from_secs(24 * 60 * 60),
            issuer: "follix".to_string(),
        }
    }
}

impl AuthConfig {
    /// Secret bytes, if configured
    pub fn jwt_secret_bytes(&self) -> Option<&[u8]> {
        self.jwt_secret.as_ref().map(|s| s.as_bytes())
    }

    /// Check the fields that are set
    ///
    /// A missing secret is only an error where the environment demands one;
    /// see [`crate::Config::validate`].
    pub fn validate(&self) -> Result<()> {
        if let Some(secret) = &self.jwt_secret
            && secret.len() < MIN_JWT_SECRET_LEN
        {
            return Err(ConfigError::invalid_value(
                "auth",
                "jwt_secret",
                format!("must be at least {} characters", MIN_JWT_SECRET_LEN),
            ));
        }
        if self.token_ttl.is_zero() {
            return Err(ConfigError::invalid_value("auth", "token_ttl", "must be positive"));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::invalid_value("auth", "issuer", "must not be empty"));
        }
        Ok(())
    }
}
