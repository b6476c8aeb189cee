//! Invitation configuration

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Invitation configuration
///
/// ```toml
/// [invitations]
/// ttl = "7d"
/// accept_url = "https://app.follix.example/invitations/accept"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    /// Time until an invitation lapses
    /// Default: 7 days
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Base of the link mailed to invitees; the token is appended as `?token=`
    pub accept_url: String,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            accept_url: "http://localhost:3000/invitations/accept".to_string(),
        }
    }
}

impl InvitationConfig {
    /// Link for a given token
    pub fn accept_link(&self, token: &str) -> String {
        format!("{}?token={}", self.accept_url.trim_end_matches('/'), token)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid_value("invitations", "ttl", "must be positive"));
        }
        if !(self.accept_url.starts_with("http://") || self.accept_url.starts_with("https://")) {
            return Err(ConfigError::invalid_value(
                "invitations",
                "accept_url",
                "must be an http(s) URL",
            ));
        }
        Ok(())
    }
}
