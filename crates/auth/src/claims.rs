//! JWT token claims
//!
//! Defines the structure of bearer tokens issued at login.

use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::error::{AuthError, Result};
use crate::ids::{ClinicId, UserId};
use crate::roles::Role;

/// JWT claims carried by a Follix bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (account id)
    #[serde(rename = "sub")]
    pub subject: String,

    /// Account email
    #[serde(default)]
    pub email: String,

    /// Role names
    #[serde(default)]
    pub roles: Vec<String>,

    /// Home clinic
    #[serde(rename = "clinicId", default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,

    // Standard JWT claims
    /// Expiration time (Unix timestamp)
    #[serde(rename = "exp")]
    pub expires_at: i64,

    /// Issued at (Unix timestamp)
    #[serde(rename = "iat")]
    pub issued_at: i64,

    /// Not before (Unix timestamp)
    #[serde(rename = "nbf", skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,

    /// Issuer
    #[serde(rename = "iss", skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// JWT ID
    #[serde(rename = "jti", skip_serializing_if = "Option::is_none")]
    pub jwt_id: Option<String>,
}

impl TokenClaims {
    /// Check if the token has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < chrono::Utc::now().timestamp()
    }

    /// Build the actor these claims describe
    ///
    /// Role names that do not parse grant nothing and are dropped. A
    /// malformed subject or clinic id rejects the whole token.
    pub fn to_actor(&self) -> Result<Actor> {
        let id = UserId::parse(&self.subject)
            .ok_or_else(|| AuthError::InvalidClaims(format!("bad subject '{}'", self.subject)))?;

        let clinic_id = match self.clinic_id.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                ClinicId::parse(raw)
                    .ok_or_else(|| AuthError::InvalidClaims(format!("bad clinicId '{}'", raw)))?,
            ),
        };

        let mut roles: Vec<Role> = self.roles.iter().filter_map(|r| Role::parse(r)).collect();
        roles.sort();
        roles.dedup();

        Ok(Actor {
            id,
            email: self.email.clone(),
            roles,
            clinic_id,
            status: Default::default(),
        })
    }
}
