//! The authenticated caller
//!
//! `Actor` is what the identity provider resolves a request to: who is acting,
//! with which roles, bound to which clinic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{ClinicId, UserId};
use crate::roles::{Policy, Role};

/// Administrative account state
///
/// Disabling an account is a state of its own, separate from any temporary
/// sign-in lockout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account may sign in and act
    #[default]
    Active,
    /// Account was disabled by a platform operator
    Disabled,
}

impl AccountStatus {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticated principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Account id
    pub id: UserId,
    /// Email address
    pub email: String,
    /// Assigned roles
    pub roles: Vec<Role>,
    /// Home clinic; `None` for platform operators
    pub clinic_id: Option<ClinicId>,
    /// Account state
    pub status: AccountStatus,
}

impl Actor {
    /// Create an active actor with a single role
    pub fn new(id: UserId, email: impl Into<String>, role: Role, clinic_id: Option<ClinicId>) -> Self {
        Self {
            id,
            email: email.into(),
            roles: vec![role],
            clinic_id,
            status: AccountStatus::Active,
        }
    }

    /// Check for a role
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Check a policy against this actor's roles
    pub fn satisfies(&self, policy: Policy) -> bool {
        policy.permits(&self.roles)
    }

    /// Whether the account may act at all
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}
