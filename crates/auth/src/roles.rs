//! Roles and access policies
//!
//! Three roles, no hierarchy between clinic roles:
//!
//! | Role | Scope |
//! |------|-------|
//! | `Doctor` | One clinic |
//! | `ClinicAdmin` | One clinic, manages staff and settings |
//! | `SuperAdmin` | Platform-wide, no clinic |
//!
//! Handlers never compare role names directly. They name a [`Policy`], and
//! the policy table below is the only place that maps policies to roles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role assigned to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Clinic staff member
    Doctor,
    /// Clinic administrator
    ClinicAdmin,
    /// Platform operator
    SuperAdmin,
}

impl Role {
    /// Every role, in declaration order
    pub const ALL: [Role; 3] = [Role::Doctor, Role::ClinicAdmin, Role::SuperAdmin];

    /// Parse role from string
    ///
    /// Accepts the snake_case storage form and the PascalCase claim form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "doctor" => Some(Self::Doctor),
            "clinic_admin" | "clinicadmin" => Some(Self::ClinicAdmin),
            "super_admin" | "superadmin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::ClinicAdmin => "clinic_admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Whether accounts with this role must be bound to a clinic
    pub fn is_clinic_scoped(&self) -> bool {
        !matches!(self, Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named access policy
///
/// Closed set. Unknown policy names never map to a policy, so
/// [`Policy::evaluate`] denies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Any signed-in account
    Authenticated,
    /// Clinic staff (doctors and clinic admins) plus platform operators
    ClinicStaff,
    /// Clinic administrators plus platform operators
    ClinicAdministration,
    /// Platform operators only
    SuperAdminOnly,
}

impl Policy {
    /// Every policy, in declaration order
    pub const ALL: [Policy; 4] = [
        Policy::Authenticated,
        Policy::ClinicStaff,
        Policy::ClinicAdministration,
        Policy::SuperAdminOnly,
    ];

    /// Parse policy from its identifier
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authenticated" => Some(Self::Authenticated),
            "clinic_staff" => Some(Self::ClinicStaff),
            "clinic_administration" => Some(Self::ClinicAdministration),
            "super_admin_only" => Some(Self::SuperAdminOnly),
            _ => None,
        }
    }

    /// Policy identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::ClinicStaff => "clinic_staff",
            Self::ClinicAdministration => "clinic_administration",
            Self::SuperAdminOnly => "super_admin_only",
        }
    }

    /// Roles admitted by this policy
    pub fn permitted_roles(&self) -> &'static [Role] {
        match self {
            Self::Authenticated | Self::ClinicStaff => &Role::ALL,
            Self::ClinicAdministration => &[Role::ClinicAdmin, Role::SuperAdmin],
            Self::SuperAdminOnly => &[Role::SuperAdmin],
        }
    }

    /// Check whether any of `roles` is admitted
    pub fn permits(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.permitted_roles().contains(r))
    }

    /// Evaluate a policy by identifier, denying unknown identifiers
    pub fn evaluate(name: &str, roles: &[Role]) -> bool {
        Self::parse(name).is_some_and(|policy| policy.permits(roles))
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
