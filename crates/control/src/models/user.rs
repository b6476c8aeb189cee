//! Account model

use chrono::{DateTime, Utc};
use follix_auth::{AccountStatus, Actor, ClinicId, Role, UserId};
use serde::{Deserialize, Serialize};

/// Stored account
///
/// One role per account. Clinic-scoped roles carry the clinic they were
/// created in; that binding is never changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: UserId,
    /// Login email (stored lowercase, unique)
    pub email: String,
    /// Argon2id hash in PHC format
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Assigned role
    pub role: Role,
    /// Home clinic; `None` for platform operators
    pub clinic_id: Option<ClinicId>,
    /// Administrative state
    pub status: AccountStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account
    pub fn new(
        email: &str,
        password_hash: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: Role,
        clinic_id: Option<ClinicId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email: normalize_email(email),
            password_hash: password_hash.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role,
            clinic_id,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// The actor this account acts as
    pub fn to_actor(&self) -> Actor {
        Actor {
            id: self.id,
            email: self.email.clone(),
            roles: vec![self.role],
            clinic_id: self.clinic_id,
            status: self.status,
        }
    }

    /// Display name
    pub fn full_name(&self) -> String {
        match (self.first_name.as_str(), self.last_name.as_str()) {
            ("", "") => self.email.clone(),
            (first, "") => first.to_string(),
            ("", last) => last.to_string(),
            (first, last) => format!("{} {}", first, last),
        }
    }
}

/// Canonical form used for lookups and the unique index
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account() {
        let clinic = ClinicId::new();
        let account = Account::new("  Doc@Clinic.Test ", "hash", "Ada", "Lovelace", Role::Doctor, Some(clinic));

        assert_eq!(account.email, "doc@clinic.test");
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.full_name(), "Ada Lovelace");

        let actor = account.to_actor();
        assert_eq!(actor.roles, vec![Role::Doctor]);
        assert_eq!(actor.clinic_id, Some(clinic));
    }

    #[test]
    fn test_full_name_fallback() {
        let account = Account::new("root@follix.test", "hash", "", "", Role::SuperAdmin, None);
        assert_eq!(account.full_name(), "root@follix.test");
    }
}
