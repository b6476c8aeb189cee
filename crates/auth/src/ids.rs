//! Typed identifiers
//!
//! Every entity that takes part in an ownership chain gets its own id type so
//! a patient id can never be handed to a predicate that expects a clinic id.
//!
//! Ids are UUIDs on the wire and in storage (hyphenated, lowercase).
//!
//! ```
//! use follix_auth::ClinicId;
//!
//! let id = ClinicId::new();
//! let parsed = ClinicId::parse(&id.to_string()).unwrap();
//! assert_eq!(id, parsed);
//! assert!(ClinicId::parse("not-a-uuid").is_none());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Parse from the hyphenated string form
            pub fn parse(s: &str) -> Option<Self> {
                Uuid::parse_str(s.trim()).ok().map(Self)
            }

            /// Underlying UUID
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Tenant boundary
    ClinicId
);
entity_id!(
    /// Account identifier
    UserId
);
entity_id!(
    /// Patient, owned by one clinic
    PatientId
);
entity_id!(
    /// Analysis session, owned by one patient
    SessionId
);
entity_id!(
    /// Analysis job, owned by one session and one patient
    JobId
);
entity_id!(
    /// Calibration profile, owned by one clinic
    ProfileId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parse() {
        let id = PatientId::new();
        assert_eq!(PatientId::parse(&id.to_string()), Some(id));
        assert_eq!(id.to_string().len(), 36);
    }

    #[test]
    fn test_parse_trims_and_rejects() {
        let id = SessionId::new();
        assert_eq!(SessionId::parse(&format!("  {}  ", id)), Some(id));
        assert_eq!(SessionId::parse(""), None);
        assert_eq!(SessionId::parse("1234"), None);
    }

    #[test]
    fn test_fresh_ids_differ() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = ClinicId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
        assert_eq!(id.to_string(), uuid.to_string());
    }
}
