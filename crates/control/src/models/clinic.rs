//! Clinic model
//!
//! A clinic is the tenant boundary. Patients, calibration profiles and staff
//! accounts each belong to exactly one clinic.

use chrono::{DateTime, Utc};
use follix_auth::ClinicId;
use serde::{Deserialize, Serialize};

/// Longest accepted clinic name
pub const MAX_CLINIC_NAME_LEN: usize = 255;

/// Clinic entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    /// Unique identifier
    pub id: ClinicId,
    /// Display name
    pub name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Clinic {
    /// Create a new clinic
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ClinicId::new(),
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
