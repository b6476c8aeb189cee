//! Patient model

use chrono::{DateTime, NaiveDate, Utc};
use follix_auth::{ClinicId, PatientId};
use serde::{Deserialize, Serialize};

/// Longest accepted clinic-assigned patient id
pub const MAX_CLINIC_PATIENT_ID_LEN: usize = 50;

/// Longest accepted first/last name
pub const MAX_PATIENT_NAME_LEN: usize = 100;

/// Patient entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    /// Unique identifier
    pub id: PatientId,
    /// Owning clinic
    pub clinic_id: ClinicId,
    /// Clinic's own reference number, unique within the clinic when set
    pub clinic_patient_id: Option<String>,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Create a new patient
    ///
    /// Names are trimmed; an empty clinic patient id is stored as none.
    pub fn new(
        clinic_id: ClinicId,
        clinic_patient_id: Option<&str>,
        first_name: &str,
        last_name: &str,
        date_of_birth: Option<NaiveDate>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PatientId::new(),
            clinic_id,
            clinic_patient_id: normalize_clinic_patient_id(clinic_patient_id),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            date_of_birth,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trim a clinic patient id and drop it when empty
pub fn normalize_clinic_patient_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_patient_trims() {
        let patient = Patient::new(ClinicId::new(), Some("  P-001 "), "  Ada ", " Lovelace ", None);
        assert_eq!(patient.clinic_patient_id.as_deref(), Some("P-001"));
        assert_eq!(patient.first_name, "Ada");
        assert_eq!(patient.last_name, "Lovelace");
    }

    #[test]
    fn test_blank_clinic_patient_id() {
        assert_eq!(normalize_clinic_patient_id(Some("   ")), None);
        assert_eq!(normalize_clinic_patient_id(None), None);
    }
}
