//! Patient repository

use chrono::Utc;
use follix_auth::{ClinicId, PatientId};
use tracing::info;
use turso::Database;

use super::{date_param, id, opt_date, opt_text, text, timestamp};
use crate::error::{ControlError, Result, unique_or};
use crate::models::Patient;

const PATIENT_COLUMNS: &str = "id, clinic_id, clinic_patient_id, first_name, last_name, date_of_birth, created_at, updated_at";

/// Repository for patients
pub struct PatientRepo<'a> {
    db: &'a Database,
}

impl<'a> PatientRepo<'a> {
    /// Create a new patient repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a patient
    ///
    /// A duplicate `(clinic_id, clinic_patient_id)` fails with `AlreadyExists`.
    pub async fn create(&self, patient: &Patient) -> Result<()> {
        let conn = self.db.connect()?;
        let id = patient.id.to_string();
        let clinic_id = patient.clinic_id.to_string();
        let clinic_patient_id = patient.clinic_patient_id.clone().unwrap_or_default();

        conn.execute(
            r#"
            INSERT INTO patients (
                id, clinic_id, clinic_patient_id, first_name, last_name,
                date_of_birth, created_at, updated_at
            ) VALUES (?1, ?2, NULLIF(?3, ''), ?4, ?5, NULLIF(?6, ''), ?7, ?8)
            "#,
            [
                id.as_str(),
                clinic_id.as_str(),
                clinic_patient_id.as_str(),
                patient.first_name.as_str(),
                patient.last_name.as_str(),
                date_param(patient.date_of_birth).as_str(),
                patient.created_at.to_rfc3339().as_str(),
                patient.updated_at.to_rfc3339().as_str(),
            ],
        )
        .await
        .map_err(unique_or("patient", clinic_patient_id.as_str()))?;

        info!(patient_id = %patient.id, clinic_id = %patient.clinic_id, "Created patient");
        Ok(())
    }

    /// Get a patient by ID
    pub async fn get_by_id(&self, id: PatientId) -> Result<Option<Patient>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM patients WHERE id = ?1", PATIENT_COLUMNS);
        let mut rows = conn.query(&sql, [id.to_string().as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_patient(&row)?)),
            None => Ok(None),
        }
    }

    /// Owning clinic of a patient
    pub async fn clinic_of(&self, id: PatientId) -> Result<Option<ClinicId>> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query("SELECT clinic_id FROM patients WHERE id = ?1", [id.to_string().as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(super::id(&row, 0, "patient.clinic_id", ClinicId::parse)?)),
            None => Ok(None),
        }
    }

    /// List a clinic's patients by family name
    pub async fn list_for_clinic(&self, clinic_id: ClinicId) -> Result<Vec<Patient>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM patients WHERE clinic_id = ?1 ORDER BY last_name, first_name",
            PATIENT_COLUMNS
        );
        let mut rows = conn.query(&sql, [clinic_id.to_string().as_str()]).await?;

        let mut patients = Vec::new();
        while let Some(row) = rows.next().await? {
            patients.push(row_to_patient(&row)?);
        }
        Ok(patients)
    }

    /// Whether another patient in the clinic already holds this reference
    pub async fn clinic_patient_id_taken(
        &self,
        clinic_id: ClinicId,
        clinic_patient_id: &str,
        excluding: Option<PatientId>,
    ) -> Result<bool> {
        let conn = self.db.connect()?;
        let excluding = excluding.map(|p| p.to_string()).unwrap_or_default();
        let mut rows = conn
            .query(
                "SELECT 1 FROM patients WHERE clinic_id = ?1 AND clinic_patient_id = ?2 AND id != ?3",
                [
                    clinic_id.to_string().as_str(),
                    clinic_patient_id,
                    excluding.as_str(),
                ],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Write back the editable fields of a patient
    pub async fn update(&self, patient: &Patient) -> Result<()> {
        let conn = self.db.connect()?;
        let id = patient.id.to_string();
        let clinic_patient_id = patient.clinic_patient_id.clone().unwrap_or_default();
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                r#"
                UPDATE patients SET
                    clinic_patient_id = NULLIF(?1, ''),
                    first_name = ?2,
                    last_name = ?3,
                    date_of_birth = NULLIF(?4, ''),
                    updated_at = ?5
                WHERE id = ?6
                "#,
                [
                    clinic_patient_id.as_str(),
                    patient.first_name.as_str(),
                    patient.last_name.as_str(),
                    date_param(patient.date_of_birth).as_str(),
                    now.as_str(),
                    id.as_str(),
                ],
            )
            .await
            .map_err(unique_or("patient", clinic_patient_id.as_str()))?;

        if changed == 0 {
            return Err(ControlError::not_found("patient", id));
        }
        Ok(())
    }
}

fn row_to_patient(row: &turso::Row) -> Result<Patient> {
    Ok(Patient {
        id: id(row, 0, "patient.id", PatientId::parse)?,
        clinic_id: id(row, 1, "patient.clinic_id", ClinicId::parse)?,
        clinic_patient_id: opt_text(row, 2)?,
        first_name: text(row, 3, "patient.first_name")?,
        last_name: text(row, 4, "patient.last_name")?,
        date_of_birth: opt_date(row, 5, "patient.date_of_birth")?,
        created_at: timestamp(row, 6, "patient.created_at")?,
        updated_at: timestamp(row, 7, "patient.updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::models::Clinic;
    use chrono::NaiveDate;

    async fn setup() -> (Store, ClinicId) {
        let store = Store::new_memory().await.unwrap();
        let clinic = Clinic::new("North Clinic");
        store.clinics().create(&clinic).await.unwrap();
        (store, clinic.id)
    }

    #[tokio::test]
    async fn test_patient_roundtrip() {
        let (store, clinic) = setup().await;
        let dob = NaiveDate::from_ymd_opt(1980, 5, 17);
        let patient = Patient::new(clinic, Some("P-001"), "Ada", "Lovelace", dob);
        store.patients().create(&patient).await.unwrap();

        let fetched = store.patients().get_by_id(patient.id).await.unwrap().unwrap();
        assert_eq!(fetched.clinic_patient_id.as_deref(), Some("P-001"));
        assert_eq!(fetched.date_of_birth, dob);
        assert_eq!(store.patients().clinic_of(patient.id).await.unwrap(), Some(clinic));
        assert_eq!(store.patients().clinic_of(PatientId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_clinic_patient_id() {
        let (store, clinic) = setup().await;
        let repo = store.patients();

        repo.create(&Patient::new(clinic, Some("P-001"), "A", "A", None)).await.unwrap();
        let err = repo
            .create(&Patient::new(clinic, Some("P-001"), "B", "B", None))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(repo.list_for_clinic(clinic).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_clinic_patient_ids_do_not_collide() {
        let (store, clinic) = setup().await;
        let repo = store.patients();

        repo.create(&Patient::new(clinic, None, "A", "A", None)).await.unwrap();
        repo.create(&Patient::new(clinic, Some(" "), "B", "B", None)).await.unwrap();
        assert_eq!(repo.list_for_clinic(clinic).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_taken_check() {
        let (store, clinic) = setup().await;
        let repo = store.patients();

        let mut patient = Patient::new(clinic, Some("P-001"), "A", "A", None);
        repo.create(&patient).await.unwrap();

        assert!(repo.clinic_patient_id_taken(clinic, "P-001", None).await.unwrap());
        assert!(!repo.clinic_patient_id_taken(clinic, "P-001", Some(patient.id)).await.unwrap());

        patient.first_name = "Grace".into();
        patient.clinic_patient_id = None;
        repo.update(&patient).await.unwrap();

        let fetched = repo.get_by_id(patient.id).await.unwrap().unwrap();
        assert_eq!(fetched.first_name, "Grace");
        assert_eq!(fetched.clinic_patient_id, None);
    }
}
