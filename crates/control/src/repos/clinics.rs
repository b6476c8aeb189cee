//! Clinic repository

use chrono::Utc;
use follix_auth::ClinicId;
use tracing::info;
use turso::Database;

use super::{id, text, timestamp};
use crate::error::{ControlError, Result};
use crate::models::Clinic;

const CLINIC_COLUMNS: &str = "id, name, created_at, updated_at";

/// Repository for clinics
pub struct ClinicRepo<'a> {
    db: &'a Database,
}

impl<'a> ClinicRepo<'a> {
    /// Create a new clinic repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a clinic
    pub async fn create(&self, clinic: &Clinic) -> Result<()> {
        let conn = self.db.connect()?;
        let id = clinic.id.to_string();

        conn.execute(
            "INSERT INTO clinics (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            [
                id.as_str(),
                clinic.name.as_str(),
                clinic.created_at.to_rfc3339().as_str(),
                clinic.updated_at.to_rfc3339().as_str(),
            ],
        )
        .await?;

        info!(clinic_id = %clinic.id, name = %clinic.name, "Created clinic");
        Ok(())
    }

    /// Get a clinic by ID
    pub async fn get_by_id(&self, id: ClinicId) -> Result<Option<Clinic>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM clinics WHERE id = ?1", CLINIC_COLUMNS);
        let mut rows = conn.query(&sql, [id.to_string().as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_clinic(&row)?)),
            None => Ok(None),
        }
    }

    /// Whether a clinic exists
    pub async fn exists(&self, id: ClinicId) -> Result<bool> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query("SELECT 1 FROM clinics WHERE id = ?1", [id.to_string().as_str()])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// List every clinic, by name
    pub async fn list_all(&self) -> Result<Vec<Clinic>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM clinics ORDER BY name", CLINIC_COLUMNS);
        let mut rows = conn.query(&sql, ()).await?;

        let mut clinics = Vec::new();
        while let Some(row) = rows.next().await? {
            clinics.push(row_to_clinic(&row)?);
        }
        Ok(clinics)
    }

    /// IDs of every clinic
    pub async fn list_ids(&self) -> Result<Vec<ClinicId>> {
        let conn = self.db.connect()?;
        let mut rows = conn.query("SELECT id FROM clinics", ()).await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(id(&row, 0, "clinic.id", ClinicId::parse)?);
        }
        Ok(ids)
    }

    /// Rename a clinic
    pub async fn update_name(&self, id: ClinicId, name: &str) -> Result<()> {
        let conn = self.db.connect()?;
        let id_str = id.to_string();
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                "UPDATE clinics SET name = ?1, updated_at = ?2 WHERE id = ?3",
                [name, now.as_str(), id_str.as_str()],
            )
            .await?;

        if changed == 0 {
            return Err(ControlError::not_found("clinic", id_str));
        }

        info!(clinic_id = %id, "Renamed clinic");
        Ok(())
    }
}

fn row_to_clinic(row: &turso::Row) -> Result<Clinic> {
    Ok(Clinic {
        id: id(row, 0, "clinic.id", ClinicId::parse)?,
        name: text(row, 1, "clinic.name")?,
        created_at: timestamp(row, 2, "clinic.created_at")?,
        updated_at: timestamp(row, 3, "clinic.updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn test_clinic_crud() {
        let store = Store::new_memory().await.unwrap();
        let repo = store.clinics();

        let clinic = Clinic::new("North Clinic");
        repo.create(&clinic).await.unwrap();

        let fetched = repo.get_by_id(clinic.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "North Clinic");
        assert!(repo.exists(clinic.id).await.unwrap());
        assert!(!repo.exists(ClinicId::new()).await.unwrap());

        repo.update_name(clinic.id, "South Clinic").await.unwrap();
        let renamed = repo.get_by_id(clinic.id).await.unwrap().unwrap();
        assert_eq!(renamed.name, "South Clinic");

        assert_eq!(repo.list_ids().await.unwrap(), vec![clinic.id]);
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rename_missing_clinic() {
        let store = Store::new_memory().await.unwrap();
        let err = store.clinics().update_name(ClinicId::new(), "X").await.unwrap_err();
        assert!(matches!(err, ControlError::NotFound { entity: "clinic", .. }));
    }
}
