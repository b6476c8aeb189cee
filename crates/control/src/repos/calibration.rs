//! Calibration profile repository
//!
//! Creating a profile, or renaming one onto an existing name, retires every
//! active profile with that name in the clinic and takes the next version
//! number. Both run in one transaction so concurrent writers cannot hand out
//! the same version twice.

use chrono::Utc;
use follix_auth::{ClinicId, ProfileId};
use tracing::{debug, info};
use turso::{Connection, Database};

use super::{id, int, opt_json, text, timestamp};
use crate::db::{begin, finish};
use crate::error::{ControlError, Result};
use crate::models::{CalibrationProfile, ProfileState};

const PROFILE_COLUMNS: &str = "id, clinic_id, name, data, version, state, created_at, updated_at";

/// Repository for calibration profiles
pub struct CalibrationRepo<'a> {
    db: &'a Database,
}

impl<'a> CalibrationRepo<'a> {
    /// Create a new calibration repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a profile as the newest active version of its name
    ///
    /// Returns the assigned version.
    pub async fn create(&self, profile: &CalibrationProfile) -> Result<i64> {
        let conn = self.db.connect()?;
        begin(&conn).await?;
        let outcome = insert_versioned(&conn, profile).await;
        let version = finish(&conn, outcome).await?;

        info!(
            profile_id = %profile.id,
            clinic_id = %profile.clinic_id,
            name = %profile.name,
            version,
            "Created calibration profile"
        );
        Ok(version)
    }

    /// Get a profile by ID
    pub async fn get_by_id(&self, id: ProfileId) -> Result<Option<CalibrationProfile>> {
        let conn = self.db.connect()?;
        fetch(&conn, id).await
    }

    /// Owning clinic of a profile
    pub async fn clinic_of(&self, id: ProfileId) -> Result<Option<ClinicId>> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT clinic_id FROM calibration_profiles WHERE id = ?1",
                [id.to_string().as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(super::id(&row, 0, "profile.clinic_id", ClinicId::parse)?)),
            None => Ok(None),
        }
    }

    /// Active profiles of a clinic
    pub async fn list_active_for_clinic(&self, clinic_id: ClinicId) -> Result<Vec<CalibrationProfile>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM calibration_profiles WHERE clinic_id = ?1 AND state = ?2 ORDER BY name",
            PROFILE_COLUMNS
        );
        let mut rows = conn
            .query(
                &sql,
                [clinic_id.to_string().as_str(), ProfileState::Active.as_str()],
            )
            .await?;

        let mut profiles = Vec::new();
        while let Some(row) = rows.next().await? {
            profiles.push(row_to_profile(&row)?);
        }
        Ok(profiles)
    }

    /// Every version of a name in a clinic, oldest first
    pub async fn list_versions(&self, clinic_id: ClinicId, name: &str) -> Result<Vec<CalibrationProfile>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM calibration_profiles WHERE clinic_id = ?1 AND name = ?2 ORDER BY version",
            PROFILE_COLUMNS
        );
        let mut rows = conn.query(&sql, [clinic_id.to_string().as_str(), name]).await?;

        let mut profiles = Vec::new();
        while let Some(row) = rows.next().await? {
            profiles.push(row_to_profile(&row)?);
        }
        Ok(profiles)
    }

    /// Change a profile's name and data
    ///
    /// A changed name retires the active profiles already holding it and
    /// re-versions this profile after them. Returns the updated profile.
    pub async fn update(
        &self,
        id: ProfileId,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<CalibrationProfile> {
        let conn = self.db.connect()?;
        begin(&conn).await?;
        let outcome = update_versioned(&conn, id, name.trim(), data).await;
        let updated = finish(&conn, outcome).await?;

        info!(profile_id = %id, name = %updated.name, version = updated.version, "Updated calibration profile");
        Ok(updated)
    }

    /// Retire a profile
    ///
    /// Fails with `InvalidTransition` if it is already retired.
    pub async fn retire(&self, id: ProfileId) -> Result<()> {
        let conn = self.db.connect()?;
        let id_str = id.to_string();
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                "UPDATE calibration_profiles SET state = ?1, updated_at = ?2 WHERE id = ?3 AND state = ?4",
                [
                    ProfileState::Retired.as_str(),
                    now.as_str(),
                    id_str.as_str(),
                    ProfileState::Active.as_str(),
                ],
            )
            .await?;

        if changed == 0 {
            return match fetch(&conn, id).await? {
                Some(_) => Err(ControlError::transition("calibration profile", "retired", "retired")),
                None => Err(ControlError::not_found("calibration profile", id_str)),
            };
        }

        debug!(profile_id = %id, "Retired calibration profile");
        Ok(())
    }
}

// =============================================================================
// Transaction bodies
// =============================================================================

async fn insert_versioned(conn: &Connection, profile: &CalibrationProfile) -> Result<i64> {
    let clinic_id = profile.clinic_id.to_string();
    let version = next_version(conn, &clinic_id, &profile.name, None).await?;
    retire_active_named(conn, &clinic_id, &profile.name, None).await?;

    let data = serde_json::to_string(&profile.data)?;
    conn.execute(
        r#"
        INSERT INTO calibration_profiles (
            id, clinic_id, name, data, version, state, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        [
            profile.id.to_string().as_str(),
            clinic_id.as_str(),
            profile.name.as_str(),
            data.as_str(),
            version.to_string().as_str(),
            ProfileState::Active.as_str(),
            profile.created_at.to_rfc3339().as_str(),
            profile.updated_at.to_rfc3339().as_str(),
        ],
    )
    .await?;

    Ok(version)
}

async fn update_versioned(
    conn: &Connection,
    id: ProfileId,
    name: &str,
    data: &serde_json::Value,
) -> Result<CalibrationProfile> {
    let mut profile = fetch(conn, id)
        .await?
        .ok_or_else(|| ControlError::not_found("calibration profile", id.to_string()))?;

    if profile.name != name {
        let clinic_id = profile.clinic_id.to_string();
        profile.version = next_version(conn, &clinic_id, name, Some(id)).await?;
        retire_active_named(conn, &clinic_id, name, Some(id)).await?;
        profile.name = name.to_string();
    }
    profile.data = data.clone();
    profile.updated_at = Utc::now();

    let data = serde_json::to_string(&profile.data)?;
    conn.execute(
        "UPDATE calibration_profiles SET name = ?1, data = ?2, version = ?3, updated_at = ?4 WHERE id = ?5",
        [
            profile.name.as_str(),
            data.as_str(),
            profile.version.to_string().as_str(),
            profile.updated_at.to_rfc3339().as_str(),
            id.to_string().as_str(),
        ],
    )
    .await?;

    Ok(profile)
}

/// One past the highest version of `name` in the clinic, 1 for a fresh name
async fn next_version(
    conn: &Connection,
    clinic_id: &str,
    name: &str,
    excluding: Option<ProfileId>,
) -> Result<i64> {
    let excluding = excluding.map(|p| p.to_string()).unwrap_or_default();
    let mut rows = conn
        .query(
            "SELECT MAX(version) FROM calibration_profiles WHERE clinic_id = ?1 AND name = ?2 AND id != ?3",
            [clinic_id, name, excluding.as_str()],
        )
        .await?;

    let current = match rows.next().await? {
        Some(row) => super::opt_int(&row, 0)?.unwrap_or(0),
        None => 0,
    };
    Ok(current + 1)
}

async fn retire_active_named(
    conn: &Connection,
    clinic_id: &str,
    name: &str,
    excluding: Option<ProfileId>,
) -> Result<u64> {
    let excluding = excluding.map(|p| p.to_string()).unwrap_or_default();
    let now = Utc::now().to_rfc3339();
    let retired = conn
        .execute(
            r#"
            UPDATE calibration_profiles SET state = ?1, updated_at = ?2
            WHERE clinic_id = ?3 AND name = ?4 AND state = ?5 AND id != ?6
            "#,
            [
                ProfileState::Retired.as_str(),
                now.as_str(),
                clinic_id,
                name,
                ProfileState::Active.as_str(),
                excluding.as_str(),
            ],
        )
        .await?;

    if retired > 0 {
        debug!(clinic_id, name, retired, "Retired superseded calibration profiles");
    }
    Ok(retired)
}

async fn fetch(conn: &Connection, id: ProfileId) -> Result<Option<CalibrationProfile>> {
    let sql = format!("SELECT {} FROM calibration_profiles WHERE id = ?1", PROFILE_COLUMNS);
    let mut rows = conn.query(&sql, [id.to_string().as_str()]).await?;

    match rows.next().await? {
        Some(row) => Ok(Some(row_to_profile(&row)?)),
        None => Ok(None),
    }
}

fn row_to_profile(row: &turso::Row) -> Result<CalibrationProfile> {
    let state_raw = text(row, 5, "profile.state")?;
    let state = ProfileState::parse(&state_raw)
        .ok_or_else(|| ControlError::invalid("profile.state", state_raw))?;

    Ok(CalibrationProfile {
        id: id(row, 0, "profile.id", ProfileId::parse)?,
        clinic_id: id(row, 1, "profile.clinic_id", ClinicId::parse)?,
        name: text(row, 2, "profile.name")?,
        data: opt_json(row, 3)?.unwrap_or_else(|| serde_json::json!({})),
        version: int(row, 4, "profile.version")?,
        state,
        created_at: timestamp(row, 6, "profile.created_at")?,
        updated_at: timestamp(row, 7, "profile.updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::models::Clinic;
    use serde_json::json;

    async fn setup() -> (Store, ClinicId) {
        let store = Store::new_memory().await.unwrap();
        let clinic = Clinic::new("North Clinic");
        store.clinics().create(&clinic).await.unwrap();
        (store, clinic.id)
    }

    #[tokio::test]
    async fn test_same_name_creates_next_version() {
        let (store, clinic) = setup().await;
        let repo = store.calibration();

        let first = CalibrationProfile::new(clinic, "A", json!({"px_per_mm": 40}));
        assert_eq!(repo.create(&first).await.unwrap(), 1);

        let second = CalibrationProfile::new(clinic, "A", json!({"px_per_mm": 42}));
        assert_eq!(repo.create(&second).await.unwrap(), 2);

        let old = repo.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(old.state, ProfileState::Retired);
        let new = repo.get_by_id(second.id).await.unwrap().unwrap();
        assert_eq!(new.state, ProfileState::Active);
        assert_eq!(new.version, 2);
        assert_eq!(new.data["px_per_mm"], 42);

        let active = repo.list_active_for_clinic(clinic).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }

    #[tokio::test]
    async fn test_versions_are_per_clinic() {
        let (store, clinic) = setup().await;
        let other = Clinic::new("South Clinic");
        store.clinics().create(&other).await.unwrap();
        let repo = store.calibration();

        repo.create(&CalibrationProfile::new(clinic, "A", json!({}))).await.unwrap();
        let v = repo
            .create(&CalibrationProfile::new(other.id, "A", json!({})))
            .await
            .unwrap();
        assert_eq!(v, 1);
        assert_eq!(repo.list_active_for_clinic(clinic).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_version_counts_retired_profiles() {
        let (store, clinic) = setup().await;
        let repo = store.calibration();

        let first = CalibrationProfile::new(clinic, "A", json!({}));
        repo.create(&first).await.unwrap();
        repo.retire(first.id).await.unwrap();

        let v = repo.create(&CalibrationProfile::new(clinic, "A", json!({}))).await.unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test]
    async fn test_rename_reversions() {
        let (store, clinic) = setup().await;
        let repo = store.calibration();

        let a = CalibrationProfile::new(clinic, "A", json!({}));
        repo.create(&a).await.unwrap();
        let b = CalibrationProfile::new(clinic, "B", json!({}));
        repo.create(&b).await.unwrap();

        let renamed = repo.update(b.id, "A", &json!({"px_per_mm": 50})).await.unwrap();
        assert_eq!(renamed.name, "A");
        assert_eq!(renamed.version, 2);
        assert!(renamed.is_active());

        let old_a = repo.get_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(old_a.state, ProfileState::Retired);
        assert_eq!(repo.list_versions(clinic, "A").await.unwrap().len(), 2);

        // Same name only refreshes data
        let same = repo.update(b.id, "A", &json!({"px_per_mm": 51})).await.unwrap();
        assert_eq!(same.version, 2);
    }

    #[tokio::test]
    async fn test_retire_twice() {
        let (store, clinic) = setup().await;
        let repo = store.calibration();

        let profile = CalibrationProfile::new(clinic, "A", json!({}));
        repo.create(&profile).await.unwrap();
        assert_eq!(repo.clinic_of(profile.id).await.unwrap(), Some(clinic));

        repo.retire(profile.id).await.unwrap();
        let err = repo.retire(profile.id).await.unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));

        let err = repo.retire(ProfileId::new()).await.unwrap_err();
        assert!(matches!(err, ControlError::NotFound { .. }));
    }
}
