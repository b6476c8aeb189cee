//! Analysis session and job repository
//!
//! Job status writes are guarded on the status the caller read, so two
//! workers racing on one job cannot both advance it.

use chrono::NaiveDate;
use follix_auth::{JobId, PatientId, ProfileId, SessionId, UserId};
use tracing::{debug, info};
use turso::Database;

use super::{DATE_FORMAT, id, opt_int, opt_json, opt_text, opt_timestamp, text, timestamp, ts_param};
use crate::error::{ControlError, Result};
use crate::models::{AnalysisJob, AnalysisSession, JobStatus, SessionStatus};

const SESSION_COLUMNS: &str =
    "id, patient_id, created_by, session_date, status, final_report, created_at, updated_at";

const JOB_COLUMNS: &str = r#"id, session_id, patient_id, calibration_profile_id, created_by,
    location_tag, image_storage_key, annotated_image_key, status, result, doctor_notes,
    error_message, processing_time_ms, created_at, started_at, completed_at"#;

/// Repository for analysis sessions and jobs
pub struct AnalysisRepo<'a> {
    db: &'a Database,
}

impl<'a> AnalysisRepo<'a> {
    /// Create a new analysis repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Insert a session
    pub async fn create_session(&self, session: &AnalysisSession) -> Result<()> {
        let conn = self.db.connect()?;
        let report = session
            .final_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?
            .unwrap_or_default();

        conn.execute(
            r#"
            INSERT INTO analysis_sessions (
                id, patient_id, created_by, session_date, status,
                final_report, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULLIF(?6, ''), ?7, ?8)
            "#,
            [
                session.id.to_string().as_str(),
                session.patient_id.to_string().as_str(),
                session.created_by.to_string().as_str(),
                session.session_date.format(DATE_FORMAT).to_string().as_str(),
                session.status.as_str(),
                report.as_str(),
                session.created_at.to_rfc3339().as_str(),
                session.updated_at.to_rfc3339().as_str(),
            ],
        )
        .await?;

        info!(session_id = %session.id, patient_id = %session.patient_id, "Created analysis session");
        Ok(())
    }

    /// Get a session by ID
    pub async fn get_session(&self, id: SessionId) -> Result<Option<AnalysisSession>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM analysis_sessions WHERE id = ?1", SESSION_COLUMNS);
        let mut rows = conn.query(&sql, [id.to_string().as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    /// Patient a session belongs to
    pub async fn patient_of_session(&self, id: SessionId) -> Result<Option<PatientId>> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT patient_id FROM analysis_sessions WHERE id = ?1",
                [id.to_string().as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(super::id(&row, 0, "session.patient_id", PatientId::parse)?)),
            None => Ok(None),
        }
    }

    /// List a patient's sessions, most recent first
    pub async fn list_sessions_for_patient(&self, patient_id: PatientId) -> Result<Vec<AnalysisSession>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM analysis_sessions WHERE patient_id = ?1 ORDER BY session_date DESC, created_at DESC",
            SESSION_COLUMNS
        );
        let mut rows = conn.query(&sql, [patient_id.to_string().as_str()]).await?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(row_to_session(&row)?);
        }
        Ok(sessions)
    }

    /// Persist a session's status and report
    pub async fn save_session_outcome(&self, session: &AnalysisSession) -> Result<()> {
        let conn = self.db.connect()?;
        let id = session.id.to_string();
        let report = session
            .final_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?
            .unwrap_or_default();

        let changed = conn
            .execute(
                "UPDATE analysis_sessions SET status = ?1, final_report = NULLIF(?2, ''), updated_at = ?3 WHERE id = ?4",
                [
                    session.status.as_str(),
                    report.as_str(),
                    session.updated_at.to_rfc3339().as_str(),
                    id.as_str(),
                ],
            )
            .await?;

        if changed == 0 {
            return Err(ControlError::not_found("analysis session", id));
        }

        debug!(session_id = %session.id, status = %session.status, "Saved session outcome");
        Ok(())
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Insert a job
    pub async fn create_job(&self, job: &AnalysisJob) -> Result<()> {
        let conn = self.db.connect()?;
        let result = job.result.as_ref().map(serde_json::to_string).transpose()?.unwrap_or_default();
        let processing = job.processing_time_ms.map(|ms| ms.to_string()).unwrap_or_default();

        conn.execute(
            r#"
            INSERT INTO analysis_jobs (
                id, session_id, patient_id, calibration_profile_id, created_by,
                location_tag, image_storage_key, annotated_image_key, status, result,
                doctor_notes, error_message, processing_time_ms, created_at,
                started_at, completed_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, NULLIF(?8, ''), ?9, NULLIF(?10, ''),
                NULLIF(?11, ''), NULLIF(?12, ''), NULLIF(?13, ''), ?14,
                NULLIF(?15, ''), NULLIF(?16, '')
            )
            "#,
            [
                job.id.to_string().as_str(),
                job.session_id.to_string().as_str(),
                job.patient_id.to_string().as_str(),
                job.calibration_profile_id.to_string().as_str(),
                job.created_by.to_string().as_str(),
                job.location_tag.as_str(),
                job.image_storage_key.as_str(),
                job.annotated_image_key.as_deref().unwrap_or(""),
                job.status.as_str(),
                result.as_str(),
                job.doctor_notes.as_deref().unwrap_or(""),
                job.error_message.as_deref().unwrap_or(""),
                processing.as_str(),
                job.created_at.to_rfc3339().as_str(),
                ts_param(job.started_at).as_str(),
                ts_param(job.completed_at).as_str(),
            ],
        )
        .await?;

        info!(job_id = %job.id, session_id = %job.session_id, "Created analysis job");
        Ok(())
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<AnalysisJob>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM analysis_jobs WHERE id = ?1", JOB_COLUMNS);
        let mut rows = conn.query(&sql, [id.to_string().as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    /// Patient a job belongs to
    pub async fn patient_of_job(&self, id: JobId) -> Result<Option<PatientId>> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT patient_id FROM analysis_jobs WHERE id = ?1",
                [id.to_string().as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(super::id(&row, 0, "job.patient_id", PatientId::parse)?)),
            None => Ok(None),
        }
    }

    /// List a session's jobs in upload order
    pub async fn list_jobs_for_session(&self, session_id: SessionId) -> Result<Vec<AnalysisJob>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM analysis_jobs WHERE session_id = ?1 ORDER BY created_at",
            JOB_COLUMNS
        );
        let mut rows = conn.query(&sql, [session_id.to_string().as_str()]).await?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    /// Completed jobs of a session, capped at `limit`
    pub async fn completed_jobs_for_session(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<AnalysisJob>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM analysis_jobs WHERE session_id = ?1 AND status = ?2 ORDER BY completed_at LIMIT {}",
            JOB_COLUMNS, limit
        );
        let mut rows = conn
            .query(
                &sql,
                [session_id.to_string().as_str(), JobStatus::Completed.as_str()],
            )
            .await?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    /// Persist a job's lifecycle fields
    ///
    /// Only succeeds if the stored status still equals `expected`; otherwise
    /// the job moved underneath the caller and `InvalidTransition` is returned.
    pub async fn save_job_progress(&self, job: &AnalysisJob, expected: JobStatus) -> Result<()> {
        let conn = self.db.connect()?;
        let id = job.id.to_string();
        let result = job.result.as_ref().map(serde_json::to_string).transpose()?.unwrap_or_default();
        let processing = job.processing_time_ms.map(|ms| ms.to_string()).unwrap_or_default();

        let changed = conn
            .execute(
                r#"
                UPDATE analysis_jobs SET
                    status = ?1,
                    result = NULLIF(?2, ''),
                    annotated_image_key = NULLIF(?3, ''),
                    error_message = NULLIF(?4, ''),
                    processing_time_ms = NULLIF(?5, ''),
                    started_at = NULLIF(?6, ''),
                    completed_at = NULLIF(?7, '')
                WHERE id = ?8 AND status = ?9
                "#,
                [
                    job.status.as_str(),
                    result.as_str(),
                    job.annotated_image_key.as_deref().unwrap_or(""),
                    job.error_message.as_deref().unwrap_or(""),
                    processing.as_str(),
                    ts_param(job.started_at).as_str(),
                    ts_param(job.completed_at).as_str(),
                    id.as_str(),
                    expected.as_str(),
                ],
            )
            .await?;

        if changed == 0 {
            return match self.get_job(job.id).await? {
                Some(current) => Err(ControlError::transition(
                    "analysis job",
                    current.status.as_str(),
                    job.status.as_str(),
                )),
                None => Err(ControlError::not_found("analysis job", id)),
            };
        }

        debug!(job_id = %job.id, status = %job.status, "Saved job progress");
        Ok(())
    }

    /// Replace a job's doctor notes
    pub async fn set_doctor_notes(&self, id: JobId, notes: &str) -> Result<()> {
        let conn = self.db.connect()?;
        let id_str = id.to_string();

        let changed = conn
            .execute(
                "UPDATE analysis_jobs SET doctor_notes = NULLIF(?1, '') WHERE id = ?2",
                [notes, id_str.as_str()],
            )
            .await?;

        if changed == 0 {
            return Err(ControlError::not_found("analysis job", id_str));
        }
        Ok(())
    }
}

fn row_to_session(row: &turso::Row) -> Result<AnalysisSession> {
    let date_raw = text(row, 3, "session.session_date")?;
    let session_date = NaiveDate::parse_from_str(&date_raw, DATE_FORMAT)
        .map_err(|e| ControlError::invalid("session.session_date", e.to_string()))?;
    let status_raw = text(row, 4, "session.status")?;
    let status = SessionStatus::parse(&status_raw)
        .ok_or_else(|| ControlError::invalid("session.status", status_raw))?;

    Ok(AnalysisSession {
        id: id(row, 0, "session.id", SessionId::parse)?,
        patient_id: id(row, 1, "session.patient_id", PatientId::parse)?,
        created_by: id(row, 2, "session.created_by", UserId::parse)?,
        session_date,
        status,
        final_report: opt_json(row, 5)?,
        created_at: timestamp(row, 6, "session.created_at")?,
        updated_at: timestamp(row, 7, "session.updated_at")?,
    })
}

fn row_to_job(row: &turso::Row) -> Result<AnalysisJob> {
    let status_raw = text(row, 8, "job.status")?;
    let status = JobStatus::parse(&status_raw).ok_or_else(|| ControlError::invalid("job.status", status_raw))?;

    Ok(AnalysisJob {
        id: id(row, 0, "job.id", JobId::parse)?,
        session_id: id(row, 1, "job.session_id", SessionId::parse)?,
        patient_id: id(row, 2, "job.patient_id", PatientId::parse)?,
        calibration_profile_id: id(row, 3, "job.calibration_profile_id", ProfileId::parse)?,
        created_by: id(row, 4, "job.created_by", UserId::parse)?,
        location_tag: text(row, 5, "job.location_tag")?,
        image_storage_key: text(row, 6, "job.image_storage_key")?,
        annotated_image_key: opt_text(row, 7)?,
        status,
        result: opt_json(row, 9)?,
        doctor_notes: opt_text(row, 10)?,
        error_message: opt_text(row, 11)?,
        processing_time_ms: opt_int(row, 12)?,
        created_at: timestamp(row, 13, "job.created_at")?,
        started_at: opt_timestamp(row, 14, "job.started_at")?,
        completed_at: opt_timestamp(row, 15, "job.completed_at")?,
    })
}
