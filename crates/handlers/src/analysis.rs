//! Analysis session and job handlers
//!
//! Sessions hang off a patient, jobs off a session and a patient. Job access
//! is checked through the job's own patient, never through its session.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use follix_auth::{JobId, PatientId, ProfileId, RequestContext, SessionId, UserId};
use follix_control::models::{MAX_DOCTOR_NOTES_LEN, MAX_LOCATION_TAG_LEN};
use follix_control::{AnalysisJob, AnalysisSession, JobStatus, SessionStatus};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::outcome::{Failure, HandlerResult, Outcome, caller, clip, ensure, missing_as, transition_as};
use crate::report::{FinalReport, MAX_REPORT_JOBS, build_report};
use crate::state::AppState;

/// Days ahead a session may be scheduled
pub const MAX_SESSION_DAYS_AHEAD: i64 = 30;

/// Most jobs shown in session details
pub const MAX_DETAIL_JOBS: usize = 2000;

/// Longest accepted image storage key
pub const MAX_IMAGE_KEY_LEN: usize = 255;

const MAX_LISTED_ERROR_CHARS: usize = 500;

// =============================================================================
// Request/Response types
// =============================================================================

/// Create session request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSession {
    pub patient_id: PatientId,
    pub session_date: NaiveDate,
}

/// Submit image for analysis
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJob {
    pub session_id: SessionId,
    pub patient_id: PatientId,
    pub calibration_profile_id: ProfileId,
    pub location_tag: String,
    pub image_storage_key: String,
}

/// Doctor notes request
#[derive(Debug, Clone, Deserialize)]
pub struct AddDoctorNotes {
    pub job_id: JobId,
    pub notes: String,
}

/// Session response
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub patient_id: PatientId,
    pub created_by: UserId,
    pub session_date: NaiveDate,
    pub status: SessionStatus,
    pub has_report: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&AnalysisSession> for SessionView {
    fn from(s: &AnalysisSession) -> Self {
        Self {
            id: s.id,
            patient_id: s.patient_id,
            created_by: s.created_by,
            session_date: s.session_date,
            status: s.status,
            has_report: s.final_report.is_some(),
            created_at: s.created_at,
        }
    }
}

/// Job response
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub session_id: SessionId,
    pub location_tag: String,
    pub status: JobStatus,
    pub doctor_notes: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&AnalysisJob> for JobView {
    fn from(j: &AnalysisJob) -> Self {
        Self {
            id: j.id,
            session_id: j.session_id,
            location_tag: j.location_tag.clone(),
            status: j.status,
            doctor_notes: j.doctor_notes.clone(),
            error_message: j.error_message.as_deref().map(|m| clip(m, MAX_LISTED_ERROR_CHARS)),
            created_at: j.created_at,
            started_at: j.started_at,
            completed_at: j.completed_at,
        }
    }
}

/// Session with its jobs
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetails {
    pub session: SessionView,
    pub final_report: Option<serde_json::Value>,
    pub jobs: Vec<JobView>,
}

/// Job accepted for processing
#[derive(Debug, Clone, Serialize)]
pub struct JobSubmitted {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Job status response
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<&AnalysisJob> for JobStatusView {
    fn from(j: &AnalysisJob) -> Self {
        Self {
            job_id: j.id,
            status: j.status,
            created_at: j.created_at,
            started_at: j.started_at,
            completed_at: j.completed_at,
            error_message: j.error_message.clone(),
        }
    }
}

/// Job result response
#[derive(Debug, Clone, Serialize)]
pub struct JobResultView {
    pub job_id: JobId,
    pub result: serde_json::Value,
    pub annotated_image_key: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub doctor_notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Rules
// =============================================================================

/// Session date must lie within `[today - 1 year, today + 30 days]`
pub fn check_session_date(date: NaiveDate, today: NaiveDate) -> Result<(), Failure> {
    if date > today + Duration::days(MAX_SESSION_DAYS_AHEAD) {
        return Err(Failure::invalid(
            "Session date cannot be more than 30 days in the future.",
            "Invalid session date",
        ));
    }
    let earliest = today.checked_sub_months(Months::new(12)).unwrap_or(NaiveDate::MIN);
    if date < earliest {
        return Err(Failure::invalid(
            "Session date cannot be more than 1 year in the past.",
            "Invalid session date",
        ));
    }
    Ok(())
}

fn check_image_key(key: &str) -> Result<(), Failure> {
    let malformed = key.trim().is_empty()
        || key.len() > MAX_IMAGE_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key.chars().any(char::is_control);
    if malformed {
        return Err(Failure::invalid(
            "Invalid image storage key format.",
            "Image storage key validation failed",
        ));
    }
    Ok(())
}

fn check_location_tag(tag: &str) -> Result<(), Failure> {
    let len = tag.trim().chars().count();
    if len == 0 || len > MAX_LOCATION_TAG_LEN {
        return Err(Failure::invalid(
            "Invalid location tag. Must be between 1 and 100 characters.",
            "Location tag validation failed",
        ));
    }
    Ok(())
}

// =============================================================================
// Sessions
// =============================================================================

/// Open an analysis session for a patient
pub async fn create_session(state: &AppState, ctx: &RequestContext, req: CreateSession) -> Outcome<SessionView> {
    state.settle(try_create_session(state, ctx, req).await)
}

async fn try_create_session(state: &AppState, ctx: &RequestContext, req: CreateSession) -> HandlerResult<SessionView> {
    ensure(
        state.authz.can_access_patient(ctx, &req.patient_id).await,
        ctx,
        req.patient_id,
        "Access denied. You cannot create analysis sessions for this patient.",
        "Unauthorized patient access",
    )?;

    check_session_date(req.session_date, Utc::now().date_naive())?;

    let session = AnalysisSession::new(req.patient_id, state.acting_user(ctx).await?, req.session_date);
    state.store.analysis().create_session(&session).await?;

    info!(session_id = %session.id, patient_id = %session.patient_id, "Analysis session created");
    Ok(Outcome::success("Analysis session created successfully", SessionView::from(&session)))
}

/// Sessions of a patient
pub async fn list_sessions(state: &AppState, ctx: &RequestContext, patient_id: PatientId) -> Outcome<Vec<SessionView>> {
    state.settle(try_list_sessions(state, ctx, patient_id).await)
}

async fn try_list_sessions(
    state: &AppState,
    ctx: &RequestContext,
    patient_id: PatientId,
) -> HandlerResult<Vec<SessionView>> {
    ensure(
        state.authz.can_access_patient(ctx, &patient_id).await,
        ctx,
        patient_id,
        "Access denied. You cannot access analysis sessions for this patient.",
        "Unauthorized patient access",
    )?;

    let sessions = state.store.analysis().list_sessions_for_patient(patient_id).await?;
    Ok(Outcome::success(
        format!("Retrieved {} analysis sessions", sessions.len()),
        sessions.iter().map(SessionView::from).collect(),
    ))
}

/// Session with all its jobs
pub async fn session_details(state: &AppState, ctx: &RequestContext, session_id: SessionId) -> Outcome<SessionDetails> {
    state.settle(try_session_details(state, ctx, session_id).await)
}

async fn try_session_details(
    state: &AppState,
    ctx: &RequestContext,
    session_id: SessionId,
) -> HandlerResult<SessionDetails> {
    ensure(
        state.authz.can_access_analysis_session(ctx, &session_id).await,
        ctx,
        session_id,
        "Access denied. You cannot access this analysis session.",
        "Unauthorized access to analysis session data",
    )?;

    let repo = state.store.analysis();
    let session = repo
        .get_session(session_id)
        .await?
        .ok_or_else(|| Failure::not_found("Analysis session not found"))?;

    let jobs = repo.list_jobs_for_session(session_id).await?;
    if jobs.len() > MAX_DETAIL_JOBS {
        return Err(Failure::invalid(
            "Session has too many analysis jobs. Please contact administrator.",
            "Analysis job count exceeds safe display limit",
        ));
    }

    Ok(Outcome::success(
        "Analysis session details retrieved successfully",
        SessionDetails {
            session: SessionView::from(&session),
            final_report: session.final_report,
            jobs: jobs.iter().map(JobView::from).collect(),
        },
    ))
}

// =============================================================================
// Jobs
// =============================================================================

/// Create a job for an uploaded image and queue it
pub async fn submit_job(state: &AppState, ctx: &RequestContext, req: SubmitJob) -> Outcome<JobSubmitted> {
    state.settle(try_submit_job(state, ctx, req).await)
}

async fn try_submit_job(state: &AppState, ctx: &RequestContext, req: SubmitJob) -> HandlerResult<JobSubmitted> {
    ensure(
        state.authz.can_access_patient(ctx, &req.patient_id).await,
        ctx,
        req.patient_id,
        "Access denied. You cannot upload images for this patient.",
        "Unauthorized access to patient data",
    )?;

    let session = state.store.analysis().get_session(req.session_id).await?;
    if session.is_none_or(|s| s.patient_id != req.patient_id) {
        return Err(Failure::invalid(
            "Invalid session or patient mismatch.",
            "Session-patient validation failed",
        ));
    }

    ensure(
        state.authz.can_access_calibration_profile(ctx, &req.calibration_profile_id).await,
        ctx,
        req.calibration_profile_id,
        "Access denied. Invalid calibration profile.",
        "Unauthorized calibration profile access",
    )?;

    let patient_clinic = state.store.patients().clinic_of(req.patient_id).await?;
    let profile = state.store.calibration().get_by_id(req.calibration_profile_id).await?;
    let usable = profile.is_some_and(|p| p.is_active() && Some(p.clinic_id) == patient_clinic);
    if !usable {
        return Err(Failure::invalid(
            "Calibration profile is not active for this patient's clinic.",
            "Calibration profile validation failed",
        ));
    }

    check_image_key(&req.image_storage_key)?;
    check_location_tag(&req.location_tag)?;

    let job = AnalysisJob::new(
        req.session_id,
        req.patient_id,
        req.calibration_profile_id,
        state.acting_user(ctx).await?,
        req.location_tag.trim(),
        req.image_storage_key,
    );
    state.store.analysis().create_job(&job).await?;
    info!(job_id = %job.id, session_id = %job.session_id, user_id = %caller(ctx), "Analysis job created");

    if let Err(e) = state.collaborators.queue.enqueue(job.id).await {
        error!(job_id = %job.id, error = %e, "Failed to queue analysis job");
        return Err(Failure::unavailable(
            "Analysis job created but failed to queue for processing. Please contact administrator.",
            "Queue publishing failed",
            e,
        ));
    }

    Ok(Outcome::success(
        "Analysis job created and queued successfully",
        JobSubmitted {
            job_id: job.id,
            status: job.status,
        },
    ))
}

/// Lifecycle state of a job
pub async fn job_status(state: &AppState, ctx: &RequestContext, job_id: JobId) -> Outcome<JobStatusView> {
    state.settle(try_job_status(state, ctx, job_id).await)
}

async fn try_job_status(state: &AppState, ctx: &RequestContext, job_id: JobId) -> HandlerResult<JobStatusView> {
    ensure(
        state.authz.can_access_analysis_job(ctx, &job_id).await,
        ctx,
        job_id,
        "Access denied. You cannot access this analysis job status.",
        "Unauthorized access to analysis job",
    )?;

    let job = state
        .store
        .analysis()
        .get_job(job_id)
        .await?
        .ok_or_else(|| Failure::not_found("Analysis job not found"))?;

    Ok(Outcome::success("Job status retrieved successfully", JobStatusView::from(&job)))
}

/// Result of a completed job
pub async fn job_result(state: &AppState, ctx: &RequestContext, job_id: JobId) -> Outcome<JobResultView> {
    state.settle(try_job_result(state, ctx, job_id).await)
}

async fn try_job_result(state: &AppState, ctx: &RequestContext, job_id: JobId) -> HandlerResult<JobResultView> {
    ensure(
        state.authz.can_access_analysis_job(ctx, &job_id).await,
        ctx,
        job_id,
        "Access denied. You cannot access this analysis job result.",
        "Unauthorized access to analysis job",
    )?;

    let job = state
        .store
        .analysis()
        .get_job(job_id)
        .await?
        .ok_or_else(|| Failure::not_found("Analysis job not found"))?;

    if job.status != JobStatus::Completed {
        return Err(Failure::rule("Analysis job is not completed yet"));
    }

    Ok(Outcome::success(
        "Analysis result retrieved successfully",
        JobResultView {
            job_id: job.id,
            result: job.result.unwrap_or(serde_json::Value::Null),
            annotated_image_key: job.annotated_image_key,
            processing_time_ms: job.processing_time_ms,
            doctor_notes: job.doctor_notes,
            completed_at: job.completed_at,
        },
    ))
}

/// Attach a doctor's notes to a job
pub async fn add_doctor_notes(state: &AppState, ctx: &RequestContext, req: AddDoctorNotes) -> Outcome<()> {
    state.settle(try_add_doctor_notes(state, ctx, req).await)
}

async fn try_add_doctor_notes(state: &AppState, ctx: &RequestContext, req: AddDoctorNotes) -> HandlerResult<()> {
    ensure(
        state.authz.can_access_analysis_job(ctx, &req.job_id).await,
        ctx,
        req.job_id,
        "Access denied. You cannot modify this analysis job.",
        "Unauthorized access to analysis job",
    )?;

    if req.notes.chars().count() > MAX_DOCTOR_NOTES_LEN {
        return Err(Failure::invalid(
            "Doctor notes exceed maximum length of 2000 characters",
            "Notes too long",
        ));
    }

    state
        .store
        .analysis()
        .set_doctor_notes(req.job_id, &req.notes)
        .await
        .map_err(missing_as("Analysis job not found"))?;

    Ok(Outcome::done("Doctor notes added successfully"))
}

// =============================================================================
// Reports
// =============================================================================

/// Aggregate completed jobs into the session's final report and complete it
pub async fn generate_report(state: &AppState, ctx: &RequestContext, session_id: SessionId) -> Outcome<FinalReport> {
    state.settle(try_generate_report(state, ctx, session_id).await)
}

async fn try_generate_report(
    state: &AppState,
    ctx: &RequestContext,
    session_id: SessionId,
) -> HandlerResult<FinalReport> {
    ensure(
        state.authz.can_access_analysis_session(ctx, &session_id).await,
        ctx,
        session_id,
        "Access denied. You cannot generate reports for this session.",
        "Unauthorized access to analysis session",
    )?;

    let repo = state.store.analysis();
    let mut session = repo
        .get_session(session_id)
        .await?
        .ok_or_else(|| Failure::not_found("Analysis session not found"))?;

    let jobs = repo.completed_jobs_for_session(session_id, MAX_REPORT_JOBS + 1).await?;
    if jobs.is_empty() {
        return Err(Failure::rule("No completed analysis jobs found for this session"));
    }
    if jobs.len() > MAX_REPORT_JOBS {
        return Err(Failure::invalid(
            "Too many analysis jobs. Please contact administrator.",
            "Analysis job count exceeds processing limit",
        ));
    }

    let report = build_report(&session, &jobs, Utc::now());
    let value = serde_json::to_value(&report).map_err(|e| Failure::internal("Report serialization failed", e))?;

    session
        .complete_with_report(value)
        .map_err(transition_as("Analysis session cannot be completed in its current status.", "Analysis session not found"))?;
    repo.save_session_outcome(&session)
        .await
        .map_err(missing_as("Analysis session not found"))?;

    info!(session_id = %session_id, jobs = jobs.len(), "Final report generated");
    Ok(Outcome::success("Final report generated successfully", report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_session_date_window_is_inclusive() {
        let today = date(2026, 6, 15);

        assert!(check_session_date(today, today).is_ok());
        assert!(check_session_date(date(2026, 7, 15), today).is_ok());
        assert!(check_session_date(date(2025, 6, 15), today).is_ok());

        let ahead = check_session_date(date(2026, 7, 16), today).unwrap_err();
        assert_eq!(ahead.to_string(), "Session date cannot be more than 30 days in the future.");

        let behind = check_session_date(date(2025, 6, 14), today).unwrap_err();
        assert_eq!(behind.to_string(), "Session date cannot be more than 1 year in the past.");
    }

    #[test]
    fn test_image_key_rules() {
        assert!(check_image_key("clinics/c1/p1/img.jpg").is_ok());
        assert!(check_image_key("").is_err());
        assert!(check_image_key("/etc/passwd").is_err());
        assert!(check_image_key("a/../b.jpg").is_err());
        assert!(check_image_key(&"k".repeat(256)).is_err());
    }

    #[test]
    fn test_location_tag_rules() {
        assert!(check_location_tag("crown").is_ok());
        assert!(check_location_tag("   ").is_err());
        assert!(check_location_tag(&"t".repeat(101)).is_err());
    }
}
