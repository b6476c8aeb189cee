//! Job lifecycle for the analysis worker
//!
//! The worker is trusted and acts outside any user context. Each step reads
//! the job, applies the transition and saves it guarded on the prior status,
//! so a concurrent transition makes the save fail instead of overwriting.

use chrono::Utc;
use follix_auth::JobId;
use follix_control::{AnalysisJob, JobStatus};
use serde::Deserialize;
use tracing::{info, warn};

use crate::outcome::{Failure, HandlerResult, Outcome, transition_as};
use crate::state::AppState;

const JOB_NOT_FOUND: &str = "Analysis job not found";
const BAD_TRANSITION: &str = "Analysis job cannot move to the requested status.";

/// Worker result for a finished job
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteJob {
    pub job_id: JobId,
    pub result: serde_json::Value,
    #[serde(default)]
    pub annotated_image_key: Option<String>,
    #[serde(default)]
    pub processing_time_ms: Option<i64>,
}

/// Worker failure report
#[derive(Debug, Clone, Deserialize)]
pub struct FailJob {
    pub job_id: JobId,
    pub error_message: String,
}

async fn advance(
    state: &AppState,
    job_id: JobId,
    step: impl FnOnce(&mut AnalysisJob) -> follix_control::Result<()>,
) -> Result<AnalysisJob, Failure> {
    let repo = state.store.analysis();
    let mut job = repo
        .get_job(job_id)
        .await?
        .ok_or_else(|| Failure::not_found(JOB_NOT_FOUND))?;

    let expected = job.status;
    step(&mut job).map_err(transition_as(BAD_TRANSITION, JOB_NOT_FOUND))?;
    repo.save_job_progress(&job, expected)
        .await
        .map_err(transition_as(BAD_TRANSITION, JOB_NOT_FOUND))?;
    Ok(job)
}

/// Pending -> Processing
pub async fn start_job(state: &AppState, job_id: JobId) -> Outcome<JobStatus> {
    state.settle(try_start_job(state, job_id).await)
}

async fn try_start_job(state: &AppState, job_id: JobId) -> HandlerResult<JobStatus> {
    let job = advance(state, job_id, |job| job.start(Utc::now())).await?;
    info!(job_id = %job.id, "Analysis job started");
    Ok(Outcome::success("Analysis job started", job.status))
}

/// Processing -> Completed
pub async fn complete_job(state: &AppState, req: CompleteJob) -> Outcome<JobStatus> {
    state.settle(try_complete_job(state, req).await)
}

async fn try_complete_job(state: &AppState, req: CompleteJob) -> HandlerResult<JobStatus> {
    if req.processing_time_ms.is_some_and(|ms| ms < 0) {
        return Err(Failure::invalid(
            "Processing time cannot be negative.",
            "Invalid processing time",
        ));
    }

    let CompleteJob {
        job_id,
        result,
        annotated_image_key,
        processing_time_ms,
    } = req;
    let job = advance(state, job_id, |job| {
        job.complete(Utc::now(), result, annotated_image_key, processing_time_ms)
    })
    .await?;

    info!(job_id = %job.id, processing_time_ms = ?job.processing_time_ms, "Analysis job completed");
    Ok(Outcome::success("Analysis job completed", job.status))
}

/// Processing -> Error
pub async fn fail_job(state: &AppState, req: FailJob) -> Outcome<JobStatus> {
    state.settle(try_fail_job(state, req).await)
}

async fn try_fail_job(state: &AppState, req: FailJob) -> HandlerResult<JobStatus> {
    let message = req.error_message;
    let job = advance(state, req.job_id, |job| job.fail(Utc::now(), message)).await?;

    warn!(job_id = %job.id, error = ?job.error_message, "Analysis job failed");
    Ok(Outcome::success("Analysis job marked as failed", job.status))
}
