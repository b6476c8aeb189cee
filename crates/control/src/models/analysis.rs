//! Analysis sessions and jobs
//!
//! A session groups the images taken for one patient on one day. Each image
//! becomes a job that an external worker moves through:
//!
//! ```text
//! Pending -> Processing -> Completed
//!                       -> Error
//! ```
//!
//! `started_at` is set on entering Processing, `completed_at` on entering
//! Completed or Error. Nothing leaves a terminal state.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use follix_auth::{JobId, PatientId, ProfileId, SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Longest accepted location tag
pub const MAX_LOCATION_TAG_LEN: usize = 100;

/// Longest accepted doctor notes
pub const MAX_DOCTOR_NOTES_LEN: usize = 2000;

// =============================================================================
// Session
// =============================================================================

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Images are still being collected or analysed
    InProgress,
    /// Final report generated
    Completed,
    /// Session abandoned after a failure
    Error,
}

impl SessionStatus {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Transition table
    ///
    /// A completed session may have its report regenerated, which keeps it
    /// completed.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (InProgress, Completed) | (InProgress, Error) | (Completed, Completed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analysis session entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSession {
    /// Unique identifier
    pub id: SessionId,
    /// Owning patient
    pub patient_id: PatientId,
    /// Account that opened the session
    pub created_by: UserId,
    /// Clinical date of the session
    pub session_date: NaiveDate,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Aggregated report, present once completed
    pub final_report: Option<serde_json::Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AnalysisSession {
    /// Open a new session
    pub fn new(patient_id: PatientId, created_by: UserId, session_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            patient_id,
            created_by,
            session_date,
            status: SessionStatus::InProgress,
            final_report: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the final report and mark the session completed
    pub fn complete_with_report(&mut self, report: serde_json::Value) -> Result<()> {
        if !self.status.can_transition_to(SessionStatus::Completed) {
            return Err(ControlError::transition(
                "analysis session",
                self.status.as_str(),
                SessionStatus::Completed.as_str(),
            ));
        }
        self.status = SessionStatus::Completed;
        self.final_report = Some(report);
        self.updated_at = Utc::now();
        Ok(())
    }
}

// =============================================================================
// Job
// =============================================================================

/// Job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Queued, not yet picked up
    Pending,
    /// Worker is analysing the image
    Processing,
    /// Result available
    Completed,
    /// Analysis failed
    Error,
}

impl JobStatus {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Transition table
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Error)
        )
    }

    /// No further transitions possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analysis job entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Unique identifier
    pub id: JobId,
    /// Session the image was taken in
    pub session_id: SessionId,
    /// Patient the image belongs to
    pub patient_id: PatientId,
    /// Calibration used for the analysis
    pub calibration_profile_id: ProfileId,
    /// Account that uploaded the image
    pub created_by: UserId,
    /// Scalp location label
    pub location_tag: String,
    /// Object storage key of the uploaded image
    pub image_storage_key: String,
    /// Object storage key of the annotated image
    pub annotated_image_key: Option<String>,
    /// Lifecycle status
    pub status: JobStatus,
    /// Worker output
    pub result: Option<serde_json::Value>,
    /// Free-text notes added by clinic staff
    pub doctor_notes: Option<String>,
    /// Failure description
    pub error_message: Option<String>,
    /// Worker processing time
    pub processing_time_ms: Option<i64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Entered Processing
    pub started_at: Option<DateTime<Utc>>,
    /// Entered Completed or Error
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    /// Create a pending job
    pub fn new(
        session_id: SessionId,
        patient_id: PatientId,
        calibration_profile_id: ProfileId,
        created_by: UserId,
        location_tag: impl Into<String>,
        image_storage_key: impl Into<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            session_id,
            patient_id,
            calibration_profile_id,
            created_by,
            location_tag: location_tag.into(),
            image_storage_key: image_storage_key.into(),
            annotated_image_key: None,
            status: JobStatus::Pending,
            result: None,
            doctor_notes: None,
            error_message: None,
            processing_time_ms: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn advance(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ControlError::transition(
                "analysis job",
                self.status.as_str(),
                next.as_str(),
            ));
        }
        self.status = next;
        Ok(())
    }

    /// Worker picked the job up
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.advance(JobStatus::Processing)?;
        self.started_at = Some(at);
        Ok(())
    }

    /// Worker produced a result
    pub fn complete(
        &mut self,
        at: DateTime<Utc>,
        result: serde_json::Value,
        annotated_image_key: Option<String>,
        processing_time_ms: Option<i64>,
    ) -> Result<()> {
        self.advance(JobStatus::Completed)?;
        self.completed_at = Some(at);
        self.result = Some(result);
        self.annotated_image_key = annotated_image_key;
        self.processing_time_ms = processing_time_ms;
        Ok(())
    }

    /// Worker gave up
    pub fn fail(&mut self, at: DateTime<Utc>, message: impl Into<String>) -> Result<()> {
        self.advance(JobStatus::Error)?;
        self.completed_at = Some(at);
        self.error_message = Some(message.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> AnalysisJob {
        AnalysisJob::new(
            SessionId::new(),
            PatientId::new(),
            ProfileId::new(),
            UserId::new(),
            "crown",
            "uploads/a.jpg",
        )
    }

    #[test]
    fn test_job_transition_table() {
        use JobStatus::*;
        let all = [Pending, Processing, Completed, Error];
        let allowed = [(Pending, Processing), (Processing, Completed), (Processing, Error)];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_session_transition_table() {
        use SessionStatus::*;
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Error));
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Error.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(InProgress));
    }

    #[test]
    fn test_job_lifecycle_timestamps() {
        let mut job = job();
        assert!(job.started_at.is_none());

        let t1 = Utc::now();
        job.start(t1).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.started_at, Some(t1));
        assert!(job.completed_at.is_none());

        let t2 = Utc::now();
        job.complete(t2, serde_json::json!({"hair_count": 120}), Some("annotated/a.png".into()), Some(850))
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, Some(t2));
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_job_rejects_skips_and_terminal_exits() {
        let mut job = job();
        assert!(job.complete(Utc::now(), serde_json::json!({}), None, None).is_err());
        assert!(job.fail(Utc::now(), "boom").is_err());
        assert_eq!(job.status, JobStatus::Pending);

        job.start(Utc::now()).unwrap();
        job.fail(Utc::now(), "model crashed").unwrap();
        assert_eq!(job.error_message.as_deref(), Some("model crashed"));
        assert!(job.start(Utc::now()).is_err());
        assert_eq!(job.status, JobStatus::Error);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(JobStatus::parse("Pending"), Some(JobStatus::Pending));
        assert_eq!(JobStatus::parse("COMPLETED"), Some(JobStatus::Completed));
        assert_eq!(JobStatus::parse("done"), None);
        assert_eq!(SessionStatus::parse("in_progress"), Some(SessionStatus::InProgress));
        assert_eq!(SessionStatus::parse("paused"), None);
    }
}
