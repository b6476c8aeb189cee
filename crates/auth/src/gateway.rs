//! Collaborator traits consumed by the authorizer
//!
//! Abstracts over the storage backend. `follix-control` implements both
//! traits on its store; tests use [`crate::test_utils::InMemoryDirectory`].

use async_trait::async_trait;

use crate::actor::Actor;
use crate::error::Result;
use crate::ids::{ClinicId, JobId, PatientId, ProfileId, SessionId, UserId};

/// Resolves account ids to actors
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up an account
    ///
    /// Returns None if the account does not exist.
    async fn resolve_actor(&self, user_id: &UserId) -> Result<Option<Actor>>;
}

/// Point lookups along ownership foreign keys
///
/// Each method is a single read by primary key. `Ok(None)` means the
/// resource does not exist.
#[async_trait]
pub trait OwnershipGateway: Send + Sync {
    /// Every clinic in the system
    async fn clinic_ids(&self) -> Result<Vec<ClinicId>>;

    /// Clinic owning a patient
    async fn clinic_of_patient(&self, patient_id: &PatientId) -> Result<Option<ClinicId>>;

    /// Patient owning an analysis session
    async fn patient_of_session(&self, session_id: &SessionId) -> Result<Option<PatientId>>;

    /// Patient owning an analysis job
    async fn patient_of_job(&self, job_id: &JobId) -> Result<Option<PatientId>>;

    /// Clinic owning a calibration profile
    async fn clinic_of_profile(&self, profile_id: &ProfileId) -> Result<Option<ClinicId>>;
}
