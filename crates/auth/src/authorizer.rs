//! Clinic-scoped authorization
//!
//! Answers "may this caller act on this resource" for every protected
//! operation. Resource predicates follow ownership foreign keys up to the
//! owning clinic and then apply the clinic rule:
//!
//! ```text
//! Patient            -> Clinic
//! AnalysisSession    -> Patient -> Clinic
//! AnalysisJob        -> Patient -> Clinic
//! CalibrationProfile -> Clinic
//! ```
//!
//! Every predicate is total. A missing resource, an unresolvable caller or a
//! failed lookup all yield `false` (or an empty set), so callers can answer
//! with the same denial whether or not the resource exists.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::actor::Actor;
use crate::context::RequestContext;
use crate::gateway::{IdentityProvider, OwnershipGateway};
use crate::ids::{ClinicId, JobId, PatientId, ProfileId, SessionId};
use crate::roles::{Policy, Role};

/// Authorization core
#[derive(Clone)]
pub struct ClinicAuthorizer {
    identity: Arc<dyn IdentityProvider>,
    ownership: Arc<dyn OwnershipGateway>,
}

impl std::fmt::Debug for ClinicAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClinicAuthorizer").finish_non_exhaustive()
    }
}

impl ClinicAuthorizer {
    /// Create an authorizer over the given collaborators
    pub fn new(identity: Arc<dyn IdentityProvider>, ownership: Arc<dyn OwnershipGateway>) -> Self {
        Self { identity, ownership }
    }

    /// Resolve the caller of a request
    pub async fn actor<'c>(&self, ctx: &'c RequestContext) -> Option<&'c Actor> {
        ctx.actor(self.identity.as_ref()).await
    }

    // =========================================================================
    // Role queries
    // =========================================================================

    /// Caller holds the SuperAdmin role
    pub async fn is_super_admin(&self, ctx: &RequestContext) -> bool {
        self.actor(ctx)
            .await
            .is_some_and(|a| a.has_role(Role::SuperAdmin))
    }

    /// Caller holds the ClinicAdmin role
    pub async fn is_clinic_admin(&self, ctx: &RequestContext) -> bool {
        self.actor(ctx)
            .await
            .is_some_and(|a| a.has_role(Role::ClinicAdmin))
    }

    /// Caller satisfies a policy
    pub async fn satisfies(&self, ctx: &RequestContext, policy: Policy) -> bool {
        self.actor(ctx).await.is_some_and(|a| a.satisfies(policy))
    }

    /// Caller satisfies a policy given by identifier
    ///
    /// Unknown identifiers are denied.
    pub async fn satisfies_named(&self, ctx: &RequestContext, policy: &str) -> bool {
        match self.actor(ctx).await {
            Some(actor) => Policy::evaluate(policy, &actor.roles),
            None => false,
        }
    }

    // =========================================================================
    // Clinic membership
    // =========================================================================

    /// Caller's home clinic
    ///
    /// None for platform operators and for accounts without a clinic.
    pub async fn get_user_clinic_id(&self, ctx: &RequestContext) -> Option<ClinicId> {
        let actor = self.actor(ctx).await?;
        if actor.has_role(Role::SuperAdmin) {
            return None;
        }
        actor.clinic_id
    }

    /// Clinics the caller may act in
    ///
    /// Every clinic for platform operators, the home clinic for clinic staff,
    /// nothing otherwise.
    pub async fn get_user_accessible_clinics(&self, ctx: &RequestContext) -> BTreeSet<ClinicId> {
        let Some(actor) = self.actor(ctx).await else {
            return BTreeSet::new();
        };

        if actor.has_role(Role::SuperAdmin) {
            return match self.ownership.clinic_ids().await {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    warn!(user_id = %actor.id, error = %e, "Failed to list clinics");
                    BTreeSet::new()
                }
            };
        }

        actor.clinic_id.into_iter().collect()
    }

    // =========================================================================
    // Resource predicates
    // =========================================================================

    /// Caller may act in a clinic
    ///
    /// Platform operators pass without any existence check.
    pub async fn can_access_clinic(&self, ctx: &RequestContext, clinic_id: &ClinicId) -> bool {
        let Some(actor) = self.actor(ctx).await else {
            return false;
        };
        Self::clinic_rule(actor, clinic_id)
    }

    /// Caller may act on a patient
    pub async fn can_access_patient(&self, ctx: &RequestContext, patient_id: &PatientId) -> bool {
        if self.actor(ctx).await.is_none() {
            return false;
        }

        let clinic = match self.ownership.clinic_of_patient(patient_id).await {
            Ok(Some(clinic)) => clinic,
            Ok(None) => {
                debug!(patient_id = %patient_id, "Patient not found");
                return false;
            }
            Err(e) => {
                warn!(patient_id = %patient_id, error = %e, "Patient ownership lookup failed");
                return false;
            }
        };

        self.can_access_clinic(ctx, &clinic).await
    }

    /// Caller may act on an analysis session
    pub async fn can_access_analysis_session(
        &self,
        ctx: &RequestContext,
        session_id: &SessionId,
    ) -> bool {
        if self.actor(ctx).await.is_none() {
            return false;
        }

        match self.ownership.patient_of_session(session_id).await {
            Ok(Some(patient)) => self.can_access_patient(ctx, &patient).await,
            Ok(None) => {
                debug!(session_id = %session_id, "Analysis session not found");
                false
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session ownership lookup failed");
                false
            }
        }
    }

    /// Caller may act on an analysis job
    ///
    /// Resolved through the job's patient, not its session.
    pub async fn can_access_analysis_job(&self, ctx: &RequestContext, job_id: &JobId) -> bool {
        if self.actor(ctx).await.is_none() {
            return false;
        }

        match self.ownership.patient_of_job(job_id).await {
            Ok(Some(patient)) => self.can_access_patient(ctx, &patient).await,
            Ok(None) => {
                debug!(job_id = %job_id, "Analysis job not found");
                false
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Job ownership lookup failed");
                false
            }
        }
    }

    /// Caller may act on a calibration profile
    pub async fn can_access_calibration_profile(
        &self,
        ctx: &RequestContext,
        profile_id: &ProfileId,
    ) -> bool {
        if self.actor(ctx).await.is_none() {
            return false;
        }

        match self.ownership.clinic_of_profile(profile_id).await {
            Ok(Some(clinic)) => self.can_access_clinic(ctx, &clinic).await,
            Ok(None) => {
                debug!(profile_id = %profile_id, "Calibration profile not found");
                false
            }
            Err(e) => {
                warn!(profile_id = %profile_id, error = %e, "Profile ownership lookup failed");
                false
            }
        }
    }

    fn clinic_rule(actor: &Actor, clinic_id: &ClinicId) -> bool {
        if actor.has_role(Role::SuperAdmin) {
            return true;
        }
        actor.clinic_id.as_ref() == Some(clinic_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::AccountStatus;
    use crate::ids::UserId;
    use crate::test_utils::InMemoryDirectory;

    fn authorizer(dir: &Arc<InMemoryDirectory>) -> ClinicAuthorizer {
        ClinicAuthorizer::new(dir.clone(), dir.clone())
    }

    #[tokio::test]
    async fn test_role_queries() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let clinic = dir.add_clinic();

        let root = RequestContext::for_user(dir.add_actor(Role::SuperAdmin, None).id);
        let admin = RequestContext::for_user(dir.add_actor(Role::ClinicAdmin, Some(clinic)).id);
        let doctor = RequestContext::for_user(dir.add_actor(Role::Doctor, Some(clinic)).id);

        assert!(auth.is_super_admin(&root).await);
        assert!(!auth.is_clinic_admin(&root).await);
        assert!(auth.satisfies(&root, Policy::ClinicAdministration).await);

        assert!(!auth.is_super_admin(&admin).await);
        assert!(auth.is_clinic_admin(&admin).await);
        assert!(auth.satisfies(&admin, Policy::ClinicAdministration).await);

        assert!(!auth.is_clinic_admin(&doctor).await);
        assert!(!auth.satisfies(&doctor, Policy::ClinicAdministration).await);
        assert!(auth.satisfies(&doctor, Policy::ClinicStaff).await);
        assert!(auth.satisfies_named(&doctor, "authenticated").await);
        assert!(!auth.satisfies_named(&doctor, "anything_else").await);
    }

    #[tokio::test]
    async fn test_clinic_membership() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let c1 = dir.add_clinic();
        let c2 = dir.add_clinic();

        let root = RequestContext::for_user(dir.add_actor(Role::SuperAdmin, None).id);
        let doctor = RequestContext::for_user(dir.add_actor(Role::Doctor, Some(c1)).id);
        let unbound = RequestContext::for_user(dir.add_actor(Role::Doctor, None).id);

        assert_eq!(auth.get_user_clinic_id(&root).await, None);
        assert_eq!(auth.get_user_clinic_id(&doctor).await, Some(c1));
        assert_eq!(auth.get_user_clinic_id(&unbound).await, None);

        assert_eq!(auth.get_user_accessible_clinics(&root).await, BTreeSet::from([c1, c2]));
        assert_eq!(auth.get_user_accessible_clinics(&doctor).await, BTreeSet::from([c1]));
        assert!(auth.get_user_accessible_clinics(&unbound).await.is_empty());
    }

    #[tokio::test]
    async fn test_clinic_rule() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let c1 = dir.add_clinic();
        let c2 = dir.add_clinic();

        let root = RequestContext::for_user(dir.add_actor(Role::SuperAdmin, None).id);
        let admin = RequestContext::for_user(dir.add_actor(Role::ClinicAdmin, Some(c1)).id);
        let unbound = RequestContext::for_user(dir.add_actor(Role::ClinicAdmin, None).id);

        // Platform operators pass even for clinics that do not exist
        assert!(auth.can_access_clinic(&root, &ClinicId::new()).await);
        assert!(auth.can_access_clinic(&admin, &c1).await);
        assert!(!auth.can_access_clinic(&admin, &c2).await);
        assert!(!auth.can_access_clinic(&unbound, &c1).await);
    }

    #[tokio::test]
    async fn test_patient_chain() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let c1 = dir.add_clinic();
        let c2 = dir.add_clinic();
        let p1 = dir.add_patient(c1);
        let p2 = dir.add_patient(c2);

        let root = RequestContext::for_user(dir.add_actor(Role::SuperAdmin, None).id);
        let doctor = RequestContext::for_user(dir.add_actor(Role::Doctor, Some(c1)).id);

        assert!(auth.can_access_patient(&doctor, &p1).await);
        assert!(!auth.can_access_patient(&doctor, &p2).await);
        assert!(auth.can_access_patient(&root, &p2).await);

        // Missing patients are denied to everyone
        let missing = PatientId::new();
        assert!(!auth.can_access_patient(&doctor, &missing).await);
        assert!(!auth.can_access_patient(&root, &missing).await);
    }

    #[tokio::test]
    async fn test_session_and_job_chain() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let c1 = dir.add_clinic();
        let c2 = dir.add_clinic();
        let p1 = dir.add_patient(c1);
        let p2 = dir.add_patient(c2);
        let s1 = dir.add_session(p1);
        let j2 = dir.add_job(p2);

        let doctor = RequestContext::for_user(dir.add_actor(Role::Doctor, Some(c1)).id);
        let other = RequestContext::for_user(dir.add_actor(Role::Doctor, Some(c2)).id);

        assert!(auth.can_access_analysis_session(&doctor, &s1).await);
        assert!(!auth.can_access_analysis_session(&other, &s1).await);
        assert!(!auth.can_access_analysis_session(&doctor, &SessionId::new()).await);

        assert!(auth.can_access_analysis_job(&other, &j2).await);
        assert!(!auth.can_access_analysis_job(&doctor, &j2).await);
        assert!(!auth.can_access_analysis_job(&doctor, &JobId::new()).await);
    }

    #[tokio::test]
    async fn test_profile_chain() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let c1 = dir.add_clinic();
        let c2 = dir.add_clinic();
        let profile = dir.add_profile(c1);

        let admin = RequestContext::for_user(dir.add_actor(Role::ClinicAdmin, Some(c1)).id);
        let other = RequestContext::for_user(dir.add_actor(Role::ClinicAdmin, Some(c2)).id);
        let root = RequestContext::for_user(dir.add_actor(Role::SuperAdmin, None).id);

        assert!(auth.can_access_calibration_profile(&admin, &profile).await);
        assert!(!auth.can_access_calibration_profile(&other, &profile).await);
        assert!(auth.can_access_calibration_profile(&root, &profile).await);
        assert!(!auth.can_access_calibration_profile(&root, &ProfileId::new()).await);
    }

    #[tokio::test]
    async fn test_unresolvable_actor_denied_everywhere() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let clinic = dir.add_clinic();
        let patient = dir.add_patient(clinic);
        let session = dir.add_session(patient);
        let job = dir.add_job(patient);
        let profile = dir.add_profile(clinic);

        let disabled = dir.add_actor(Role::SuperAdmin, None);
        dir.set_status(&disabled.id, AccountStatus::Disabled);

        for ctx in [
            RequestContext::anonymous(),
            RequestContext::for_user(UserId::new()),
            RequestContext::for_user(disabled.id),
        ] {
            assert!(!auth.is_super_admin(&ctx).await);
            assert!(!auth.is_clinic_admin(&ctx).await);
            assert!(auth.get_user_clinic_id(&ctx).await.is_none());
            assert!(auth.get_user_accessible_clinics(&ctx).await.is_empty());
            assert!(!auth.can_access_clinic(&ctx, &clinic).await);
            assert!(!auth.can_access_patient(&ctx, &patient).await);
            assert!(!auth.can_access_analysis_session(&ctx, &session).await);
            assert!(!auth.can_access_analysis_job(&ctx, &job).await);
            assert!(!auth.can_access_calibration_profile(&ctx, &profile).await);
        }
    }

    #[tokio::test]
    async fn test_gateway_failure_denies() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let clinic = dir.add_clinic();
        let patient = dir.add_patient(clinic);
        let root = RequestContext::for_user(dir.add_actor(Role::SuperAdmin, None).id);

        // Resolve the actor before lookups start failing
        assert!(auth.is_super_admin(&root).await);
        dir.fail_lookups(true);

        assert!(!auth.can_access_patient(&root, &patient).await);
        assert!(auth.get_user_accessible_clinics(&root).await.is_empty());
        // The clinic rule itself needs no lookup
        assert!(auth.can_access_clinic(&root, &clinic).await);
    }

    #[tokio::test]
    async fn test_actor_resolved_once_per_request() {
        let dir = Arc::new(InMemoryDirectory::new());
        let auth = authorizer(&dir);
        let clinic = dir.add_clinic();
        let patient = dir.add_patient(clinic);
        let ctx = RequestContext::for_user(dir.add_actor(Role::Doctor, Some(clinic)).id);

        for _ in 0..3 {
            assert!(auth.can_access_patient(&ctx, &patient).await);
        }
        assert_eq!(dir.identity_lookups(), 1);
    }
}
