//! Store-backed implementations of the authorizer's collaborator traits

use async_trait::async_trait;
use follix_auth::{
    Actor, AuthError, ClinicId, IdentityProvider, JobId, OwnershipGateway, PatientId, ProfileId,
    SessionId, UserId,
};

use crate::db::Store;

type AuthResult<T> = follix_auth::Result<T>;

#[async_trait]
impl IdentityProvider for Store {
    async fn resolve_actor(&self, user_id: &UserId) -> AuthResult<Option<Actor>> {
        let account = self.users().get_by_id(*user_id).await.map_err(AuthError::gateway)?;
        Ok(account.map(|a| a.to_actor()))
    }
}

#[async_trait]
impl OwnershipGateway for Store {
    async fn clinic_ids(&self) -> AuthResult<Vec<ClinicId>> {
        self.clinics().list_ids().await.map_err(AuthError::gateway)
    }

    async fn clinic_of_patient(&self, patient_id: &PatientId) -> AuthResult<Option<ClinicId>> {
        self.patients().clinic_of(*patient_id).await.map_err(AuthError::gateway)
    }

    async fn patient_of_session(&self, session_id: &SessionId) -> AuthResult<Option<PatientId>> {
        self.analysis()
            .patient_of_session(*session_id)
            .await
            .map_err(AuthError::gateway)
    }

    async fn patient_of_job(&self, job_id: &JobId) -> AuthResult<Option<PatientId>> {
        self.analysis().patient_of_job(*job_id).await.map_err(AuthError::gateway)
    }

    async fn clinic_of_profile(&self, profile_id: &ProfileId) -> AuthResult<Option<ClinicId>> {
        self.calibration().clinic_of(*profile_id).await.map_err(AuthError::gateway)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use follix_auth::{ClinicAuthorizer, RequestContext, Role};

    use super::*;
    use crate::models::{AnalysisJob, AnalysisSession, Account, CalibrationProfile, Clinic, Patient};

    #[tokio::test]
    async fn test_authorizer_over_store() {
        let store = Arc::new(Store::new_memory().await.unwrap());

        let north = Clinic::new("North");
        let south = Clinic::new("South");
        store.clinics().create(&north).await.unwrap();
        store.clinics().create(&south).await.unwrap();

        let doctor = Account::new("doc@north.test", "h", "D", "N", Role::Doctor, Some(north.id));
        store.users().create(&doctor).await.unwrap();

        let patient = Patient::new(north.id, None, "Ada", "L", None);
        store.patients().create(&patient).await.unwrap();
        let session = AnalysisSession::new(patient.id, doctor.id, Utc::now().date_naive());
        store.analysis().create_session(&session).await.unwrap();
        let profile = CalibrationProfile::new(north.id, "A", serde_json::json!({}));
        store.calibration().create(&profile).await.unwrap();
        let job = AnalysisJob::new(session.id, patient.id, profile.id, doctor.id, "crown", "k");
        store.analysis().create_job(&job).await.unwrap();

        let authz = ClinicAuthorizer::new(store.clone(), store.clone());
        let ctx = RequestContext::for_user(doctor.id);

        assert!(authz.can_access_clinic(&ctx, &north.id).await);
        assert!(!authz.can_access_clinic(&ctx, &south.id).await);
        assert!(authz.can_access_patient(&ctx, &patient.id).await);
        assert!(authz.can_access_analysis_session(&ctx, &session.id).await);
        assert!(authz.can_access_analysis_job(&ctx, &job.id).await);
        assert!(authz.can_access_calibration_profile(&ctx, &profile.id).await);
        assert!(!authz.can_access_patient(&ctx, &PatientId::new()).await);
    }

    #[tokio::test]
    async fn test_unknown_account_resolves_to_none() {
        let store = Store::new_memory().await.unwrap();
        assert!(store.resolve_actor(&UserId::new()).await.unwrap().is_none());
        assert!(store.clinic_ids().await.unwrap().is_empty());
    }
}
