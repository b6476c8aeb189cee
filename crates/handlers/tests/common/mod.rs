//! Shared fixtures for handler integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use follix_auth::test_utils::test_issuer;
use follix_auth::{ClinicId, PatientId, ProfileId, RequestContext, Role, SessionId, UserId};
use follix_control::{Account, AnalysisJob, AnalysisSession, CalibrationProfile, Clinic, Patient, Store};
use follix_handlers::test_utils::Fakes;
use follix_handlers::{AppState, HandlerSettings};

/// App state over an in-memory store, plus the collaborator fakes
pub struct TestApp {
    pub state: AppState,
    pub fakes: Fakes,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(Store::new_memory().await.unwrap());
        let fakes = Fakes::new();
        let settings = HandlerSettings {
            development: true,
            ..HandlerSettings::default()
        };
        let state = AppState::new(store, test_issuer(), fakes.collaborators(), settings);
        Self { state, fakes }
    }

    pub fn store(&self) -> &Store {
        &self.state.store
    }

    pub async fn clinic(&self, name: &str) -> ClinicId {
        let clinic = Clinic::new(name);
        self.store().clinics().create(&clinic).await.unwrap();
        clinic.id
    }

    /// Account whose password hash is never checked
    pub async fn account(&self, email: &str, role: Role, clinic: Option<ClinicId>) -> UserId {
        let account = Account::new(email, "$argon2id$unused", "Test", "User", role, clinic);
        self.store().users().create(&account).await.unwrap();
        account.id
    }

    pub async fn doctor(&self, clinic: ClinicId, email: &str) -> RequestContext {
        RequestContext::for_user(self.account(email, Role::Doctor, Some(clinic)).await)
    }

    pub async fn clinic_admin(&self, clinic: ClinicId, email: &str) -> RequestContext {
        RequestContext::for_user(self.account(email, Role::ClinicAdmin, Some(clinic)).await)
    }

    pub async fn super_admin(&self, email: &str) -> RequestContext {
        RequestContext::for_user(self.account(email, Role::SuperAdmin, None).await)
    }

    pub async fn patient(&self, clinic: ClinicId, cpid: Option<&str>) -> PatientId {
        let patient = Patient::new(clinic, cpid, "Jane", "Doe", NaiveDate::from_ymd_opt(1980, 5, 1));
        self.store().patients().create(&patient).await.unwrap();
        patient.id
    }

    pub async fn session(&self, patient: PatientId, created_by: UserId) -> SessionId {
        let session = AnalysisSession::new(patient, created_by, chrono::Utc::now().date_naive());
        self.store().analysis().create_session(&session).await.unwrap();
        session.id
    }

    pub async fn profile(&self, clinic: ClinicId, name: &str) -> ProfileId {
        let profile = CalibrationProfile::new(clinic, name, serde_json::json!({"pixels_per_mm": 10}));
        self.store().calibration().create(&profile).await.unwrap();
        profile.id
    }

    /// Pending job stored directly
    pub async fn job(&self, session: SessionId, patient: PatientId, profile: ProfileId, by: UserId) -> AnalysisJob {
        let job = AnalysisJob::new(session, patient, profile, by, "crown", "uploads/crown.jpg");
        self.store().analysis().create_job(&job).await.unwrap();
        job
    }
}
