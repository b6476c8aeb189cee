//! Test utilities
//!
//! An in-memory directory that implements both collaborator traits, plus
//! helpers for issuing real signed tokens. Use these instead of mocking; they
//! drive the real authorizer and token code paths.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::actor::{AccountStatus, Actor};
use crate::error::{AuthError, Result};
use crate::gateway::{IdentityProvider, OwnershipGateway};
use crate::ids::{ClinicId, JobId, PatientId, ProfileId, SessionId, UserId};
use crate::roles::Role;
use crate::tokens::TokenIssuer;

/// Test secret for JWT signing (32 bytes for HS256)
pub const TEST_SECRET: &[u8] = b"follix-test-secret-32-bytes-long";

/// Token issuer signed with [`TEST_SECRET`]
pub fn test_issuer() -> TokenIssuer {
    match TokenIssuer::new(TEST_SECRET, Duration::from_secs(3600), Some("follix-test".into())) {
        Ok(issuer) => issuer,
        Err(e) => panic!("test secret rejected: {}", e),
    }
}

#[derive(Default)]
struct Tables {
    actors: HashMap<UserId, Actor>,
    clinics: Vec<ClinicId>,
    patients: HashMap<PatientId, ClinicId>,
    sessions: HashMap<SessionId, PatientId>,
    jobs: HashMap<JobId, PatientId>,
    profiles: HashMap<ProfileId, ClinicId>,
}

/// In-memory identity provider and ownership gateway
#[derive(Default)]
pub struct InMemoryDirectory {
    tables: Mutex<Tables>,
    fail: AtomicBool,
    identity_lookups: AtomicUsize,
    ownership_lookups: AtomicUsize,
}

impl InMemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut guard = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn check_fail(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::gateway("directory unavailable"));
        }
        Ok(())
    }

    /// Register a clinic
    pub fn add_clinic(&self) -> ClinicId {
        let id = ClinicId::new();
        self.with_tables(|t| t.clinics.push(id));
        id
    }

    /// Register an active account
    pub fn add_actor(&self, role: Role, clinic_id: Option<ClinicId>) -> Actor {
        let id = UserId::new();
        let actor = Actor::new(id, format!("{}@follix.test", id), role, clinic_id);
        self.with_tables(|t| {
            if let Some(clinic) = clinic_id
                && !t.clinics.contains(&clinic)
            {
                t.clinics.push(clinic);
            }
            t.actors.insert(id, actor.clone());
        });
        actor
    }

    /// Change an account's status
    pub fn set_status(&self, user_id: &UserId, status: AccountStatus) {
        self.with_tables(|t| {
            if let Some(actor) = t.actors.get_mut(user_id) {
                actor.status = status;
            }
        });
    }

    /// Register a patient in a clinic
    pub fn add_patient(&self, clinic_id: ClinicId) -> PatientId {
        let id = PatientId::new();
        self.with_tables(|t| t.patients.insert(id, clinic_id));
        id
    }

    /// Register a session for a patient
    pub fn add_session(&self, patient_id: PatientId) -> SessionId {
        let id = SessionId::new();
        self.with_tables(|t| t.sessions.insert(id, patient_id));
        id
    }

    /// Register a job for a patient
    pub fn add_job(&self, patient_id: PatientId) -> JobId {
        let id = JobId::new();
        self.with_tables(|t| t.jobs.insert(id, patient_id));
        id
    }

    /// Register a calibration profile in a clinic
    pub fn add_profile(&self, clinic_id: ClinicId) -> ProfileId {
        let id = ProfileId::new();
        self.with_tables(|t| t.profiles.insert(id, clinic_id));
        id
    }

    /// Make every lookup fail
    pub fn fail_lookups(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of identity lookups served
    pub fn identity_lookups(&self) -> usize {
        self.identity_lookups.load(Ordering::SeqCst)
    }

    /// Number of ownership lookups served
    pub fn ownership_lookups(&self) -> usize {
        self.ownership_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryDirectory {
    async fn resolve_actor(&self, user_id: &UserId) -> Result<Option<Actor>> {
        self.identity_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_fail()?;
        Ok(self.with_tables(|t| t.actors.get(user_id).cloned()))
    }
}

#[async_trait]
impl OwnershipGateway for InMemoryDirectory {
    async fn clinic_ids(&self) -> Result<Vec<ClinicId>> {
        self.ownership_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_fail()?;
        Ok(self.with_tables(|t| t.clinics.clone()))
    }

    async fn clinic_of_patient(&self, patient_id: &PatientId) -> Result<Option<ClinicId>> {
        self.ownership_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_fail()?;
        Ok(self.with_tables(|t| t.patients.get(patient_id).copied()))
    }

    async fn patient_of_session(&self, session_id: &SessionId) -> Result<Option<PatientId>> {
        self.ownership_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_fail()?;
        Ok(self.with_tables(|t| t.sessions.get(session_id).copied()))
    }

    async fn patient_of_job(&self, job_id: &JobId) -> Result<Option<PatientId>> {
        self.ownership_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_fail()?;
        Ok(self.with_tables(|t| t.jobs.get(job_id).copied()))
    }

    async fn clinic_of_profile(&self, profile_id: &ProfileId) -> Result<Option<ClinicId>> {
        self.ownership_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_fail()?;
        Ok(self.with_tables(|t| t.profiles.get(profile_id).copied()))
    }
}
