//! Follix persistence
//!
//! Turso-backed storage for clinics, accounts, patients, analysis sessions
//! and jobs, calibration profiles, invitations and billing.
//!
//! # Usage
//!
//! ```ignore
//! use follix_control::Store;
//!
//! // File-based (production)
//! let store = Store::open("data/follix.db").await?;
//!
//! // In-memory (testing)
//! let store = Store::new_memory().await?;
//!
//! // Access repositories
//! let patient = store.patients().get_by_id(patient_id).await?;
//! ```
//!
//! # Auth Integration
//!
//! `Store` implements `follix_auth::IdentityProvider` and
//! `follix_auth::OwnershipGateway`, so one `Arc<Store>` can back a
//! `ClinicAuthorizer` directly. Repositories never check access themselves;
//! callers authorize first.

pub mod db;
pub mod error;
mod gateway;
pub mod models;
pub mod repos;

// Re-exports
pub use db::Store;
pub use error::{ControlError, Result};
pub use models::{
    Account, AnalysisJob, AnalysisSession, CalibrationProfile, Clinic, ClinicInvitation,
    InvitationStatus, JobStatus, Patient, Payment, PaymentStatus, ProfileState, SessionStatus,
    Subscription, SubscriptionPlan, SubscriptionStatus,
};
pub use repos::{
    AnalysisRepo, BillingRepo, CalibrationRepo, ClinicRepo, InvitationRepo, PatientRepo, UserRepo,
};

impl Store {
    /// Clinic repository
    pub fn clinics(&self) -> ClinicRepo<'_> {
        ClinicRepo::new(self.database())
    }

    /// Account repository
    pub fn users(&self) -> UserRepo<'_> {
        UserRepo::new(self.database())
    }

    /// Patient repository
    pub fn patients(&self) -> PatientRepo<'_> {
        PatientRepo::new(self.database())
    }

    /// Analysis session and job repository
    pub fn analysis(&self) -> AnalysisRepo<'_> {
        AnalysisRepo::new(self.database())
    }

    /// Calibration profile repository
    pub fn calibration(&self) -> CalibrationRepo<'_> {
        CalibrationRepo::new(self.database())
    }

    /// Invitation repository
    pub fn invitations(&self) -> InvitationRepo<'_> {
        InvitationRepo::new(self.database())
    }

    /// Plans, subscriptions and payments
    pub fn billing(&self) -> BillingRepo<'_> {
        BillingRepo::new(self.database())
    }
}
