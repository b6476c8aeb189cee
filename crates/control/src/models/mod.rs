//! Follix domain models
//!
//! Plain data types plus the status enums and their transition tables.
//! Persistence lives in `repos`.

mod analysis;
mod billing;
mod calibration;
mod clinic;
mod invitation;
mod patient;
mod user;

pub use analysis::{
    AnalysisJob, AnalysisSession, JobStatus, MAX_DOCTOR_NOTES_LEN, MAX_LOCATION_TAG_LEN,
    SessionStatus,
};
pub use billing::{
    BILLING_PERIOD_DAYS, Payment, PaymentStatus, Subscription, SubscriptionPlan,
    SubscriptionStatus,
};
pub use calibration::{CalibrationProfile, MAX_PROFILE_NAME_LEN, ProfileState};
pub use clinic::{Clinic, MAX_CLINIC_NAME_LEN};
pub use invitation::{
    ClinicInvitation, DEFAULT_INVITATION_TTL_DAYS, INVITATION_TOKEN_LEN, InvitationStatus,
    is_well_formed_token,
};
pub use patient::{
    MAX_CLINIC_PATIENT_ID_LEN, MAX_PATIENT_NAME_LEN, Patient, normalize_clinic_patient_id,
};
pub use user::{Account, normalize_email};
