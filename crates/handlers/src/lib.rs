//! Follix handlers
//!
//! Authorized command and query handlers over the Follix store.
//!
//! # Overview
//!
//! Every handler takes the shared [`AppState`] and, when it acts for a user,
//! a per-request [`follix_auth::RequestContext`]. It authorizes with a single
//! predicate first, then validates and mutates, and always returns an
//! [`Outcome`]: failures are data, never errors.
//!
//! # Usage
//!
//! ```ignore
//! use follix_handlers::{AppState, patients};
//!
//! let ctx = state.context_for(bearer_token);
//! let outcome = patients::get_patient(&state, &ctx, patient_id).await;
//! if !outcome.success {
//!     eprintln!("{}", outcome.message);
//! }
//! ```
//!
//! # Modules
//!
//! - [`clinics`] / [`patients`] - tenant and patient records
//! - [`analysis`] - sessions, image jobs, doctor notes, final reports
//! - [`jobs`] - lifecycle steps reported by the analysis worker
//! - [`calibration`] - versioned calibration profiles
//! - [`invitations`] - clinic invitations and invited sign-up
//! - [`accounts`] - login
//! - [`billing`] - plans, subscriptions, gateway payment confirmations
//! - [`admin`] - SuperAdmin user and billing operations

pub mod accounts;
pub mod admin;
pub mod analysis;
pub mod billing;
pub mod calibration;
pub mod clinics;
pub mod invitations;
pub mod jobs;
pub mod outcome;
pub mod patients;
pub mod ports;
pub mod report;
pub mod state;

/// Test utilities: recording fakes for the external collaborators
pub mod test_utils;

pub use outcome::{DATABASE_ERROR, Failure, FailureKind, HandlerResult, Outcome};
pub use ports::{
    CheckoutRequest, CheckoutSession, CollaboratorError, InvitationNotifier, JobQueue, PaymentGateway,
};
pub use report::FinalReport;
pub use state::{AppState, Collaborators, HandlerSettings};
