//! Follix - Authorization
//!
//! Clinic-scoped, role-based access control for the Follix backend.
//!
//! # Overview
//!
//! Every protected operation asks the [`ClinicAuthorizer`] a yes/no question
//! about one resource before touching it:
//!
//! | Role | Clinics it may act in |
//! |------|-----------------------|
//! | `Doctor` | Its own clinic |
//! | `ClinicAdmin` | Its own clinic |
//! | `SuperAdmin` | Every clinic |
//!
//! The caller travels as an explicit [`RequestContext`], built either from a
//! verified bearer token ([`TokenIssuer::context_for`]) or from an account id
//! ([`RequestContext::for_user`]). Nothing is read from ambient state.
//!
//! # Fail closed
//!
//! Predicates never error. Unknown callers, disabled accounts, missing
//! resources and lookup failures are all a plain `false`.

mod actor;
mod authorizer;
mod claims;
mod context;
mod error;
mod gateway;
mod ids;
pub mod password;
mod roles;
mod tokens;

/// Test utilities: in-memory directory and token helpers
pub mod test_utils;

pub use actor::{AccountStatus, Actor};
pub use authorizer::ClinicAuthorizer;
pub use claims::TokenClaims;
pub use context::RequestContext;
pub use error::{AuthError, Result};
pub use gateway::{IdentityProvider, OwnershipGateway};
pub use ids::{ClinicId, JobId, PatientId, ProfileId, SessionId, UserId};
pub use roles::{Policy, Role};
pub use tokens::{IssuedToken, MIN_SECRET_LEN, TokenIssuer};
