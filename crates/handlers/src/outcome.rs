//! Structured handler results
//!
//! Every handler returns an [`Outcome`]; nothing escapes as an error. Inside a
//! handler the failure path is a [`Failure`], converted once at the boundary
//! by [`crate::AppState::settle`].

use std::fmt;

use follix_auth::RequestContext;
use follix_control::ControlError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::ports::CollaboratorError;

/// Generic text shown for persistence failures
pub const DATABASE_ERROR: &str = "Database error";

/// Generic text shown for unexpected internal failures
pub const INTERNAL_ERROR: &str = "An unexpected error occurred.";

/// Category of a failed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Credentials missing or wrong
    Unauthenticated,
    /// Authorization denied
    Denied,
    /// Resource missing after authorization passed
    NotFound,
    /// Input or state rule violated
    Validation,
    /// Uniqueness violated
    Conflict,
    /// External collaborator failed
    Unavailable,
    /// Persistence failed
    Database,
    /// Anything else
    Internal,
}

/// Success/failure envelope returned by every handler
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Machine-readable error tokens, empty on success
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Failure category, absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Result data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> Outcome<T> {
    /// Successful outcome carrying data
    pub fn success(message: impl Into<String>, payload: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            errors: Vec::new(),
            kind: None,
            payload: Some(payload),
        }
    }

    /// Failed outcome
    pub fn failure(kind: FailureKind, message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors,
            kind: Some(kind),
            payload: None,
        }
    }

    /// Whether this is a failure of `kind`
    pub fn is(&self, kind: FailureKind) -> bool {
        self.kind == Some(kind)
    }
}

impl Outcome<()> {
    /// Successful outcome without data
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            errors: Vec::new(),
            kind: None,
            payload: None,
        }
    }
}

/// Why a handler stopped
#[derive(Debug, Error)]
pub enum Failure {
    /// Bad or missing credentials
    #[error("{message}")]
    Unauthenticated { message: &'static str },

    /// Authorization check failed
    #[error("{message}")]
    Denied {
        message: &'static str,
        reason: &'static str,
    },

    /// Resource missing
    #[error("{message}")]
    NotFound { message: &'static str },

    /// Rule violated
    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    /// Uniqueness violated
    #[error("{message}")]
    Conflict {
        message: &'static str,
        reason: &'static str,
    },

    /// Payment gateway, notifier or queue failed
    #[error("{message}")]
    Unavailable {
        message: &'static str,
        reason: &'static str,
        #[source]
        source: CollaboratorError,
    },

    /// Persistence failed
    #[error("database error: {0}")]
    Database(#[from] ControlError),

    /// Unexpected internal failure
    #[error("{context}: {detail}")]
    Internal { context: &'static str, detail: String },
}

impl Failure {
    pub fn denied(message: &'static str, reason: &'static str) -> Self {
        Self::Denied { message, reason }
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::NotFound { message }
    }

    /// Validation failure with a single error token
    pub fn invalid(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors: vec![reason.into()],
        }
    }

    /// Validation failure where the message doubles as the error token
    pub fn rule(message: &'static str) -> Self {
        Self::invalid(message, message)
    }

    pub fn conflict(message: &'static str, reason: &'static str) -> Self {
        Self::Conflict { message, reason }
    }

    pub fn unavailable(message: &'static str, reason: &'static str, source: CollaboratorError) -> Self {
        Self::Unavailable {
            message,
            reason,
            source,
        }
    }

    pub fn internal(context: &'static str, detail: impl fmt::Display) -> Self {
        Self::Internal {
            context,
            detail: detail.to_string(),
        }
    }

    /// Failure category
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unauthenticated { .. } => FailureKind::Unauthenticated,
            Self::Denied { .. } => FailureKind::Denied,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Validation { .. } => FailureKind::Validation,
            Self::Conflict { .. } => FailureKind::Conflict,
            Self::Unavailable { .. } => FailureKind::Unavailable,
            Self::Database(_) => FailureKind::Database,
            Self::Internal { .. } => FailureKind::Internal,
        }
    }

    /// Convert to the envelope
    ///
    /// Server-side detail is logged in full and only copied into `errors`
    /// when `development` is set.
    pub fn into_outcome<T>(self, development: bool) -> Outcome<T> {
        let kind = self.kind();
        match self {
            Self::Unauthenticated { message } => Outcome::failure(kind, message, vec![message.to_string()]),
            Self::Denied { message, reason } => Outcome::failure(kind, message, vec![reason.to_string()]),
            Self::NotFound { message } => Outcome::failure(kind, message, vec![message.to_string()]),
            Self::Validation { message, errors } => Outcome::failure(kind, message, errors),
            Self::Conflict { message, reason } => Outcome::failure(kind, message, vec![reason.to_string()]),
            Self::Unavailable {
                message,
                reason,
                source,
            } => {
                error!(error = %source, reason, "Collaborator failure");
                let mut errors = vec![reason.to_string()];
                if development {
                    errors.push(source.to_string());
                }
                Outcome::failure(kind, message, errors)
            }
            Self::Database(e) => {
                error!(error = %e, "Database failure");
                let mut errors = vec![DATABASE_ERROR.to_string()];
                if development {
                    errors.push(e.to_string());
                }
                Outcome::failure(kind, DATABASE_ERROR, errors)
            }
            Self::Internal { context, detail } => {
                error!(context, detail = %detail, "Internal failure");
                let mut errors = vec![context.to_string()];
                if development {
                    errors.push(detail);
                }
                Outcome::failure(kind, INTERNAL_ERROR, errors)
            }
        }
    }
}

/// Handler-internal result
pub type HandlerResult<T> = std::result::Result<Outcome<T>, Failure>;

// =============================================================================
// Helpers
// =============================================================================

/// Caller id for log fields
pub(crate) fn caller(ctx: &RequestContext) -> String {
    ctx.user_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Turn a denied predicate into a logged [`Failure::Denied`]
pub(crate) fn ensure(
    allowed: bool,
    ctx: &RequestContext,
    resource: impl fmt::Display,
    message: &'static str,
    reason: &'static str,
) -> Result<(), Failure> {
    if allowed {
        return Ok(());
    }
    warn!(user_id = %caller(ctx), resource = %resource, reason, "Access denied");
    Err(Failure::denied(message, reason))
}

/// Map `NotFound` to a handler message, everything else to a database failure
pub(crate) fn missing_as(message: &'static str) -> impl FnOnce(ControlError) -> Failure {
    move |e| match e {
        ControlError::NotFound { .. } => Failure::not_found(message),
        other => Failure::Database(other),
    }
}

/// Map `AlreadyExists` to a conflict, everything else to a database failure
pub(crate) fn conflict_as(message: &'static str, reason: &'static str) -> impl FnOnce(ControlError) -> Failure {
    move |e| {
        if e.is_conflict() {
            Failure::conflict(message, reason)
        } else {
            Failure::Database(e)
        }
    }
}

/// Map `InvalidTransition` to a validation failure, everything else through
/// [`missing_as`]
pub(crate) fn transition_as(
    message: &'static str,
    missing: &'static str,
) -> impl FnOnce(ControlError) -> Failure {
    move |e| match e {
        ControlError::InvalidTransition { .. } => Failure::invalid(message, e.to_string()),
        other => missing_as(missing)(other),
    }
}

/// Truncate to at most `max` characters
pub(crate) fn clip(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
