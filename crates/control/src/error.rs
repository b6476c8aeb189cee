//! Persistence error types

use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum ControlError {
    /// Database connection or statement error
    #[error("database error: {0}")]
    Database(#[from] turso::Error),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Entity already exists (unique constraint)
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Invalid data
    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    /// Status change outside the transition table
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// JSON serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ControlError {
    /// Create a not found error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create an already exists error
    pub fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }

    /// Create an invalid transition error
    pub fn transition(entity: &'static str, from: &'static str, to: &'static str) -> Self {
        Self::InvalidTransition { entity, from, to }
    }

    /// Whether this is a unique-constraint conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Map a UNIQUE violation to `AlreadyExists`, pass everything else through
pub(crate) fn unique_or(entity: &'static str, id: impl Into<String>) -> impl FnOnce(turso::Error) -> ControlError {
    let id = id.into();
    move |e| {
        if e.to_string().contains("UNIQUE constraint") {
            ControlError::already_exists(entity, id)
        } else {
            ControlError::Database(e)
        }
    }
}

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            ControlError::not_found("patient", "p-1").to_string(),
            "patient not found: p-1"
        );
        assert_eq!(
            ControlError::transition("analysis job", "completed", "processing").to_string(),
            "analysis job cannot move from completed to processing"
        );
        assert!(ControlError::already_exists("user", "a@b.c").is_conflict());
        assert!(!ControlError::invalid("email", "empty").is_conflict());
    }
}
