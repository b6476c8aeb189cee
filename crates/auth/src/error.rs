//! Authentication error types

use thiserror::Error;

/// Result type for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during authentication operations
///
/// Authorization predicates never return these; they fold every error into a
/// denial. These surface from token handling, password hashing and the
/// identity/ownership lookups themselves.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Identity or ownership lookup failed
    #[error("gateway error: {0}")]
    Gateway(String),

    // JWT validation errors
    /// Token is missing or empty
    #[error("missing token")]
    MissingToken,

    /// JWT signature verification failed
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token has expired
    #[error("token expired")]
    TokenExpired,

    /// Token is not yet valid (nbf claim)
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// Token claims are invalid
    #[error("invalid token claims: {0}")]
    InvalidClaims(String),

    /// Signing secret too short
    #[error("signing secret must be at least {min} bytes, got {actual}")]
    WeakSecret {
        /// Minimum accepted length
        min: usize,
        /// Supplied length
        actual: usize,
    },

    /// Password hashing or verification failed
    #[error("password error: {0}")]
    Password(String),
}

impl AuthError {
    /// Create a gateway error from any displayable cause
    pub fn gateway(cause: impl std::fmt::Display) -> Self {
        Self::Gateway(cause.to_string())
    }

    /// Create a password error
    pub fn password(message: impl Into<String>) -> Self {
        Self::Password(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error() {
        let err = AuthError::gateway("connection reset");
        assert!(err.to_string().contains("gateway"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_weak_secret() {
        let err = AuthError::WeakSecret { min: 32, actual: 5 };
        assert!(err.to_string().contains("32"));
        assert!(err.to_string().contains('5'));
    }
}
