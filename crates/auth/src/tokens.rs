//! Bearer token issuing and verification
//!
//! HS256 JWTs carrying the actor's id, roles and home clinic. A verified
//! token yields a [`RequestContext`] bound to that account and clinic; the
//! account itself is still resolved once per request.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use crate::actor::Actor;
use crate::claims::TokenClaims;
use crate::context::RequestContext;
use crate::error::{AuthError, Result};

/// Minimum signing secret length for HS256
pub const MIN_SECRET_LEN: usize = 32;

/// A freshly issued token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Encoded JWT
    pub token: String,
    /// Expiry (Unix timestamp)
    pub expires_at: i64,
}

/// Issues and verifies bearer tokens
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    issuer: Option<String>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl TokenIssuer {
    /// Create a token issuer
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WeakSecret`] if the secret is shorter than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: &[u8], ttl: Duration, issuer: Option<String>) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::WeakSecret {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.required_spec_claims.clear();

        if let Some(ref issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            issuer,
        })
    }

    /// Issue a token for an actor
    pub fn issue(&self, actor: &Actor) -> Result<IssuedToken> {
        let now = chrono::Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let expires_at = (now + ttl).timestamp();

        let claims = TokenClaims {
            subject: actor.id.to_string(),
            email: actor.email.clone(),
            roles: actor.roles.iter().map(|r| r.as_str().to_string()).collect(),
            clinic_id: actor.clinic_id.map(|c| c.to_string()),
            expires_at,
            issued_at: now.timestamp(),
            not_before: Some(now.timestamp()),
            issuer: self.issuer.clone(),
            jwt_id: Some(uuid::Uuid::new_v4().to_string()),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidClaims(format!("failed to encode JWT: {}", e)))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let jwt = token.trim().trim_start_matches("Bearer ").trim();
        if jwt.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<TokenClaims>(jwt, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("JWT validation failed: {:?}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidClaims(e.to_string()),
            }
        })?;

        Ok(data.claims)
    }

    /// Verify a token and build the request context for its bearer
    pub fn context_for(&self, token: &str) -> Result<RequestContext> {
        let actor = self.verify(token)?.to_actor()?;
        Ok(RequestContext::from_claims(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ClinicId, UserId};
    use crate::roles::Role;
    use crate::test_utils::{InMemoryDirectory, TEST_SECRET, test_issuer};

    #[test]
    fn test_weak_secret_rejected() {
        let err = TokenIssuer::new(b"short", Duration::from_secs(60), None).unwrap_err();
        assert!(matches!(err, AuthError::WeakSecret { actual: 5, .. }));
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = test_issuer();
        let clinic = ClinicId::new();
        let actor = Actor::new(UserId::new(), "admin@clinic.test", Role::ClinicAdmin, Some(clinic));

        let issued = issuer.issue(&actor).unwrap();
        let claims = issuer.verify(&issued.token).unwrap();

        assert_eq!(claims.subject, actor.id.to_string());
        assert_eq!(claims.roles, vec!["clinic_admin".to_string()]);
        assert_eq!(claims.clinic_id, Some(clinic.to_string()));
        assert_eq!(claims.expires_at, issued.expires_at);
        assert_eq!(claims.issuer.as_deref(), Some("follix-test"));
    }

    #[test]
    fn test_bearer_prefix_accepted() {
        let issuer = test_issuer();
        let actor = Actor::new(UserId::new(), "root@follix.test", Role::SuperAdmin, None);
        let issued = issuer.issue(&actor).unwrap();

        assert!(issuer.verify(&format!("Bearer {}", issued.token)).is_ok());
        assert!(matches!(issuer.verify("  "), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_wrong_secret() {
        let actor = Actor::new(UserId::new(), "root@follix.test", Role::SuperAdmin, None);
        let other =
            TokenIssuer::new(b"another-secret-that-is-32-bytes!", Duration::from_secs(60), Some("follix-test".into()))
                .unwrap();
        let token = other.issue(&actor).unwrap().token;

        assert!(matches!(test_issuer().verify(&token), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_wrong_issuer() {
        let actor = Actor::new(UserId::new(), "root@follix.test", Role::SuperAdmin, None);
        let other = TokenIssuer::new(TEST_SECRET, Duration::from_secs(60), Some("elsewhere".into())).unwrap();
        let token = other.issue(&actor).unwrap().token;

        assert!(test_issuer().verify(&token).is_err());
    }

    #[tokio::test]
    async fn test_context_from_token() {
        let issuer = test_issuer();
        let dir = InMemoryDirectory::new();
        let clinic = ClinicId::new();
        let actor = dir.add_actor(Role::Doctor, Some(clinic));

        let token = issuer.issue(&actor).unwrap().token;
        let ctx = issuer.context_for(&token).unwrap();

        let resolved = ctx.actor(&dir).await.unwrap();
        assert_eq!(resolved.id, actor.id);
        assert_eq!(resolved.clinic_id, Some(clinic));
        assert_eq!(dir.identity_lookups(), 1);
    }
}
