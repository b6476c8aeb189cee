//! Per-request authorization context
//!
//! A `RequestContext` is built once per inbound request and passed by
//! reference into every authorizer call. It names the caller and caches the
//! resolved [`Actor`] for the lifetime of the request only.
//!
//! Token contexts still resolve the account once per request, so disabling
//! or deleting an account takes effect on tokens already issued.

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::actor::Actor;
use crate::gateway::IdentityProvider;
use crate::ids::{ClinicId, UserId};

#[derive(Debug, Clone, Copy)]
enum Subject {
    /// No credentials were presented
    Anonymous,
    /// Account id known, actor resolved lazily through the identity provider
    Account(UserId),
    /// Verified token claims; the account must still exist, be active and
    /// keep the clinic binding the token was issued for
    Claims { id: UserId, clinic_id: Option<ClinicId> },
}

/// Caller identity for one request
#[derive(Debug)]
pub struct RequestContext {
    subject: Subject,
    actor: OnceCell<Option<Actor>>,
}

impl RequestContext {
    /// Context for an unauthenticated caller
    ///
    /// Every predicate evaluated against it returns false.
    pub fn anonymous() -> Self {
        Self {
            subject: Subject::Anonymous,
            actor: OnceCell::new_with(Some(None)),
        }
    }

    /// Context for an explicit account id
    ///
    /// The actor is looked up on first use and cached.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            subject: Subject::Account(user_id),
            actor: OnceCell::new(),
        }
    }

    /// Context for an actor taken from verified token claims
    ///
    /// Claims that are already inactive resolve to nothing without a lookup.
    pub fn from_claims(actor: Actor) -> Self {
        let subject = Subject::Claims {
            id: actor.id,
            clinic_id: actor.clinic_id,
        };
        let actor = if actor.is_active() {
            OnceCell::new()
        } else {
            OnceCell::new_with(Some(None))
        };
        Self { subject, actor }
    }

    /// Account id of the caller, if any
    pub fn user_id(&self) -> Option<UserId> {
        match self.subject {
            Subject::Anonymous => None,
            Subject::Account(id) | Subject::Claims { id, .. } => Some(id),
        }
    }

    /// Whether no credentials were presented
    pub fn is_anonymous(&self) -> bool {
        matches!(self.subject, Subject::Anonymous)
    }

    /// Resolve the caller
    ///
    /// Returns None for anonymous callers, unknown accounts, disabled
    /// accounts and lookup failures.
    pub async fn actor(&self, identity: &dyn IdentityProvider) -> Option<&Actor> {
        self.actor
            .get_or_init(|| async {
                let (user_id, bound) = match self.subject {
                    Subject::Anonymous => return None,
                    Subject::Account(id) => (id, None),
                    Subject::Claims { id, clinic_id } => (id, Some(clinic_id)),
                };

                match identity.resolve_actor(&user_id).await {
                    Ok(Some(actor)) if bound.is_some_and(|clinic| clinic != actor.clinic_id) => {
                        debug!(user_id = %user_id, "Token clinic binding no longer matches the account");
                        None
                    }
                    Ok(Some(actor)) if actor.is_active() => Some(actor),
                    Ok(Some(_)) => {
                        debug!(user_id = %user_id, "Account disabled, treating as unauthenticated");
                        None
                    }
                    Ok(None) => {
                        debug!(user_id = %user_id, "Account not found");
                        None
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Actor resolution failed");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::actor::AccountStatus;
    use crate::ids::ClinicId;
    use crate::roles::Role;
    use crate::test_utils::InMemoryDirectory;

    #[tokio::test]
    async fn test_anonymous_has_no_actor() {
        let dir = InMemoryDirectory::new();
        let ctx = RequestContext::anonymous();

        assert!(ctx.is_anonymous());
        assert!(ctx.user_id().is_none());
        assert!(ctx.actor(&dir).await.is_none());
    }

    #[tokio::test]
    async fn test_lazy_resolution_is_cached() {
        let dir = Arc::new(InMemoryDirectory::new());
        let clinic = ClinicId::new();
        let actor = dir.add_actor(Role::Doctor, Some(clinic));

        let ctx = RequestContext::for_user(actor.id);
        assert_eq!(ctx.actor(dir.as_ref()).await.map(|a| a.id), Some(actor.id));
        assert_eq!(dir.identity_lookups(), 1);

        // Second call is served from the per-request cache
        assert!(ctx.actor(dir.as_ref()).await.is_some());
        assert_eq!(dir.identity_lookups(), 1);

        // A new request resolves again
        let next = RequestContext::for_user(actor.id);
        assert!(next.actor(dir.as_ref()).await.is_some());
        assert_eq!(dir.identity_lookups(), 2);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let dir = InMemoryDirectory::new();
        let ctx = RequestContext::for_user(UserId::new());
        assert!(ctx.actor(&dir).await.is_none());
        assert!(!ctx.is_anonymous());
    }

    #[tokio::test]
    async fn test_disabled_account_fails_closed() {
        let dir = InMemoryDirectory::new();
        let actor = dir.add_actor(Role::SuperAdmin, None);
        dir.set_status(&actor.id, AccountStatus::Disabled);

        let ctx = RequestContext::for_user(actor.id);
        assert!(ctx.actor(&dir).await.is_none());
    }

    #[tokio::test]
    async fn test_identity_failure_fails_closed() {
        let dir = InMemoryDirectory::new();
        let actor = dir.add_actor(Role::ClinicAdmin, Some(ClinicId::new()));
        dir.fail_lookups(true);

        let ctx = RequestContext::for_user(actor.id);
        assert!(ctx.actor(&dir).await.is_none());
    }

    #[tokio::test]
    async fn test_claims_context_resolves_account_once() {
        let dir = InMemoryDirectory::new();
        let actor = dir.add_actor(Role::Doctor, Some(ClinicId::new()));

        let ctx = RequestContext::from_claims(actor.clone());
        assert_eq!(ctx.user_id(), Some(actor.id));
        assert_eq!(ctx.actor(&dir).await, Some(&actor));
        assert!(ctx.actor(&dir).await.is_some());
        assert_eq!(dir.identity_lookups(), 1);
    }

    #[tokio::test]
    async fn test_claims_for_disabled_account_fail_closed() {
        let dir = InMemoryDirectory::new();
        let actor = dir.add_actor(Role::Doctor, Some(ClinicId::new()));
        dir.set_status(&actor.id, AccountStatus::Disabled);

        let ctx = RequestContext::from_claims(actor);
        assert!(ctx.actor(&dir).await.is_none());
    }

    #[tokio::test]
    async fn test_claims_for_unknown_account_fail_closed() {
        let dir = InMemoryDirectory::new();
        let actor = Actor::new(UserId::new(), "gone@clinic.test", Role::Doctor, Some(ClinicId::new()));

        let ctx = RequestContext::from_claims(actor);
        assert!(ctx.actor(&dir).await.is_none());
        assert_eq!(dir.identity_lookups(), 1);
    }

    #[tokio::test]
    async fn test_claims_with_stale_clinic_fail_closed() {
        let dir = InMemoryDirectory::new();
        let mut actor = dir.add_actor(Role::Doctor, Some(ClinicId::new()));
        actor.clinic_id = Some(ClinicId::new());

        let ctx = RequestContext::from_claims(actor);
        assert!(ctx.actor(&dir).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_claims_fail_closed() {
        let dir = InMemoryDirectory::new();
        let mut actor = Actor::new(UserId::new(), "doc@clinic.test", Role::Doctor, None);
        actor.status = AccountStatus::Disabled;

        let ctx = RequestContext::from_claims(actor);
        assert!(ctx.actor(&dir).await.is_none());
        assert_eq!(dir.identity_lookups(), 0);
    }
}
