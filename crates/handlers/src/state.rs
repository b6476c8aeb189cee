//! Application state
//!
//! Shared state for handlers: the store, the authorizer built over it, token
//! signing and the external collaborators.

use std::sync::Arc;

use follix_auth::{ClinicAuthorizer, RequestContext, TokenIssuer, UserId};
use follix_config::{Config, InvitationConfig};
use follix_control::Store;
use tracing::debug;

use crate::outcome::{Failure, HandlerResult, Outcome};
use crate::ports::{InvitationNotifier, JobQueue, PaymentGateway};

/// Handler settings taken from configuration
#[derive(Debug, Clone, Default)]
pub struct HandlerSettings {
    /// Invitation lifetime and accept link base
    pub invitations: InvitationConfig,
    /// Copy internal failure detail into outcomes
    pub development: bool,
}

impl HandlerSettings {
    /// Settings from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            invitations: config.invitations.clone(),
            development: config.app.is_development(),
        }
    }

    /// Invitation lifetime
    pub fn invitation_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.invitations.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(follix_control::models::DEFAULT_INVITATION_TTL_DAYS))
    }
}

/// External collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn InvitationNotifier>,
    pub queue: Arc<dyn JobQueue>,
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Persistence
    pub store: Arc<Store>,
    /// Clinic-scoped authorization over `store`
    pub authz: ClinicAuthorizer,
    /// Bearer token signing
    pub tokens: Arc<TokenIssuer>,
    /// Payment, email and queue
    pub collaborators: Collaborators,
    /// Settings
    pub settings: HandlerSettings,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tokens", &self.tokens)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        tokens: TokenIssuer,
        collaborators: Collaborators,
        settings: HandlerSettings,
    ) -> Self {
        let authz = ClinicAuthorizer::new(store.clone(), store.clone());
        Self {
            store,
            authz,
            tokens: Arc::new(tokens),
            collaborators,
            settings,
        }
    }

    /// Build the request context for an optional bearer token
    ///
    /// Missing or invalid tokens give an anonymous context.
    pub fn context_for(&self, bearer: Option<&str>) -> RequestContext {
        let Some(token) = bearer else {
            return RequestContext::anonymous();
        };
        match self.tokens.context_for(token) {
            Ok(ctx) => ctx,
            Err(e) => {
                debug!(error = %e, "Rejected bearer token");
                RequestContext::anonymous()
            }
        }
    }

    /// Id of the resolved caller
    ///
    /// Only reached after an authorization predicate passed, which already
    /// required an actor.
    pub(crate) async fn acting_user(&self, ctx: &RequestContext) -> Result<UserId, Failure> {
        self.authz
            .actor(ctx)
            .await
            .map(|a| a.id)
            .ok_or_else(|| Failure::denied("Access denied. Authentication required.", "Unauthenticated"))
    }

    /// Collapse a handler result into its outcome
    pub(crate) fn settle<T>(&self, result: HandlerResult<T>) -> Outcome<T> {
        result.unwrap_or_else(|failure| failure.into_outcome(self.settings.development))
    }
}
