//! External collaborators
//!
//! Payment checkout, invitation email and the analysis work queue live
//! outside this crate. Handlers talk to them through these traits.

use async_trait::async_trait;
use follix_auth::{ClinicId, JobId};
use follix_control::ClinicInvitation;
use thiserror::Error;

/// Failure reported by a collaborator
#[derive(Debug, Error)]
#[error("{service}: {message}")]
pub struct CollaboratorError {
    /// Collaborator name
    pub service: &'static str,
    /// What went wrong
    pub message: String,
}

impl CollaboratorError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

/// What the gateway needs to open a checkout
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Subscription being paid for
    pub subscription_id: String,
    /// Paying clinic
    pub clinic_id: ClinicId,
    /// Amount in minor units
    pub amount_cents: i64,
    /// ISO currency code
    pub currency: String,
}

/// Opened checkout
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    /// Gateway-side reference, stored on the subscription
    pub reference: String,
    /// Where the payer completes the payment
    pub checkout_url: String,
}

/// Payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a checkout session
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, CollaboratorError>;
}

/// Invitation email delivery
#[async_trait]
pub trait InvitationNotifier: Send + Sync {
    /// Send the accept link to the invitee
    async fn send_invitation(
        &self,
        invitation: &ClinicInvitation,
        accept_link: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Analysis work queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish a pending job for the image worker
    async fn enqueue(&self, job_id: JobId) -> Result<(), CollaboratorError>;
}
