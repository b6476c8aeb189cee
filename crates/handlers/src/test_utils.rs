//! Recording fakes for the collaborator traits
//!
//! Each fake records what it was asked to do and can be switched to fail,
//! so tests drive the real handler code paths without external services.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use follix_auth::JobId;
use follix_control::ClinicInvitation;

use crate::ports::{
    CheckoutRequest, CheckoutSession, CollaboratorError, InvitationNotifier, JobQueue, PaymentGateway,
};
use crate::state::Collaborators;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Payment gateway that hands out predictable checkout sessions
#[derive(Default)]
pub struct FakePaymentGateway {
    fail: AtomicBool,
    requests: Mutex<Vec<CheckoutRequest>>,
}

impl FakePaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Checkout requests received so far
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("payments", "gateway unreachable"));
        }
        lock(&self.requests).push(request.clone());
        Ok(CheckoutSession {
            reference: format!("cs_{}", request.subscription_id),
            checkout_url: format!("https://pay.test/checkout/{}", request.subscription_id),
        })
    }
}

/// Notifier that keeps every sent accept link
#[derive(Default)]
pub struct RecordingNotifier {
    fail: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// `(email, accept_link)` pairs sent so far
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl InvitationNotifier for RecordingNotifier {
    async fn send_invitation(&self, invitation: &ClinicInvitation, accept_link: &str) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("email", "smtp unavailable"));
        }
        lock(&self.sent).push((invitation.email.clone(), accept_link.to_string()));
        Ok(())
    }
}

/// Queue that records enqueued job ids
#[derive(Default)]
pub struct RecordingQueue {
    fail: AtomicBool,
    jobs: Mutex<Vec<JobId>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Job ids published so far
    pub fn jobs(&self) -> Vec<JobId> {
        lock(&self.jobs).clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job_id: JobId) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("queue", "broker unavailable"));
        }
        lock(&self.jobs).push(job_id);
        Ok(())
    }
}

/// The three fakes, kept so tests can inspect them after wiring
#[derive(Clone, Default)]
pub struct Fakes {
    pub payments: Arc<FakePaymentGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub queue: Arc<RecordingQueue>,
}

impl Fakes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborators backed by these fakes
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            payments: self.payments.clone(),
            notifier: self.notifier.clone(),
            queue: self.queue.clone(),
        }
    }
}
