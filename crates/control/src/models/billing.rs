//! Subscription plans, subscriptions and payments
//!
//! Amounts are integer minor units (cents) with an ISO 4217 currency code.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use follix_auth::ClinicId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ControlError, Result};

/// Length of one billing period
pub const BILLING_PERIOD_DAYS: i64 = 30;

fn prefixed_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

// =============================================================================
// Plans
// =============================================================================

/// Subscription plan offered to clinics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    /// Unique plan ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Monthly price in cents
    pub price_monthly_cents: i64,
    /// ISO 4217 code
    pub currency: String,
    /// Seat limit
    pub max_users: i64,
    /// Monthly analysis limit
    pub max_analyses_per_month: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    /// Create a new plan
    pub fn new(
        name: impl Into<String>,
        price_monthly_cents: i64,
        currency: &str,
        max_users: i64,
        max_analyses_per_month: i64,
    ) -> Self {
        Self {
            id: prefixed_id("plan"),
            name: name.into(),
            price_monthly_cents,
            currency: currency.to_uppercase(),
            max_users,
            max_analyses_per_month,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Awaiting the first payment
    Pending,
    /// Paid up
    Active,
    /// Renewal payment missing
    PastDue,
    /// Ended
    Canceled,
}

impl SubscriptionStatus {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    /// Transition table
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Canceled)
                | (Active, Canceled)
                | (Active, PastDue)
                | (PastDue, Active)
                | (PastDue, Canceled)
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A clinic's subscription to a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique subscription ID
    pub id: String,
    /// Subscribed clinic
    pub clinic_id: ClinicId,
    /// Plan subscribed to
    pub plan_id: String,
    /// Current status
    pub status: SubscriptionStatus,
    /// Checkout reference from the payment provider
    pub gateway_reference: Option<String>,
    /// Start of the paid period
    pub current_period_start: Option<DateTime<Utc>>,
    /// End of the paid period
    pub current_period_end: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a pending subscription; the period starts on payment
    pub fn pending(clinic_id: ClinicId, plan_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: prefixed_id("sub"),
            clinic_id,
            plan_id: plan_id.into(),
            status: SubscriptionStatus::Pending,
            gateway_reference: None,
            current_period_start: None,
            current_period_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an already active subscription over an explicit period
    pub fn active(
        clinic_id: ClinicId,
        plan_id: impl Into<String>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Self {
        let mut sub = Self::pending(clinic_id, plan_id);
        sub.status = SubscriptionStatus::Active;
        sub.current_period_start = Some(period_start);
        sub.current_period_end = Some(period_end);
        sub
    }

    fn advance(&mut self, next: SubscriptionStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ControlError::transition("subscription", self.status.as_str(), next.as_str()));
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// Payment received; starts a fresh billing period at `at`
    pub fn activate(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.advance(SubscriptionStatus::Active, at)?;
        self.current_period_start = Some(at);
        self.current_period_end = Some(at + Duration::days(BILLING_PERIOD_DAYS));
        Ok(())
    }

    /// End the subscription now
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.advance(SubscriptionStatus::Canceled, at)?;
        self.current_period_end = Some(at);
        Ok(())
    }

    /// Renewal payment missed
    pub fn mark_past_due(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.advance(SubscriptionStatus::PastDue, at)
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Not yet settled
    Pending,
    /// Funds captured
    Succeeded,
    /// Declined or errored
    Failed,
}

impl PaymentStatus {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Transition table
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Succeeded) | (Self::Pending, Self::Failed)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded payment against a subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique payment ID
    pub id: String,
    /// Subscription paid for
    pub subscription_id: String,
    /// Amount in cents
    pub amount_cents: i64,
    /// ISO 4217 code
    pub currency: String,
    /// Settlement status
    pub status: PaymentStatus,
    /// Provider transaction reference
    pub gateway_reference: Option<String>,
    /// When the payment was recorded
    pub processed_at: DateTime<Utc>,
}

impl Payment {
    /// Record a payment
    pub fn new(
        subscription_id: impl Into<String>,
        amount_cents: i64,
        currency: &str,
        status: PaymentStatus,
        gateway_reference: Option<String>,
    ) -> Self {
        Self {
            id: prefixed_id("pay"),
            subscription_id: subscription_id.into(),
            amount_cents,
            currency: currency.to_uppercase(),
            status,
            gateway_reference,
            processed_at: Utc::now(),
        }
    }

    /// Settle a pending payment
    pub fn settle(&mut self, next: PaymentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ControlError::transition("payment", self.status.as_str(), next.as_str()));
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_transition_table() {
        use SubscriptionStatus::*;
        let all = [Pending, Active, PastDue, Canceled];
        let allowed = [
            (Pending, Active),
            (Pending, Canceled),
            (Active, Canceled),
            (Active, PastDue),
            (PastDue, Active),
            (PastDue, Canceled),
        ];

        for from in all {
            for to in all {
                assert_eq!(from.can_transition_to(to), allowed.contains(&(from, to)), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_activation_sets_period() {
        let mut sub = Subscription::pending(ClinicId::new(), "plan_basic");
        let now = Utc::now();
        sub.activate(now).unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.current_period_start, Some(now));
        assert_eq!(sub.current_period_end, Some(now + Duration::days(30)));
    }

    #[test]
    fn test_cancel_is_terminal() {
        let mut sub = Subscription::pending(ClinicId::new(), "plan_basic");
        let now = Utc::now();
        sub.cancel(now).unwrap();
        assert_eq!(sub.current_period_end, Some(now));

        assert!(sub.activate(Utc::now()).is_err());
        assert!(sub.cancel(Utc::now()).is_err());
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn test_payment_settles_once() {
        let mut payment = Payment::new("sub_1", 4900, "egp", PaymentStatus::Pending, None);
        assert_eq!(payment.currency, "EGP");

        payment.settle(PaymentStatus::Succeeded).unwrap();
        assert!(payment.settle(PaymentStatus::Failed).is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(SubscriptionStatus::parse("past_due"), Some(SubscriptionStatus::PastDue));
        assert_eq!(SubscriptionStatus::parse("Canceled"), Some(SubscriptionStatus::Canceled));
        assert_eq!(SubscriptionStatus::parse("cancelled"), None);
        assert_eq!(PaymentStatus::parse("SUCCEEDED"), Some(PaymentStatus::Succeeded));
        assert_eq!(PaymentStatus::parse("refunded"), None);
    }
}
