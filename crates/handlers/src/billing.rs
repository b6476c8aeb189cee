//! Subscription handlers
//!
//! Checkout is opened through the payment gateway; the subscription stays
//! pending until the gateway confirms a payment.

use chrono::Utc;
use follix_auth::{ClinicId, RequestContext};
use follix_control::{Payment, PaymentStatus, Subscription, SubscriptionPlan, SubscriptionStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::outcome::{Failure, HandlerResult, Outcome, caller, ensure, transition_as};
use crate::ports::CheckoutRequest;
use crate::state::AppState;

const SUBSCRIPTION_NOT_FOUND: &str = "Subscription not found";

/// Subscribe request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscription {
    pub clinic_id: ClinicId,
    pub plan_id: String,
}

/// Pending subscription and where to pay for it
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCreated {
    pub subscription: Subscription,
    pub checkout_url: String,
}

/// Cancel request
#[derive(Debug, Clone, Deserialize)]
pub struct CancelSubscription {
    pub clinic_id: ClinicId,
    pub subscription_id: String,
}

/// Payment outcome reported by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfirmation {
    pub subscription_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub succeeded: bool,
    #[serde(default)]
    pub gateway_reference: Option<String>,
}

/// Recorded payment and the subscription after it
#[derive(Debug, Clone, Serialize)]
pub struct PaymentApplied {
    pub payment: Payment,
    pub subscription: Subscription,
}

/// Amount and currency checks shared with manual payment logging
pub(crate) fn check_amount(amount_cents: i64, currency: &str) -> Result<(), Failure> {
    let mut errors = Vec::new();
    if amount_cents <= 0 {
        errors.push("Amount must be greater than zero.".to_string());
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        errors.push("Currency must be a three-letter ISO code.".to_string());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Failure::Validation {
            message: "Payment details are invalid.".to_string(),
            errors,
        })
    }
}

/// Plans on offer
pub async fn list_plans(state: &AppState) -> Outcome<Vec<SubscriptionPlan>> {
    state.settle(try_list_plans(state).await)
}

async fn try_list_plans(state: &AppState) -> HandlerResult<Vec<SubscriptionPlan>> {
    let plans = state.store.billing().list_plans().await?;
    Ok(Outcome::success("Subscription plans retrieved successfully", plans))
}

/// A clinic's current subscription
pub async fn get_subscription(state: &AppState, ctx: &RequestContext, clinic_id: ClinicId) -> Outcome<Subscription> {
    state.settle(try_get_subscription(state, ctx, clinic_id).await)
}

async fn try_get_subscription(state: &AppState, ctx: &RequestContext, clinic_id: ClinicId) -> HandlerResult<Subscription> {
    ensure(
        state.authz.can_access_clinic(ctx, &clinic_id).await,
        ctx,
        clinic_id,
        "Access denied. You cannot access subscriptions for this clinic.",
        "Unauthorized clinic access",
    )?;

    let billing = state.store.billing();
    let subscription = match billing.active_for_clinic(clinic_id).await? {
        Some(active) => active,
        None => billing
            .latest_for_clinic(clinic_id)
            .await?
            .ok_or_else(|| Failure::not_found("Subscription not found for this clinic"))?,
    };

    Ok(Outcome::success("Subscription retrieved successfully", subscription))
}

/// Start a subscription and open its checkout
pub async fn create_subscription(
    state: &AppState,
    ctx: &RequestContext,
    req: CreateSubscription,
) -> Outcome<SubscriptionCreated> {
    state.settle(try_create_subscription(state, ctx, req).await)
}

async fn try_create_subscription(
    state: &AppState,
    ctx: &RequestContext,
    req: CreateSubscription,
) -> HandlerResult<SubscriptionCreated> {
    ensure(
        state.authz.can_access_clinic(ctx, &req.clinic_id).await,
        ctx,
        req.clinic_id,
        "Access denied. You cannot create subscriptions for this clinic.",
        "Unauthorized clinic access",
    )?;

    if !state.store.clinics().exists(req.clinic_id).await? {
        return Err(Failure::not_found("Clinic not found"));
    }

    let billing = state.store.billing();
    if billing.active_for_clinic(req.clinic_id).await?.is_some() {
        return Err(Failure::invalid(
            "Clinic already has an active subscription",
            "Active subscription already exists",
        ));
    }
    let plan = billing
        .get_plan(&req.plan_id)
        .await?
        .ok_or_else(|| Failure::not_found("Subscription plan not found"))?;

    let mut subscription = Subscription::pending(req.clinic_id, &plan.id);
    let checkout = state
        .collaborators
        .payments
        .create_checkout(&CheckoutRequest {
            subscription_id: subscription.id.clone(),
            clinic_id: req.clinic_id,
            amount_cents: plan.price_monthly_cents,
            currency: plan.currency.clone(),
        })
        .await
        .map_err(|e| Failure::unavailable("Failed to create payment session", "Payment gateway error", e))?;

    subscription.gateway_reference = Some(checkout.reference);
    billing.create_subscription(&subscription).await?;

    info!(
        subscription_id = %subscription.id,
        clinic_id = %req.clinic_id,
        plan_id = %plan.id,
        user_id = %caller(ctx),
        "Subscription created"
    );
    Ok(Outcome::success(
        "Subscription created successfully. Complete payment to activate.",
        SubscriptionCreated {
            subscription,
            checkout_url: checkout.checkout_url,
        },
    ))
}

/// Cancel a clinic's subscription now
pub async fn cancel_subscription(state: &AppState, ctx: &RequestContext, req: CancelSubscription) -> Outcome<Subscription> {
    state.settle(try_cancel_subscription(state, ctx, req).await)
}

async fn try_cancel_subscription(
    state: &AppState,
    ctx: &RequestContext,
    req: CancelSubscription,
) -> HandlerResult<Subscription> {
    ensure(
        state.authz.can_access_clinic(ctx, &req.clinic_id).await,
        ctx,
        req.clinic_id,
        "Access denied. You cannot cancel subscriptions for this clinic.",
        "Unauthorized clinic access",
    )?;

    let billing = state.store.billing();
    let mut subscription = billing
        .get_subscription(&req.subscription_id)
        .await?
        .filter(|s| s.clinic_id == req.clinic_id)
        .ok_or_else(|| Failure::not_found(SUBSCRIPTION_NOT_FOUND))?;

    let expected = subscription.status;
    subscription
        .cancel(Utc::now())
        .map_err(transition_as("Subscription cannot be canceled in its current status.", SUBSCRIPTION_NOT_FOUND))?;
    billing
        .save_subscription(&subscription, expected)
        .await
        .map_err(transition_as("Subscription cannot be canceled in its current status.", SUBSCRIPTION_NOT_FOUND))?;

    info!(subscription_id = %subscription.id, user_id = %caller(ctx), "Subscription canceled");
    Ok(Outcome::success("Subscription canceled successfully", subscription))
}

/// Apply a payment reported by the gateway
///
/// A successful payment activates a pending or past-due subscription for a
/// fresh period. A failed one moves an active subscription to past due.
/// The payment is recorded either way.
pub async fn apply_payment_confirmation(state: &AppState, req: PaymentConfirmation) -> Outcome<PaymentApplied> {
    state.settle(try_apply_payment_confirmation(state, req).await)
}

async fn try_apply_payment_confirmation(state: &AppState, req: PaymentConfirmation) -> HandlerResult<PaymentApplied> {
    check_amount(req.amount_cents, &req.currency)?;

    let billing = state.store.billing();
    let mut subscription = billing
        .get_subscription(&req.subscription_id)
        .await?
        .ok_or_else(|| Failure::not_found(SUBSCRIPTION_NOT_FOUND))?;

    let status = if req.succeeded {
        PaymentStatus::Succeeded
    } else {
        PaymentStatus::Failed
    };
    let payment = Payment::new(&subscription.id, req.amount_cents, &req.currency, status, req.gateway_reference);

    let expected = subscription.status;
    let now = Utc::now();
    let changed = match (status, expected) {
        (PaymentStatus::Succeeded, SubscriptionStatus::Pending | SubscriptionStatus::PastDue) => {
            subscription.activate(now).map(|_| true)
        }
        (PaymentStatus::Failed, SubscriptionStatus::Active) => subscription.mark_past_due(now).map(|_| true),
        _ => Ok(false),
    }
    .map_err(transition_as("Payment cannot be applied to this subscription.", SUBSCRIPTION_NOT_FOUND))?;

    if changed {
        billing
            .record_payment_for(&payment, &subscription, expected)
            .await
            .map_err(transition_as("Payment cannot be applied to this subscription.", SUBSCRIPTION_NOT_FOUND))?;
    } else {
        billing.record_payment(&payment).await?;
    }

    if status == PaymentStatus::Failed {
        warn!(subscription_id = %subscription.id, payment_id = %payment.id, "Payment failed");
    }
    Ok(Outcome::success(
        "Payment recorded successfully",
        PaymentApplied { payment, subscription },
    ))
}
