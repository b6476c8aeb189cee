//! Platform administration
//!
//! Every operation here is SuperAdmin only.

use chrono::{DateTime, Duration, Utc};
use follix_auth::password::{generate_temporary_password, hash_password};
use follix_auth::{AccountStatus, ClinicId, RequestContext, Role, UserId};
use follix_control::models::{BILLING_PERIOD_DAYS, MAX_PATIENT_NAME_LEN, normalize_email};
use follix_control::{Account, Payment, PaymentStatus, Subscription, SubscriptionStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::billing::check_amount;
use crate::outcome::{Failure, HandlerResult, Outcome, caller, conflict_as, ensure, missing_as, transition_as};
use crate::state::AppState;

const USER_NOT_FOUND: &str = "User not found.";

// =============================================================================
// Request/Response types
// =============================================================================

/// Create user request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
}

/// Created user with its one-time password
#[derive(Debug, Clone, Serialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub clinic_id: Option<ClinicId>,
    pub temporary_password: String,
}

/// Account listing entry
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub clinic_id: Option<ClinicId>,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for UserSummary {
    fn from(a: Account) -> Self {
        Self {
            full_name: a.full_name(),
            id: a.id,
            email: a.email,
            role: a.role,
            clinic_id: a.clinic_id,
            status: a.status,
            created_at: a.created_at,
        }
    }
}

/// Activate or disable an account
#[derive(Debug, Clone, Deserialize)]
pub struct SetUserStatus {
    pub user_id: UserId,
    pub status: AccountStatus,
}

/// Activate a clinic's subscription without payment
#[derive(Debug, Clone, Deserialize)]
pub struct ManualActivation {
    pub clinic_id: ClinicId,
    pub plan_id: String,
}

/// Record an offline payment
#[derive(Debug, Clone, Deserialize)]
pub struct ManualPayment {
    pub subscription_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub reference: Option<String>,
}

// =============================================================================
// Users
// =============================================================================

/// Create an account with a generated temporary password
pub async fn create_user(state: &AppState, ctx: &RequestContext, req: CreateUser) -> Outcome<UserCreated> {
    state.settle(try_create_user(state, ctx, req).await)
}

async fn try_create_user(state: &AppState, ctx: &RequestContext, req: CreateUser) -> HandlerResult<UserCreated> {
    ensure(
        state.authz.is_super_admin(ctx).await,
        ctx,
        "users",
        "Access denied. Only SuperAdmin can create users.",
        "Insufficient permissions for user creation",
    )?;

    let mut errors = Vec::new();
    let email = normalize_email(&req.email);
    if !email.contains('@') {
        errors.push("A valid email address is required.".to_string());
    }
    for (label, value) in [("First name", &req.first_name), ("Last name", &req.last_name)] {
        if value.trim().chars().count() > MAX_PATIENT_NAME_LEN {
            errors.push(format!("{} must not exceed {} characters.", label, MAX_PATIENT_NAME_LEN));
        }
    }
    let role = Role::parse(&req.role);
    match role {
        None => errors.push(format!("Unknown role '{}'.", req.role)),
        Some(r) if r.is_clinic_scoped() && req.clinic_id.is_none() => {
            errors.push("Clinic users must be assigned to a clinic.".to_string())
        }
        Some(Role::SuperAdmin) if req.clinic_id.is_some() => {
            errors.push("SuperAdmin accounts cannot be assigned to a clinic.".to_string())
        }
        Some(_) => {}
    }
    let Some(role) = role.filter(|_| errors.is_empty()) else {
        return Err(Failure::Validation {
            message: "User details are invalid.".to_string(),
            errors,
        });
    };

    if let Some(clinic_id) = req.clinic_id
        && !state.store.clinics().exists(clinic_id).await?
    {
        return Err(Failure::invalid("Specified clinic does not exist.", "Invalid clinic ID"));
    }
    if state.store.users().get_by_email(&email).await?.is_some() {
        return Err(Failure::conflict(
            "User with this email already exists.",
            "Email address is already in use",
        ));
    }

    let temporary_password = generate_temporary_password();
    let hash = hash_password(&temporary_password).map_err(|e| Failure::internal("Password hashing failed", e))?;
    let account = Account::new(
        &email,
        hash,
        req.first_name.trim(),
        req.last_name.trim(),
        role,
        req.clinic_id,
    );
    state
        .store
        .users()
        .create(&account)
        .await
        .map_err(conflict_as("User with this email already exists.", "Email address is already in use"))?;

    info!(user_id = %account.id, role = %role.as_str(), admin_id = %caller(ctx), "User created");
    Ok(Outcome::success(
        "User created successfully. Temporary password has been generated.",
        UserCreated {
            user_id: account.id,
            email: account.email,
            role,
            clinic_id: account.clinic_id,
            temporary_password,
        },
    ))
}

/// All accounts
pub async fn list_users(state: &AppState, ctx: &RequestContext) -> Outcome<Vec<UserSummary>> {
    state.settle(try_list_users(state, ctx).await)
}

async fn try_list_users(state: &AppState, ctx: &RequestContext) -> HandlerResult<Vec<UserSummary>> {
    ensure(
        state.authz.is_super_admin(ctx).await,
        ctx,
        "users",
        "Access denied. Only SuperAdmin can view all users.",
        "Insufficient permissions to view users",
    )?;

    let users = state.store.users().list().await?;
    Ok(Outcome::success(
        "Users retrieved successfully",
        users.into_iter().map(UserSummary::from).collect(),
    ))
}

/// Activate or disable an account
pub async fn set_user_status(state: &AppState, ctx: &RequestContext, req: SetUserStatus) -> Outcome<()> {
    state.settle(try_set_user_status(state, ctx, req).await)
}

async fn try_set_user_status(state: &AppState, ctx: &RequestContext, req: SetUserStatus) -> HandlerResult<()> {
    ensure(
        state.authz.is_super_admin(ctx).await,
        ctx,
        req.user_id,
        "Access denied. Only SuperAdmin can modify user status.",
        "Insufficient permissions to modify users",
    )?;

    if req.status == AccountStatus::Disabled && ctx.user_id() == Some(req.user_id) {
        return Err(Failure::invalid(
            "You cannot deactivate your own account.",
            "Self-deactivation is not allowed",
        ));
    }

    let users = state.store.users();
    let account = users
        .get_by_id(req.user_id)
        .await?
        .ok_or_else(|| Failure::not_found(USER_NOT_FOUND))?;
    users
        .set_status(req.user_id, req.status)
        .await
        .map_err(missing_as(USER_NOT_FOUND))?;

    let verb = match req.status {
        AccountStatus::Active => "activated",
        AccountStatus::Disabled => "deactivated",
    };
    info!(user_id = %req.user_id, status = %req.status.as_str(), admin_id = %caller(ctx), "User status changed");
    Ok(Outcome::done(format!("User {} has been {} successfully.", account.email, verb)))
}

/// Delete an account
pub async fn delete_user(state: &AppState, ctx: &RequestContext, user_id: UserId) -> Outcome<()> {
    state.settle(try_delete_user(state, ctx, user_id).await)
}

async fn try_delete_user(state: &AppState, ctx: &RequestContext, user_id: UserId) -> HandlerResult<()> {
    ensure(
        state.authz.is_super_admin(ctx).await,
        ctx,
        user_id,
        "Access denied. Only SuperAdmin can delete users.",
        "Insufficient permissions to delete users",
    )?;

    if ctx.user_id() == Some(user_id) {
        return Err(Failure::invalid(
            "You cannot delete your own account.",
            "Self-deletion is not allowed",
        ));
    }

    let users = state.store.users();
    let account = users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| Failure::not_found(USER_NOT_FOUND))?;
    users.delete(user_id).await.map_err(missing_as(USER_NOT_FOUND))?;

    info!(user_id = %user_id, admin_id = %caller(ctx), "User deleted");
    Ok(Outcome::done(format!("User {} has been deleted successfully.", account.email)))
}

// =============================================================================
// Billing overrides
// =============================================================================

/// Activate a clinic's subscription without a gateway payment
///
/// Reactivates the clinic's latest pending or past-due subscription when
/// there is one, otherwise starts a new active one.
pub async fn manually_activate_subscription(
    state: &AppState,
    ctx: &RequestContext,
    req: ManualActivation,
) -> Outcome<Subscription> {
    state.settle(try_manually_activate_subscription(state, ctx, req).await)
}

async fn try_manually_activate_subscription(
    state: &AppState,
    ctx: &RequestContext,
    req: ManualActivation,
) -> HandlerResult<Subscription> {
    ensure(
        state.authz.is_super_admin(ctx).await,
        ctx,
        req.clinic_id,
        "Access denied. Only SuperAdmin can manually activate subscriptions.",
        "Insufficient permissions for subscription operations",
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
    if billing.get_plan(&req.plan_id).await?.is_none() {
        return Err(Failure::not_found("Subscription plan not found"));
    }

    let now = Utc::now();
    let resumable = billing.latest_for_clinic(req.clinic_id).await?.filter(|s| {
        s.plan_id == req.plan_id && matches!(s.status, SubscriptionStatus::Pending | SubscriptionStatus::PastDue)
    });

    let subscription = match resumable {
        Some(mut sub) => {
            let expected = sub.status;
            sub.activate(now)
                .map_err(transition_as("Subscription cannot be activated.", "Subscription not found"))?;
            billing
                .save_subscription(&sub, expected)
                .await
                .map_err(transition_as("Subscription cannot be activated.", "Subscription not found"))?;
            sub
        }
        None => {
            let sub = Subscription::active(req.clinic_id, &req.plan_id, now, now + Duration::days(BILLING_PERIOD_DAYS));
            billing.create_subscription(&sub).await?;
            sub
        }
    };

    info!(subscription_id = %subscription.id, clinic_id = %req.clinic_id, admin_id = %caller(ctx), "Subscription manually activated");
    Ok(Outcome::success("Subscription activated successfully", subscription))
}

/// Record a payment made outside the gateway
pub async fn manually_log_payment(state: &AppState, ctx: &RequestContext, req: ManualPayment) -> Outcome<Payment> {
    state.settle(try_manually_log_payment(state, ctx, req).await)
}

async fn try_manually_log_payment(state: &AppState, ctx: &RequestContext, req: ManualPayment) -> HandlerResult<Payment> {
    ensure(
        state.authz.is_super_admin(ctx).await,
        ctx,
        &req.subscription_id,
        "Access denied. Only SuperAdmin can manually log payments.",
        "Insufficient permissions for payment operations",
    )?;

    check_amount(req.amount_cents, &req.currency)?;

    let billing = state.store.billing();
    if billing.get_subscription(&req.subscription_id).await?.is_none() {
        return Err(Failure::not_found("Subscription not found"));
    }

    let payment = Payment::new(&req.subscription_id, req.amount_cents, &req.currency, req.status, req.reference);
    billing.record_payment(&payment).await?;

    info!(payment_id = %payment.id, admin_id = %caller(ctx), "Payment manually logged");
    Ok(Outcome::success("Payment logged successfully", payment))
}
