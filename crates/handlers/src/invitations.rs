//! Clinic invitation handlers
//!
//! An invitation binds an email address to a clinic and a clinic-scoped role.
//! The token is the credential for reading, accepting and registering, so
//! those operations take no authorization predicate. Expiry is detected
//! lazily: a pending invitation past its expiry is marked expired the first
//! time it is read or accepted.

use chrono::{DateTime, Utc};
use follix_auth::password::{check_policy, hash_password};
use follix_auth::{ClinicId, Policy, RequestContext, Role, UserId};
use follix_control::models::{MAX_PATIENT_NAME_LEN, is_well_formed_token, normalize_email};
use follix_control::{Account, ClinicInvitation, InvitationStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::outcome::{Failure, HandlerResult, Outcome, caller, conflict_as, ensure};
use crate::state::AppState;

const NOT_VALID: &str = "Invitation not found or no longer valid";
const DUPLICATE_EMAIL: &str = "User with this email already exists.";
const DUPLICATE_EMAIL_REASON: &str = "Email address is already in use";

// =============================================================================
// Request/Response types
// =============================================================================

/// Invite request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvitation {
    pub clinic_id: ClinicId,
    pub email: String,
    pub role: String,
}

/// Created invitation
#[derive(Debug, Clone, Serialize)]
pub struct InvitationCreated {
    pub invitation_id: String,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub accept_link: String,
    pub expires_at: DateTime<Utc>,
}

/// Invitation as shown to the invitee
#[derive(Debug, Clone, Serialize)]
pub struct InvitationView {
    pub invitation_id: String,
    pub clinic_id: ClinicId,
    pub clinic_name: Option<String>,
    pub email: String,
    pub role: Role,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
}

/// Sign-up through an invitation
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterWithInvitation {
    pub token: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Clinic the client believes it joins; must match the invitation
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
}

/// Registered account
#[derive(Debug, Clone, Serialize)]
pub struct Registered {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub clinic_id: Option<ClinicId>,
}

// =============================================================================
// Helpers
// =============================================================================

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Expire `invitation` in place if it is pending and past its expiry
async fn expire_if_due(state: &AppState, invitation: &mut ClinicInvitation, now: DateTime<Utc>) -> Result<bool, Failure> {
    if invitation.status != InvitationStatus::Pending || !invitation.is_expired_at(now) {
        return Ok(false);
    }
    match state.store.invitations().mark_expired(&invitation.id).await {
        Ok(()) => debug!(invitation_id = %invitation.id, "Invitation expired"),
        // Another request moved it first
        Err(follix_control::ControlError::InvalidTransition { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    invitation.status = InvitationStatus::Expired;
    Ok(true)
}

// =============================================================================
// Handlers
// =============================================================================

/// Invite someone to a clinic and send them the accept link
pub async fn create_invitation(
    state: &AppState,
    ctx: &RequestContext,
    req: CreateInvitation,
) -> Outcome<InvitationCreated> {
    state.settle(try_create_invitation(state, ctx, req).await)
}

async fn try_create_invitation(
    state: &AppState,
    ctx: &RequestContext,
    req: CreateInvitation,
) -> HandlerResult<InvitationCreated> {
    ensure(
        state.authz.can_access_clinic(ctx, &req.clinic_id).await,
        ctx,
        req.clinic_id,
        "Access denied. You cannot create invitations for this clinic.",
        "Unauthorized clinic access",
    )?;
    ensure(
        state.authz.satisfies(ctx, Policy::ClinicAdministration).await,
        ctx,
        req.clinic_id,
        "Access denied. Only clinic administrators can create invitations.",
        "Insufficient permissions for invitation creation",
    )?;

    let email = normalize_email(&req.email);
    if !looks_like_email(&email) {
        return Err(Failure::invalid("Invalid email address.", "Email validation failed"));
    }
    let role = Role::parse(&req.role)
        .filter(Role::is_clinic_scoped)
        .ok_or_else(|| Failure::invalid("Invalid role for invitation.", "Role must be doctor or clinic_admin"))?;

    if !state.store.clinics().exists(req.clinic_id).await? {
        return Err(Failure::not_found("Clinic not found"));
    }
    if state.store.users().get_by_email(&email).await?.is_some() {
        return Err(Failure::conflict(DUPLICATE_EMAIL, DUPLICATE_EMAIL_REASON));
    }

    let inviter = state.acting_user(ctx).await?;
    let invitation = ClinicInvitation::new(req.clinic_id, inviter, &email, role, state.settings.invitation_ttl());
    state.store.invitations().create(&invitation).await?;

    let accept_link = state.settings.invitations.accept_link(&invitation.token);
    info!(
        invitation_id = %invitation.id,
        clinic_id = %invitation.clinic_id,
        role = %role.as_str(),
        user_id = %caller(ctx),
        "Invitation created"
    );

    let message = match state.collaborators.notifier.send_invitation(&invitation, &accept_link).await {
        Ok(()) => "Invitation created and sent successfully",
        Err(e) => {
            warn!(invitation_id = %invitation.id, error = %e, "Invitation email delivery failed");
            "Invitation created but the email could not be sent. Share the invitation link manually."
        }
    };

    Ok(Outcome::success(
        message,
        InvitationCreated {
            invitation_id: invitation.id,
            email: invitation.email,
            role,
            token: invitation.token,
            accept_link,
            expires_at: invitation.expires_at,
        },
    ))
}

/// Look up a pending, unexpired invitation by token
pub async fn get_invitation(state: &AppState, token: &str) -> Outcome<InvitationView> {
    state.settle(try_get_invitation(state, token).await)
}

async fn try_get_invitation(state: &AppState, token: &str) -> HandlerResult<InvitationView> {
    if !is_well_formed_token(token) {
        return Err(Failure::invalid("Invalid invitation token format", "Invalid invitation token format"));
    }

    let Some(mut invitation) = state.store.invitations().get_by_token(token).await? else {
        return Err(Failure::not_found(NOT_VALID));
    };
    expire_if_due(state, &mut invitation, Utc::now()).await?;
    if invitation.status != InvitationStatus::Pending {
        return Err(Failure::not_found(NOT_VALID));
    }

    let clinic_name = state
        .store
        .clinics()
        .get_by_id(invitation.clinic_id)
        .await?
        .map(|c| c.name);

    Ok(Outcome::success(
        "Invitation retrieved successfully",
        InvitationView {
            invitation_id: invitation.id,
            clinic_id: invitation.clinic_id,
            clinic_name,
            email: invitation.email,
            role: invitation.role,
            status: invitation.status,
            expires_at: invitation.expires_at,
        },
    ))
}

/// Accept an invitation as an already registered account
///
/// The caller's email must be the invited one. A clinic binding never
/// changes, so an account bound to another clinic cannot accept. The
/// account takes the invited role.
pub async fn accept_invitation(state: &AppState, ctx: &RequestContext, token: &str) -> Outcome<()> {
    state.settle(try_accept_invitation(state, ctx, token).await)
}

async fn try_accept_invitation(state: &AppState, ctx: &RequestContext, token: &str) -> HandlerResult<()> {
    let Some(actor) = state.authz.actor(ctx).await.cloned() else {
        return Err(Failure::denied(
            "Access denied. Authentication required.",
            "Unauthenticated",
        ));
    };

    if !is_well_formed_token(token) {
        return Err(Failure::rule("Invalid invitation token"));
    }
    let Some(mut invitation) = state.store.invitations().get_by_token(token).await? else {
        return Err(Failure::rule("Invalid invitation token"));
    };

    if invitation.status != InvitationStatus::Pending {
        return Err(Failure::rule("Invitation is no longer valid"));
    }
    let now = Utc::now();
    if expire_if_due(state, &mut invitation, now).await? {
        return Err(Failure::rule("Invitation has expired"));
    }

    ensure(
        actor.email == invitation.email,
        ctx,
        &invitation.id,
        "Access denied. This invitation was issued to a different email address.",
        "Invitation email mismatch",
    )?;
    ensure(
        actor.clinic_id == Some(invitation.clinic_id),
        ctx,
        &invitation.id,
        "Access denied. Your account belongs to a different clinic.",
        "Clinic ID mismatch with invitation",
    )?;

    state
        .store
        .invitations()
        .mark_accepted(&invitation.id, actor.id, invitation.role, now)
        .await
        .map_err(|e| match e {
            follix_control::ControlError::InvalidTransition { .. } => Failure::rule("Invitation is no longer valid"),
            other => other.into(),
        })?;

    info!(invitation_id = %invitation.id, user_id = %actor.id, role = invitation.role.as_str(), "Invitation accepted");
    Ok(Outcome::done("Invitation accepted successfully"))
}

/// Create an account from an invitation
///
/// The account takes the invitation's clinic and role; the invitation is
/// consumed in the same unit.
pub async fn register_with_invitation(state: &AppState, req: RegisterWithInvitation) -> Outcome<Registered> {
    state.settle(try_register_with_invitation(state, req).await)
}

async fn try_register_with_invitation(state: &AppState, req: RegisterWithInvitation) -> HandlerResult<Registered> {
    let email = normalize_email(&req.email);

    let invitation = if is_well_formed_token(&req.token) {
        state.store.invitations().get_by_token(&req.token).await?
    } else {
        None
    };
    let no_invitation = || {
        warn!(email = %email, "Registration without a valid invitation");
        Failure::invalid(
            "Registration requires a valid invitation. Please contact your clinic administrator.",
            "No valid invitation found for this email address",
        )
    };
    let Some(mut invitation) = invitation.filter(|i| i.email == email) else {
        return Err(no_invitation());
    };
    if invitation.status != InvitationStatus::Pending || expire_if_due(state, &mut invitation, Utc::now()).await? {
        return Err(no_invitation());
    }

    if req.clinic_id.is_some_and(|c| c != invitation.clinic_id) {
        warn!(invitation_id = %invitation.id, "Registration clinic mismatch");
        return Err(Failure::denied(
            "Invalid clinic assignment. Registration denied.",
            "Clinic ID mismatch with invitation",
        ));
    }

    let mut errors = Vec::new();
    for (label, value) in [("First name", &req.first_name), ("Last name", &req.last_name)] {
        let len = value.trim().chars().count();
        if len == 0 {
            errors.push(format!("{} is required.", label));
        } else if len > MAX_PATIENT_NAME_LEN {
            errors.push(format!("{} must not exceed {} characters.", label, MAX_PATIENT_NAME_LEN));
        }
    }
    if let Err(problems) = check_policy(&req.password) {
        errors.extend(problems);
    }
    if !errors.is_empty() {
        return Err(Failure::Validation {
            message: "User registration failed".to_string(),
            errors,
        });
    }

    if state.store.users().get_by_email(&email).await?.is_some() {
        return Err(Failure::conflict(DUPLICATE_EMAIL, DUPLICATE_EMAIL_REASON));
    }

    let hash = hash_password(&req.password).map_err(|e| Failure::internal("Password hashing failed", e))?;
    let account = Account::new(
        &email,
        hash,
        req.first_name.trim(),
        req.last_name.trim(),
        invitation.role,
        Some(invitation.clinic_id),
    );

    state
        .store
        .invitations()
        .register(&invitation.id, &account)
        .await
        .map_err(|e| match e {
            follix_control::ControlError::InvalidTransition { .. } => Failure::invalid(
                "Registration requires a valid invitation. Please contact your clinic administrator.",
                "No valid invitation found for this email address",
            ),
            other => conflict_as(DUPLICATE_EMAIL, DUPLICATE_EMAIL_REASON)(other),
        })?;

    info!(user_id = %account.id, clinic_id = %invitation.clinic_id, "User registered from invitation");
    Ok(Outcome::success(
        "User registered successfully with invitation validation",
        Registered {
            user_id: account.id,
            email: account.email,
            role: account.role,
            clinic_id: account.clinic_id,
        },
    ))
}
