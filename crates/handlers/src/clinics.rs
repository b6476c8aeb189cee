//! Clinic handlers

use chrono::{DateTime, Utc};
use follix_auth::{ClinicId, Policy, RequestContext};
use follix_control::Clinic;
use follix_control::models::MAX_CLINIC_NAME_LEN;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::outcome::{Failure, HandlerResult, Outcome, caller, ensure, missing_as};
use crate::state::AppState;

/// Upper bound on clinics returned by one listing
pub const MAX_LISTED_CLINICS: usize = 1000;

// =============================================================================
// Request/Response types
// =============================================================================

/// Create clinic request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClinic {
    pub name: String,
}

/// Rename clinic request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateClinic {
    pub clinic_id: ClinicId,
    pub name: String,
}

/// Clinic response
#[derive(Debug, Clone, Serialize)]
pub struct ClinicView {
    pub id: ClinicId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Clinic> for ClinicView {
    fn from(clinic: Clinic) -> Self {
        Self {
            id: clinic.id,
            name: clinic.name,
            created_at: clinic.created_at,
            updated_at: clinic.updated_at,
        }
    }
}

fn check_name(name: &str) -> Result<String, Failure> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Failure::invalid("Clinic name is required.", "Invalid clinic name"));
    }
    if name.chars().count() > MAX_CLINIC_NAME_LEN {
        return Err(Failure::invalid(
            format!("Clinic name must not exceed {} characters.", MAX_CLINIC_NAME_LEN),
            "Invalid clinic name",
        ));
    }
    Ok(name.to_string())
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a clinic (platform operators only)
pub async fn create_clinic(state: &AppState, ctx: &RequestContext, req: CreateClinic) -> Outcome<ClinicView> {
    state.settle(try_create_clinic(state, ctx, req).await)
}

async fn try_create_clinic(state: &AppState, ctx: &RequestContext, req: CreateClinic) -> HandlerResult<ClinicView> {
    ensure(
        state.authz.is_super_admin(ctx).await,
        ctx,
        "clinics",
        "Access denied. Only SuperAdmin can manually create clinics.",
        "Insufficient permissions for clinic creation",
    )?;

    let clinic = Clinic::new(check_name(&req.name)?);
    state.store.clinics().create(&clinic).await?;

    info!(clinic_id = %clinic.id, user_id = %caller(ctx), "Clinic created");
    Ok(Outcome::success("Clinic created successfully", clinic.into()))
}

/// Rename a clinic
pub async fn update_clinic(state: &AppState, ctx: &RequestContext, req: UpdateClinic) -> Outcome<()> {
    state.settle(try_update_clinic(state, ctx, req).await)
}

async fn try_update_clinic(state: &AppState, ctx: &RequestContext, req: UpdateClinic) -> HandlerResult<()> {
    ensure(
        state.authz.can_access_clinic(ctx, &req.clinic_id).await,
        ctx,
        req.clinic_id,
        "Access denied. You cannot modify this clinic.",
        "Unauthorized clinic access",
    )?;
    ensure(
        state.authz.satisfies(ctx, Policy::ClinicAdministration).await,
        ctx,
        req.clinic_id,
        "Access denied. Only clinic administrators can update clinics.",
        "Insufficient permissions for clinic update",
    )?;

    let name = check_name(&req.name)?;
    state
        .store
        .clinics()
        .update_name(req.clinic_id, &name)
        .await
        .map_err(missing_as("Clinic not found"))?;

    Ok(Outcome::done("Clinic updated successfully"))
}

/// Fetch one clinic
pub async fn get_clinic(state: &AppState, ctx: &RequestContext, clinic_id: ClinicId) -> Outcome<ClinicView> {
    state.settle(try_get_clinic(state, ctx, clinic_id).await)
}

async fn try_get_clinic(state: &AppState, ctx: &RequestContext, clinic_id: ClinicId) -> HandlerResult<ClinicView> {
    ensure(
        state.authz.can_access_clinic(ctx, &clinic_id).await,
        ctx,
        clinic_id,
        "Access denied. You cannot access this clinic.",
        "Unauthorized access to clinic data",
    )?;

    let clinic = state
        .store
        .clinics()
        .get_by_id(clinic_id)
        .await?
        .ok_or_else(|| Failure::not_found("Clinic not found"))?;

    Ok(Outcome::success("Clinic retrieved successfully", clinic.into()))
}

/// Clinics the caller may access
pub async fn list_clinics(state: &AppState, ctx: &RequestContext) -> Outcome<Vec<ClinicView>> {
    state.settle(try_list_clinics(state, ctx).await)
}

async fn try_list_clinics(state: &AppState, ctx: &RequestContext) -> HandlerResult<Vec<ClinicView>> {
    let accessible = state.authz.get_user_accessible_clinics(ctx).await;
    if accessible.len() > MAX_LISTED_CLINICS {
        return Err(Failure::invalid(
            "Too many accessible clinics. Please contact administrator.",
            "Clinic count exceeds safe processing limit",
        ));
    }

    let clinics: Vec<ClinicView> = state
        .store
        .clinics()
        .list_all()
        .await?
        .into_iter()
        .filter(|c| accessible.contains(&c.id))
        .map(ClinicView::from)
        .collect();

    Ok(Outcome::success(
        format!("Retrieved {} accessible clinics", clinics.len()),
        clinics,
    ))
}
