//! Calibration profile handlers

use chrono::{DateTime, Utc};
use follix_auth::{ClinicId, ProfileId, RequestContext};
use follix_control::models::MAX_PROFILE_NAME_LEN;
use follix_control::{CalibrationProfile, ProfileState};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::outcome::{Failure, HandlerResult, Outcome, caller, ensure, missing_as, transition_as};
use crate::state::AppState;

const PROFILE_NOT_FOUND: &str = "Calibration profile not found";

/// Create profile request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProfile {
    pub clinic_id: ClinicId,
    pub name: String,
    pub data: serde_json::Value,
}

/// Update profile request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfile {
    pub profile_id: ProfileId,
    pub name: String,
    pub data: serde_json::Value,
}

/// Profile response
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: ProfileId,
    pub clinic_id: ClinicId,
    pub name: String,
    pub data: serde_json::Value,
    pub version: i64,
    pub state: ProfileState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CalibrationProfile> for ProfileView {
    fn from(p: CalibrationProfile) -> Self {
        Self {
            id: p.id,
            clinic_id: p.clinic_id,
            name: p.name,
            data: p.data,
            version: p.version,
            state: p.state,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

fn check_profile(name: &str, data: &serde_json::Value) -> Result<(), Failure> {
    let mut errors = Vec::new();
    let len = name.trim().chars().count();
    if len == 0 {
        errors.push("Profile name is required.".to_string());
    } else if len > MAX_PROFILE_NAME_LEN {
        errors.push(format!("Profile name must not exceed {} characters.", MAX_PROFILE_NAME_LEN));
    }
    if !data.is_object() {
        errors.push("Calibration data must be a JSON object.".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Failure::Validation {
            message: "Calibration profile is invalid.".to_string(),
            errors,
        })
    }
}

/// Create a profile; an active profile with the same name is superseded
pub async fn create_profile(state: &AppState, ctx: &RequestContext, req: CreateProfile) -> Outcome<ProfileView> {
    state.settle(try_create_profile(state, ctx, req).await)
}

async fn try_create_profile(state: &AppState, ctx: &RequestContext, req: CreateProfile) -> HandlerResult<ProfileView> {
    ensure(
        state.authz.can_access_clinic(ctx, &req.clinic_id).await,
        ctx,
        req.clinic_id,
        "Access denied. You cannot create calibration profiles for this clinic.",
        "Unauthorized clinic access",
    )?;

    if !state.store.clinics().exists(req.clinic_id).await? {
        return Err(Failure::not_found("Clinic not found"));
    }

    check_profile(&req.name, &req.data)?;

    let mut profile = CalibrationProfile::new(req.clinic_id, &req.name, req.data);
    profile.version = state.store.calibration().create(&profile).await?;

    info!(
        profile_id = %profile.id,
        clinic_id = %profile.clinic_id,
        version = profile.version,
        user_id = %caller(ctx),
        "Calibration profile created"
    );
    Ok(Outcome::success("Calibration profile created successfully", profile.into()))
}

/// Change a profile's name or data
pub async fn update_profile(state: &AppState, ctx: &RequestContext, req: UpdateProfile) -> Outcome<ProfileView> {
    state.settle(try_update_profile(state, ctx, req).await)
}

async fn try_update_profile(state: &AppState, ctx: &RequestContext, req: UpdateProfile) -> HandlerResult<ProfileView> {
    ensure(
        state.authz.can_access_calibration_profile(ctx, &req.profile_id).await,
        ctx,
        req.profile_id,
        "Access denied. You cannot modify this calibration profile.",
        "Unauthorized access to calibration profile",
    )?;

    let current = state
        .store
        .calibration()
        .get_by_id(req.profile_id)
        .await?
        .ok_or_else(|| Failure::not_found(PROFILE_NOT_FOUND))?;
    if !current.is_active() {
        return Err(Failure::rule("Calibration profile is inactive and cannot be modified."));
    }

    check_profile(&req.name, &req.data)?;

    let updated = state
        .store
        .calibration()
        .update(req.profile_id, &req.name, &req.data)
        .await
        .map_err(missing_as(PROFILE_NOT_FOUND))?;

    Ok(Outcome::success("Calibration profile updated successfully", updated.into()))
}

/// Retire a profile
pub async fn deactivate_profile(state: &AppState, ctx: &RequestContext, profile_id: ProfileId) -> Outcome<()> {
    state.settle(try_deactivate_profile(state, ctx, profile_id).await)
}

async fn try_deactivate_profile(state: &AppState, ctx: &RequestContext, profile_id: ProfileId) -> HandlerResult<()> {
    ensure(
        state.authz.can_access_calibration_profile(ctx, &profile_id).await,
        ctx,
        profile_id,
        "Access denied. You cannot modify this calibration profile.",
        "Unauthorized access to calibration profile",
    )?;

    state
        .store
        .calibration()
        .retire(profile_id)
        .await
        .map_err(transition_as("Calibration profile is already inactive.", PROFILE_NOT_FOUND))?;

    info!(profile_id = %profile_id, user_id = %caller(ctx), "Calibration profile deactivated");
    Ok(Outcome::done("Calibration profile deactivated successfully"))
}

/// Active profiles of a clinic
pub async fn list_active_profiles(
    state: &AppState,
    ctx: &RequestContext,
    clinic_id: ClinicId,
) -> Outcome<Vec<ProfileView>> {
    state.settle(try_list_active_profiles(state, ctx, clinic_id).await)
}

async fn try_list_active_profiles(
    state: &AppState,
    ctx: &RequestContext,
    clinic_id: ClinicId,
) -> HandlerResult<Vec<ProfileView>> {
    ensure(
        state.authz.can_access_clinic(ctx, &clinic_id).await,
        ctx,
        clinic_id,
        "Access denied. You cannot access calibration profiles for this clinic.",
        "Unauthorized clinic access",
    )?;

    let profiles = state.store.calibration().list_active_for_clinic(clinic_id).await?;
    Ok(Outcome::success(
        "Active calibration profiles retrieved successfully",
        profiles.into_iter().map(ProfileView::from).collect(),
    ))
}
