//! Patient handlers

use chrono::{DateTime, Months, NaiveDate, Utc};
use follix_auth::{ClinicId, PatientId, RequestContext};
use follix_control::Patient;
use follix_control::models::{MAX_CLINIC_PATIENT_ID_LEN, MAX_PATIENT_NAME_LEN, normalize_clinic_patient_id};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::outcome::{Failure, HandlerResult, Outcome, caller, conflict_as, ensure, missing_as};
use crate::state::AppState;

/// Oldest accepted date of birth, in years before today
pub const MAX_PATIENT_AGE_YEARS: u32 = 150;

const DUPLICATE_MESSAGE: &str = "A patient with this clinic patient ID already exists.";
const DUPLICATE_REASON: &str = "Duplicate clinic patient ID";

// =============================================================================
// Request/Response types
// =============================================================================

/// Create patient request
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePatient {
    pub clinic_id: ClinicId,
    #[serde(default)]
    pub clinic_patient_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

/// Update patient request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePatient {
    pub patient_id: PatientId,
    #[serde(default)]
    pub clinic_patient_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

/// Patient response
#[derive(Debug, Clone, Serialize)]
pub struct PatientView {
    pub id: PatientId,
    pub clinic_id: ClinicId,
    pub clinic_patient_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Patient> for PatientView {
    fn from(p: Patient) -> Self {
        Self {
            id: p.id,
            clinic_id: p.clinic_id,
            clinic_patient_id: p.clinic_patient_id,
            first_name: p.first_name,
            last_name: p.last_name,
            date_of_birth: p.date_of_birth,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Date of birth must be neither in the future nor more than 150 years back
pub fn check_date_of_birth(dob: NaiveDate, today: NaiveDate) -> Result<(), Failure> {
    if dob > today {
        return Err(Failure::invalid("Date of birth cannot be in the future.", "Invalid date of birth"));
    }
    let earliest = today
        .checked_sub_months(Months::new(MAX_PATIENT_AGE_YEARS * 12))
        .unwrap_or(NaiveDate::MIN);
    if dob < earliest {
        return Err(Failure::invalid(
            "Date of birth is unrealistic (more than 150 years ago).",
            "Invalid date of birth",
        ));
    }
    Ok(())
}

fn check_fields(first_name: &str, last_name: &str, clinic_patient_id: Option<&str>) -> Result<(), Failure> {
    let mut errors = Vec::new();
    for (label, value) in [("First name", first_name), ("Last name", last_name)] {
        let value = value.trim();
        if value.is_empty() {
            errors.push(format!("{} is required.", label));
        } else if value.chars().count() > MAX_PATIENT_NAME_LEN {
            errors.push(format!("{} must not exceed {} characters.", label, MAX_PATIENT_NAME_LEN));
        }
    }
    if clinic_patient_id.is_some_and(|id| id.trim().chars().count() > MAX_CLINIC_PATIENT_ID_LEN) {
        errors.push(format!(
            "Clinic patient ID must not exceed {} characters.",
            MAX_CLINIC_PATIENT_ID_LEN
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Failure::Validation {
            message: "Patient details are invalid.".to_string(),
            errors,
        })
    }
}

async fn check_unique(
    state: &AppState,
    clinic_id: ClinicId,
    clinic_patient_id: Option<&str>,
    excluding: Option<PatientId>,
) -> Result<(), Failure> {
    let Some(cpid) = clinic_patient_id else {
        return Ok(());
    };
    if state
        .store
        .patients()
        .clinic_patient_id_taken(clinic_id, cpid, excluding)
        .await?
    {
        return Err(Failure::conflict(DUPLICATE_MESSAGE, DUPLICATE_REASON));
    }
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a patient in a clinic
pub async fn create_patient(state: &AppState, ctx: &RequestContext, req: CreatePatient) -> Outcome<PatientView> {
    state.settle(try_create_patient(state, ctx, req).await)
}

async fn try_create_patient(state: &AppState, ctx: &RequestContext, req: CreatePatient) -> HandlerResult<PatientView> {
    ensure(
        state.authz.can_access_clinic(ctx, &req.clinic_id).await,
        ctx,
        req.clinic_id,
        "Access denied. You cannot create patients for this clinic.",
        "Unauthorized clinic access",
    )?;

    if !state.store.clinics().exists(req.clinic_id).await? {
        return Err(Failure::not_found("Clinic not found"));
    }

    check_fields(&req.first_name, &req.last_name, req.clinic_patient_id.as_deref())?;
    let cpid = normalize_clinic_patient_id(req.clinic_patient_id.as_deref());
    check_unique(state, req.clinic_id, cpid.as_deref(), None).await?;
    if let Some(dob) = req.date_of_birth {
        check_date_of_birth(dob, Utc::now().date_naive())?;
    }

    let patient = Patient::new(
        req.clinic_id,
        cpid.as_deref(),
        &req.first_name,
        &req.last_name,
        req.date_of_birth,
    );
    state
        .store
        .patients()
        .create(&patient)
        .await
        .map_err(conflict_as(DUPLICATE_MESSAGE, DUPLICATE_REASON))?;

    info!(patient_id = %patient.id, clinic_id = %patient.clinic_id, user_id = %caller(ctx), "Patient created");
    Ok(Outcome::success("Patient created successfully", patient.into()))
}

/// Update a patient's details
pub async fn update_patient(state: &AppState, ctx: &RequestContext, req: UpdatePatient) -> Outcome<PatientView> {
    state.settle(try_update_patient(state, ctx, req).await)
}

async fn try_update_patient(state: &AppState, ctx: &RequestContext, req: UpdatePatient) -> HandlerResult<PatientView> {
    ensure(
        state.authz.can_access_patient(ctx, &req.patient_id).await,
        ctx,
        req.patient_id,
        "Access denied. You cannot modify this patient's data.",
        "Unauthorized access to patient data",
    )?;

    let mut patient = state
        .store
        .patients()
        .get_by_id(req.patient_id)
        .await?
        .ok_or_else(|| Failure::not_found("Patient not found"))?;

    check_fields(&req.first_name, &req.last_name, req.clinic_patient_id.as_deref())?;
    let cpid = normalize_clinic_patient_id(req.clinic_patient_id.as_deref());
    check_unique(state, patient.clinic_id, cpid.as_deref(), Some(patient.id)).await?;
    if let Some(dob) = req.date_of_birth {
        check_date_of_birth(dob, Utc::now().date_naive())?;
    }

    patient.clinic_patient_id = cpid;
    patient.first_name = req.first_name.trim().to_string();
    patient.last_name = req.last_name.trim().to_string();
    patient.date_of_birth = req.date_of_birth;
    patient.updated_at = Utc::now();

    state.store.patients().update(&patient).await.map_err(|e| {
        if e.is_conflict() {
            Failure::conflict(DUPLICATE_MESSAGE, DUPLICATE_REASON)
        } else {
            missing_as("Patient not found")(e)
        }
    })?;

    Ok(Outcome::success("Patient updated successfully", patient.into()))
}

/// Fetch one patient
pub async fn get_patient(state: &AppState, ctx: &RequestContext, patient_id: PatientId) -> Outcome<PatientView> {
    state.settle(try_get_patient(state, ctx, patient_id).await)
}

async fn try_get_patient(state: &AppState, ctx: &RequestContext, patient_id: PatientId) -> HandlerResult<PatientView> {
    ensure(
        state.authz.can_access_patient(ctx, &patient_id).await,
        ctx,
        patient_id,
        "Access denied. You cannot access this patient.",
        "Unauthorized access to patient data",
    )?;

    let patient = state
        .store
        .patients()
        .get_by_id(patient_id)
        .await?
        .ok_or_else(|| Failure::not_found("Patient not found"))?;

    Ok(Outcome::success("Patient retrieved successfully", patient.into()))
}

/// Patients of one clinic
pub async fn list_patients(state: &AppState, ctx: &RequestContext, clinic_id: ClinicId) -> Outcome<Vec<PatientView>> {
    state.settle(try_list_patients(state, ctx, clinic_id).await)
}

async fn try_list_patients(state: &AppState, ctx: &RequestContext, clinic_id: ClinicId) -> HandlerResult<Vec<PatientView>> {
    ensure(
        state.authz.can_access_clinic(ctx, &clinic_id).await,
        ctx,
        clinic_id,
        "Access denied. You cannot access patients for this clinic.",
        "Unauthorized clinic access",
    )?;

    let patients = state.store.patients().list_for_clinic(clinic_id).await?;
    Ok(Outcome::success(
        "Patients retrieved successfully",
        patients.into_iter().map(PatientView::from).collect(),
    ))
}
