//! Integration tests for clinic and patient handlers
//!
//! Tests: tenant isolation, patient uniqueness, date rules

mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use follix_auth::RequestContext;
use follix_handlers::FailureKind;
use follix_handlers::clinics::{self, CreateClinic, UpdateClinic};
use follix_handlers::patients::{self, CreatePatient, UpdatePatient};

fn new_patient(clinic_id: follix_auth::ClinicId, cpid: Option<&str>) -> CreatePatient {
    CreatePatient {
        clinic_id,
        clinic_patient_id: cpid.map(str::to_string),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        date_of_birth: None,
    }
}

// =============================================================================
// Tenant isolation
// =============================================================================

#[tokio::test]
async fn test_doctor_cannot_touch_other_clinic_patient() {
    let app = TestApp::new().await;
    let c1 = app.clinic("North").await;
    let c2 = app.clinic("South").await;
    let doctor = app.doctor(c1, "doc@north.test").await;
    let foreign = app.patient(c2, Some("S-1")).await;

    assert!(!app.state.authz.can_access_patient(&doctor, &foreign).await);

    let read = patients::get_patient(&app.state, &doctor, foreign).await;
    assert!(!read.success);
    assert!(read.message.contains("Access denied"));
    assert!(read.payload.is_none());

    let update = patients::update_patient(
        &app.state,
        &doctor,
        UpdatePatient {
            patient_id: foreign,
            clinic_patient_id: Some("HACKED".into()),
            first_name: "Mallory".into(),
            last_name: "X".into(),
            date_of_birth: None,
        },
    )
    .await;
    assert!(update.is(FailureKind::Denied));
    assert_eq!(update.errors, vec!["Unauthorized access to patient data"]);

    let stored = app.store().patients().get_by_id(foreign).await.unwrap().unwrap();
    assert_eq!(stored.first_name, "Jane");
    assert_eq!(stored.clinic_patient_id.as_deref(), Some("S-1"));
}

#[tokio::test]
async fn test_create_patient_in_foreign_clinic_inserts_nothing() {
    let app = TestApp::new().await;
    let c1 = app.clinic("North").await;
    let c2 = app.clinic("South").await;
    let doctor = app.doctor(c1, "doc@north.test").await;

    let outcome = patients::create_patient(&app.state, &doctor, new_patient(c2, Some("X-1"))).await;
    assert!(outcome.is(FailureKind::Denied));
    assert_eq!(outcome.message, "Access denied. You cannot create patients for this clinic.");
    assert!(app.store().patients().list_for_clinic(c2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_patient_is_denied_not_revealed() {
    let app = TestApp::new().await;
    let root = app.super_admin("root@follix.test").await;

    let outcome = patients::get_patient(&app.state, &root, follix_auth::PatientId::new()).await;
    assert!(outcome.is(FailureKind::Denied));
}

#[tokio::test]
async fn test_anonymous_is_denied() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;

    let outcome = patients::list_patients(&app.state, &RequestContext::anonymous(), clinic).await;
    assert!(outcome.is(FailureKind::Denied));
}

// =============================================================================
// Patients
// =============================================================================

#[tokio::test]
async fn test_duplicate_clinic_patient_id_rejected() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let doctor = app.doctor(clinic, "doc@north.test").await;

    let first = patients::create_patient(&app.state, &doctor, new_patient(clinic, Some("P-100"))).await;
    assert!(first.success, "{}", first.message);

    let second = patients::create_patient(&app.state, &doctor, new_patient(clinic, Some("  P-100 "))).await;
    assert!(second.is(FailureKind::Conflict));
    assert_eq!(second.message, "A patient with this clinic patient ID already exists.");
    assert_eq!(app.store().patients().list_for_clinic(clinic).await.unwrap().len(), 1);

    // Same id in another clinic is fine
    let other = app.clinic("South").await;
    let root = app.super_admin("root@follix.test").await;
    let elsewhere = patients::create_patient(&app.state, &root, new_patient(other, Some("P-100"))).await;
    assert!(elsewhere.success);
}

#[tokio::test]
async fn test_patients_without_clinic_id_do_not_collide() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let doctor = app.doctor(clinic, "doc@north.test").await;

    for cpid in [None, Some(""), Some("   ")] {
        let outcome = patients::create_patient(&app.state, &doctor, new_patient(clinic, cpid)).await;
        assert!(outcome.success, "{}", outcome.message);
    }
    assert_eq!(app.store().patients().list_for_clinic(clinic).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_future_date_of_birth_rejected() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let doctor = app.doctor(clinic, "doc@north.test").await;

    let mut req = new_patient(clinic, None);
    req.date_of_birth = Some(Utc::now().date_naive() + Duration::days(1));

    let outcome = patients::create_patient(&app.state, &doctor, req).await;
    assert!(outcome.is(FailureKind::Validation));
    assert_eq!(outcome.message, "Date of birth cannot be in the future.");
}

#[tokio::test]
async fn test_update_cannot_take_existing_clinic_patient_id() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let doctor = app.doctor(clinic, "doc@north.test").await;
    app.patient(clinic, Some("A-1")).await;
    let target = app.patient(clinic, Some("B-1")).await;

    let outcome = patients::update_patient(
        &app.state,
        &doctor,
        UpdatePatient {
            patient_id: target,
            clinic_patient_id: Some("A-1".into()),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            date_of_birth: None,
        },
    )
    .await;
    assert!(outcome.is(FailureKind::Conflict));

    // Keeping its own id is not a conflict
    let keep = patients::update_patient(
        &app.state,
        &doctor,
        UpdatePatient {
            patient_id: target,
            clinic_patient_id: Some("B-1".into()),
            first_name: "Janet".into(),
            last_name: "Doe".into(),
            date_of_birth: None,
        },
    )
    .await;
    assert!(keep.success, "{}", keep.message);
    assert_eq!(keep.payload.unwrap().first_name, "Janet");
}

// =============================================================================
// Clinics
// =============================================================================

#[tokio::test]
async fn test_only_super_admin_creates_clinics() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let admin = app.clinic_admin(clinic, "admin@north.test").await;
    let root = app.super_admin("root@follix.test").await;

    let denied = clinics::create_clinic(&app.state, &admin, CreateClinic { name: "Rogue".into() }).await;
    assert_eq!(denied.message, "Access denied. Only SuperAdmin can manually create clinics.");

    let created = clinics::create_clinic(&app.state, &root, CreateClinic { name: " East ".into() }).await;
    assert!(created.success);
    assert_eq!(created.payload.unwrap().name, "East");
}

#[tokio::test]
async fn test_doctor_cannot_rename_own_clinic() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let doctor = app.doctor(clinic, "doc@north.test").await;
    let admin = app.clinic_admin(clinic, "admin@north.test").await;

    let req = |name: &str| UpdateClinic {
        clinic_id: clinic,
        name: name.into(),
    };

    let denied = clinics::update_clinic(&app.state, &doctor, req("Doc Clinic")).await;
    assert!(denied.is(FailureKind::Denied));

    let renamed = clinics::update_clinic(&app.state, &admin, req("North Hair Center")).await;
    assert!(renamed.success, "{}", renamed.message);
    let stored = app.store().clinics().get_by_id(clinic).await.unwrap().unwrap();
    assert_eq!(stored.name, "North Hair Center");
}

#[tokio::test]
async fn test_list_clinics_is_scoped() {
    let app = TestApp::new().await;
    let north = app.clinic("North").await;
    app.clinic("South").await;
    let doctor = app.doctor(north, "doc@north.test").await;
    let root = app.super_admin("root@follix.test").await;

    let mine = clinics::list_clinics(&app.state, &doctor).await;
    let ids: Vec<_> = mine.payload.unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![north]);

    let all = clinics::list_clinics(&app.state, &root).await;
    assert_eq!(all.message, "Retrieved 2 accessible clinics");
}

#[tokio::test]
async fn test_records_need_an_existing_clinic() {
    let app = TestApp::new().await;
    let root = app.super_admin("root@follix.test").await;
    let missing = follix_auth::ClinicId::new();

    let patient = patients::create_patient(&app.state, &root, new_patient(missing, Some("P-1"))).await;
    assert!(patient.is(FailureKind::NotFound));
    assert_eq!(patient.message, "Clinic not found");
    assert!(app.store().patients().list_for_clinic(missing).await.unwrap().is_empty());

    let profile = follix_handlers::calibration::create_profile(
        &app.state,
        &root,
        follix_handlers::calibration::CreateProfile {
            clinic_id: missing,
            name: "Dermlite".into(),
            data: serde_json::json!({"pixels_per_mm": 11.2}),
        },
    )
    .await;
    assert!(profile.is(FailureKind::NotFound));
    assert!(app.store().calibration().list_active_for_clinic(missing).await.unwrap().is_empty());
}
