//! Integration tests for invitations and login
//!
//! Tests: invite, lookup, accept, register, login

mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use follix_auth::{ClinicId, RequestContext, Role};
use follix_control::{ClinicInvitation, InvitationStatus};
use follix_handlers::FailureKind;
use follix_handlers::accounts::{self, Login};
use follix_handlers::invitations::{self, CreateInvitation, RegisterWithInvitation};

fn invite(clinic_id: ClinicId, email: &str) -> CreateInvitation {
    CreateInvitation {
        clinic_id,
        email: email.into(),
        role: "doctor".into(),
    }
}

fn register(token: &str, email: &str, clinic_id: Option<ClinicId>) -> RegisterWithInvitation {
    RegisterWithInvitation {
        token: token.into(),
        email: email.into(),
        password: "Sup3rSecret".into(),
        first_name: "Grace".into(),
        last_name: "Hopper".into(),
        clinic_id,
    }
}

#[tokio::test]
async fn test_admin_invites_and_invitee_registers() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let admin = app.clinic_admin(clinic, "admin@north.test").await;

    let created = invitations::create_invitation(&app.state, &admin, invite(clinic, "Grace@North.test")).await;
    assert_eq!(created.message, "Invitation created and sent successfully");
    let created = created.payload.unwrap();
    assert_eq!(created.email, "grace@north.test");
    assert_eq!(created.token.len(), 36);

    let sent = app.fakes.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.ends_with(&format!("?token={}", created.token)));

    let view = invitations::get_invitation(&app.state, &created.token).await.payload.unwrap();
    assert_eq!(view.clinic_name.as_deref(), Some("North"));
    assert_eq!(view.role, Role::Doctor);

    let registered =
        invitations::register_with_invitation(&app.state, register(&created.token, "grace@north.test", Some(clinic)))
            .await;
    assert_eq!(registered.message, "User registered successfully with invitation validation");
    let registered = registered.payload.unwrap();
    assert_eq!(registered.clinic_id, Some(clinic));
    assert_eq!(registered.role, Role::Doctor);

    let stored = app.store().invitations().get_by_token(&created.token).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Accepted);
    assert_eq!(stored.accepted_by, Some(registered.user_id));

    let login = accounts::login(
        &app.state,
        Login {
            email: "GRACE@north.test".into(),
            password: "Sup3rSecret".into(),
        },
    )
    .await;
    assert_eq!(login.message, "Login successful");
    let token = login.payload.unwrap().token;
    let ctx = app.state.context_for(Some(&token));
    assert!(app.state.authz.can_access_clinic(&ctx, &clinic).await);
}

#[tokio::test]
async fn test_doctor_cannot_invite() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let doctor = app.doctor(clinic, "doc@north.test").await;

    let outcome = invitations::create_invitation(&app.state, &doctor, invite(clinic, "x@north.test")).await;
    assert!(outcome.is(FailureKind::Denied));
    assert_eq!(outcome.message, "Access denied. Only clinic administrators can create invitations.");
    assert!(app.fakes.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_notifier_failure_keeps_invitation() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let admin = app.clinic_admin(clinic, "admin@north.test").await;
    app.fakes.notifier.set_failing(true);

    let outcome = invitations::create_invitation(&app.state, &admin, invite(clinic, "x@north.test")).await;
    assert!(outcome.success);
    assert_ne!(outcome.message, "Invitation created and sent successfully");
    let created = outcome.payload.unwrap();
    assert!(app.store().invitations().get_by_token(&created.token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_accepting_twice_fails_distinctly() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let admin = app.clinic_admin(clinic, "admin@north.test").await;
    let user = app.account("grace@north.test", Role::Doctor, Some(clinic)).await;
    let grace = RequestContext::for_user(user);

    let created = invitations::create_invitation(&app.state, &admin, invite(clinic, "grace@north.test")).await;
    // An existing account makes the invite a conflict
    assert!(created.is(FailureKind::Conflict));

    // Store one directly to exercise acceptance by an existing account
    let inviter = admin.user_id().unwrap();
    let invitation = ClinicInvitation::new(clinic, inviter, "grace@north.test", Role::Doctor, Duration::days(7));
    app.store().invitations().create(&invitation).await.unwrap();

    let first = invitations::accept_invitation(&app.state, &grace, &invitation.token).await;
    assert_eq!(first.message, "Invitation accepted successfully");
    let accepted = app.store().invitations().get_by_token(&invitation.token).await.unwrap().unwrap();

    let second = invitations::accept_invitation(&app.state, &grace, &invitation.token).await;
    assert!(!second.success);
    assert_eq!(second.message, "Invitation is no longer valid");

    let unknown = invitations::accept_invitation(&app.state, &grace, &uuid_like()).await;
    assert_eq!(unknown.message, "Invalid invitation token");

    let after = app.store().invitations().get_by_token(&invitation.token).await.unwrap().unwrap();
    assert_eq!(after.status, InvitationStatus::Accepted);
    assert_eq!(after.accepted_at, accepted.accepted_at);
}

#[tokio::test]
async fn test_expired_invitation_is_marked_lazily() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let inviter = app.account("admin@north.test", Role::ClinicAdmin, Some(clinic)).await;
    let mut invitation = ClinicInvitation::new(clinic, inviter, "late@north.test", Role::Doctor, Duration::days(7));
    invitation.expires_at = Utc::now() - Duration::hours(1);
    app.store().invitations().create(&invitation).await.unwrap();

    let lookup = invitations::get_invitation(&app.state, &invitation.token).await;
    assert_eq!(lookup.message, "Invitation not found or no longer valid");

    let stored = app.store().invitations().get_by_token(&invitation.token).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);

    let signup = invitations::register_with_invitation(
        &app.state,
        register(&invitation.token, "late@north.test", None),
    )
    .await;
    assert!(signup.is(FailureKind::Validation));
    assert!(app.store().users().get_by_email("late@north.test").await.unwrap().is_none());
}

#[tokio::test]
async fn test_register_rejects_clinic_mismatch() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let other = app.clinic("South").await;
    let admin = app.clinic_admin(clinic, "admin@north.test").await;
    let token = invitations::create_invitation(&app.state, &admin, invite(clinic, "new@north.test"))
        .await
        .payload
        .unwrap()
        .token;

    let outcome =
        invitations::register_with_invitation(&app.state, register(&token, "new@north.test", Some(other))).await;
    assert!(outcome.is(FailureKind::Denied));
    assert_eq!(outcome.message, "Invalid clinic assignment. Registration denied.");

    let wrong_email =
        invitations::register_with_invitation(&app.state, register(&token, "someone@else.test", None)).await;
    assert_eq!(
        wrong_email.message,
        "Registration requires a valid invitation. Please contact your clinic administrator."
    );

    let invitation = app.store().invitations().get_by_token(&token).await.unwrap().unwrap();
    assert_eq!(invitation.status, InvitationStatus::Pending);
}

#[tokio::test]
async fn test_malformed_token_lookup() {
    let app = TestApp::new().await;
    let outcome = invitations::get_invitation(&app.state, "short").await;
    assert_eq!(outcome.message, "Invalid invitation token format");
}

#[tokio::test]
async fn test_login_failures_look_alike() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let admin = app.clinic_admin(clinic, "admin@north.test").await;
    let token = invitations::create_invitation(&app.state, &admin, invite(clinic, "new@north.test"))
        .await
        .payload
        .unwrap()
        .token;
    let user = invitations::register_with_invitation(&app.state, register(&token, "new@north.test", None))
        .await
        .payload
        .unwrap()
        .user_id;

    let login = |email: &str, password: &str| Login {
        email: email.into(),
        password: password.into(),
    };

    let unknown = accounts::login(&app.state, login("ghost@north.test", "Sup3rSecret")).await;
    let wrong = accounts::login(&app.state, login("new@north.test", "Wr0ngPassword")).await;
    assert!(unknown.is(FailureKind::Unauthenticated));
    assert_eq!(unknown.message, wrong.message);

    app.store()
        .users()
        .set_status(user, follix_auth::AccountStatus::Disabled)
        .await
        .unwrap();
    let disabled = accounts::login(&app.state, login("new@north.test", "Sup3rSecret")).await;
    assert_eq!(disabled.message, "Account is disabled. Please contact your administrator.");
}

fn uuid_like() -> String {
    "00000000-0000-4000-8000-000000000000".to_string()
}

#[tokio::test]
async fn test_accepting_applies_invited_role() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let inviter = app.account("admin@north.test", Role::ClinicAdmin, Some(clinic)).await;
    let user = app.account("grace@north.test", Role::Doctor, Some(clinic)).await;
    let invitation = ClinicInvitation::new(clinic, inviter, "grace@north.test", Role::ClinicAdmin, Duration::days(7));
    app.store().invitations().create(&invitation).await.unwrap();

    let before = RequestContext::for_user(user);
    assert!(!app.state.authz.is_clinic_admin(&before).await);

    let accepted = invitations::accept_invitation(&app.state, &before, &invitation.token).await;
    assert!(accepted.success, "{}", accepted.message);

    let after = RequestContext::for_user(user);
    assert!(app.state.authz.is_clinic_admin(&after).await);
    let stored = app.store().users().get_by_id(user).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::ClinicAdmin);
    assert_eq!(stored.clinic_id, Some(clinic));
}

#[tokio::test]
async fn test_register_marks_expired_invitation() {
    let app = TestApp::new().await;
    let clinic = app.clinic("North").await;
    let inviter = app.account("admin@north.test", Role::ClinicAdmin, Some(clinic)).await;
    let mut invitation = ClinicInvitation::new(clinic, inviter, "late@north.test", Role::Doctor, Duration::days(7));
    invitation.expires_at = Utc::now() - Duration::minutes(5);
    app.store().invitations().create(&invitation).await.unwrap();

    let signup = invitations::register_with_invitation(
        &app.state,
        register(&invitation.token, "late@north.test", Some(clinic)),
    )
    .await;
    assert!(signup.is(FailureKind::Validation));

    let stored = app.store().invitations().get_by_token(&invitation.token).await.unwrap().unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);
    assert!(app.store().users().get_by_email("late@north.test").await.unwrap().is_none());
}
