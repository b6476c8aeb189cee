//! Login

use follix_auth::password::{verify_decoy, verify_password};
use follix_auth::{AccountStatus, ClinicId, Role, UserId};
use follix_control::models::normalize_email;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::outcome::{Failure, HandlerResult, Outcome};
use crate::state::AppState;

const BAD_CREDENTIALS: &str = "Invalid email or password";

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

/// Logged-in account
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub clinic_id: Option<ClinicId>,
}

/// Issued bearer token
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Unix timestamp
    pub expires_at: i64,
    pub user: UserInfo,
}

/// Verify credentials and issue a token
///
/// Unknown email and wrong password give the same answer and cost the
/// same Argon2 verification.
pub async fn login(state: &AppState, req: Login) -> Outcome<LoginResponse> {
    state.settle(try_login(state, req).await)
}

async fn try_login(state: &AppState, req: Login) -> HandlerResult<LoginResponse> {
    let email = normalize_email(&req.email);
    let Some(account) = state.store.users().get_by_email(&email).await? else {
        warn!(email = %email, "Login for unknown email");
        verify_decoy(&req.password);
        return Err(Failure::Unauthenticated {
            message: BAD_CREDENTIALS,
        });
    };

    let matches = verify_password(&req.password, &account.password_hash)
        .map_err(|e| Failure::internal("Password verification failed", e))?;
    if !matches {
        warn!(user_id = %account.id, "Login with wrong password");
        return Err(Failure::Unauthenticated {
            message: BAD_CREDENTIALS,
        });
    }

    if account.status == AccountStatus::Disabled {
        warn!(user_id = %account.id, "Login to disabled account");
        return Err(Failure::Unauthenticated {
            message: "Account is disabled. Please contact your administrator.",
        });
    }

    let issued = state
        .tokens
        .issue(&account.to_actor())
        .map_err(|e| Failure::internal("Token issuing failed", e))?;

    info!(user_id = %account.id, role = %account.role.as_str(), "User logged in");
    Ok(Outcome::success(
        "Login successful",
        LoginResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            user: UserInfo {
                id: account.id,
                full_name: account.full_name(),
                email: account.email,
                role: account.role,
                clinic_id: account.clinic_id,
            },
        },
    ))
}
