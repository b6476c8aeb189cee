//! Clinic invitation repository
//!
//! Status writes are guarded on `status = 'pending'`, so an invitation can be
//! consumed at most once even under concurrent accepts.

use chrono::{DateTime, Utc};
use follix_auth::{ClinicId, Role, UserId};
use tracing::{debug, info};
use turso::{Connection, Database};

use super::users::insert_account;
use super::{id, opt_id, opt_timestamp, text, timestamp};
use crate::db::{begin, finish};
use crate::error::{ControlError, Result};
use crate::models::{Account, ClinicInvitation, InvitationStatus};

const INVITATION_COLUMNS: &str = "id, clinic_id, invited_by, email, role, token, status, expires_at, created_at, accepted_at, accepted_by";

/// Repository for clinic invitations
pub struct InvitationRepo<'a> {
    db: &'a Database,
}

impl<'a> InvitationRepo<'a> {
    /// Create a new invitation repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert an invitation
    pub async fn create(&self, invitation: &ClinicInvitation) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            r#"
            INSERT INTO clinic_invitations (
                id, clinic_id, invited_by, email, role, token, status,
                expires_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            [
                invitation.id.as_str(),
                invitation.clinic_id.to_string().as_str(),
                invitation.invited_by.to_string().as_str(),
                invitation.email.as_str(),
                invitation.role.as_str(),
                invitation.token.as_str(),
                invitation.status.as_str(),
                invitation.expires_at.to_rfc3339().as_str(),
                invitation.created_at.to_rfc3339().as_str(),
            ],
        )
        .await?;

        info!(
            invitation_id = %invitation.id,
            clinic_id = %invitation.clinic_id,
            role = %invitation.role,
            "Created invitation"
        );
        Ok(())
    }

    /// Get an invitation by token
    pub async fn get_by_token(&self, token: &str) -> Result<Option<ClinicInvitation>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM clinic_invitations WHERE token = ?1", INVITATION_COLUMNS);
        let mut rows = conn.query(&sql, [token]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_invitation(&row)?)),
            None => Ok(None),
        }
    }

    /// Pending invitations of a clinic, newest first
    pub async fn list_pending_for_clinic(&self, clinic_id: ClinicId) -> Result<Vec<ClinicInvitation>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM clinic_invitations WHERE clinic_id = ?1 AND status = ?2 ORDER BY created_at DESC",
            INVITATION_COLUMNS
        );
        let mut rows = conn
            .query(
                &sql,
                [clinic_id.to_string().as_str(), InvitationStatus::Pending.as_str()],
            )
            .await?;

        let mut invitations = Vec::new();
        while let Some(row) = rows.next().await? {
            invitations.push(row_to_invitation(&row)?);
        }
        Ok(invitations)
    }

    /// Mark a pending invitation expired
    pub async fn mark_expired(&self, invitation_id: &str) -> Result<()> {
        let conn = self.db.connect()?;
        let changed = conn
            .execute(
                "UPDATE clinic_invitations SET status = ?1 WHERE id = ?2 AND status = ?3",
                [
                    InvitationStatus::Expired.as_str(),
                    invitation_id,
                    InvitationStatus::Pending.as_str(),
                ],
            )
            .await?;

        if changed == 0 {
            return Err(ControlError::transition("invitation", "non-pending", "expired"));
        }

        debug!(invitation_id, "Expired invitation");
        Ok(())
    }

    /// Accept a pending invitation for an existing account
    ///
    /// The account takes the invited role in the same unit.
    pub async fn mark_accepted(&self, invitation_id: &str, user: UserId, role: Role, at: DateTime<Utc>) -> Result<()> {
        let conn = self.db.connect()?;
        begin(&conn).await?;
        let outcome = async {
            let user_str = user.to_string();
            let changed = conn
                .execute(
                    "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
                    [role.as_str(), at.to_rfc3339().as_str(), user_str.as_str()],
                )
                .await?;
            if changed == 0 {
                return Err(ControlError::not_found("user", user_str));
            }
            accept_pending(&conn, invitation_id, user, at).await
        }
        .await;
        finish(&conn, outcome).await?;

        info!(invitation_id, user_id = %user, role = role.as_str(), "Accepted invitation");
        Ok(())
    }

    /// Create the invitee's account and consume the invitation atomically
    ///
    /// Rolls back the account if the invitation was consumed concurrently.
    pub async fn register(&self, invitation_id: &str, account: &Account) -> Result<()> {
        let conn = self.db.connect()?;
        begin(&conn).await?;
        let outcome = async {
            insert_account(&conn, account).await?;
            accept_pending(&conn, invitation_id, account.id, account.created_at).await
        }
        .await;
        finish(&conn, outcome).await?;

        info!(invitation_id, user_id = %account.id, "Registered account from invitation");
        Ok(())
    }
}

async fn accept_pending(conn: &Connection, invitation_id: &str, user: UserId, at: DateTime<Utc>) -> Result<()> {
    let changed = conn
        .execute(
            r#"
            UPDATE clinic_invitations SET status = ?1, accepted_at = ?2, accepted_by = ?3
            WHERE id = ?4 AND status = ?5
            "#,
            [
                InvitationStatus::Accepted.as_str(),
                at.to_rfc3339().as_str(),
                user.to_string().as_str(),
                invitation_id,
                InvitationStatus::Pending.as_str(),
            ],
        )
        .await?;

    if changed == 0 {
        return Err(ControlError::transition("invitation", "non-pending", "accepted"));
    }
    Ok(())
}

fn row_to_invitation(row: &turso::Row) -> Result<ClinicInvitation> {
    let role_raw = text(row, 4, "invitation.role")?;
    let role = Role::parse(&role_raw).ok_or_else(|| ControlError::invalid("invitation.role", role_raw))?;
    let status_raw = text(row, 6, "invitation.status")?;
    let status = InvitationStatus::parse(&status_raw)
        .ok_or_else(|| ControlError::invalid("invitation.status", status_raw))?;

    Ok(ClinicInvitation {
        id: text(row, 0, "invitation.id")?,
        clinic_id: id(row, 1, "invitation.clinic_id", ClinicId::parse)?,
        invited_by: id(row, 2, "invitation.invited_by", UserId::parse)?,
        email: text(row, 3, "invitation.email")?,
        role,
        token: text(row, 5, "invitation.token")?,
        status,
        expires_at: timestamp(row, 7, "invitation.expires_at")?,
        created_at: timestamp(row, 8, "invitation.created_at")?,
        accepted_at: opt_timestamp(row, 9, "invitation.accepted_at")?,
        accepted_by: opt_id(row, 10, "invitation.accepted_by", UserId::parse)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::models::Clinic;
    use chrono::Duration;

    async fn setup() -> (Store, ClinicInvitation) {
        let store = Store::new_memory().await.unwrap();
        let clinic = Clinic::new("North Clinic");
        store.clinics().create(&clinic).await.unwrap();

        let invitation = ClinicInvitation::new(clinic.id, UserId::new(), "new@clinic.test", Role::Doctor, Duration::days(7));
        store.invitations().create(&invitation).await.unwrap();
        (store, invitation)
    }

    #[tokio::test]
    async fn test_get_by_token() {
        let (store, invitation) = setup().await;
        let fetched = store.invitations().get_by_token(&invitation.token).await.unwrap().unwrap();

        assert_eq!(fetched.id, invitation.id);
        assert_eq!(fetched.role, Role::Doctor);
        assert_eq!(fetched.status, InvitationStatus::Pending);
        assert!(fetched.accepted_by.is_none());
        assert!(store.invitations().get_by_token("missing").await.unwrap().is_none());
        assert_eq!(
            store.invitations().list_pending_for_clinic(invitation.clinic_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_accept_only_once() {
        let (store, invitation) = setup().await;
        let repo = store.invitations();
        let account = Account::new(
            "new@clinic.test",
            "$argon2id$unused",
            "New",
            "Doc",
            Role::Doctor,
            Some(invitation.clinic_id),
        );
        store.users().create(&account).await.unwrap();

        repo.mark_accepted(&invitation.id, account.id, Role::ClinicAdmin, Utc::now())
            .await
            .unwrap();
        let err = repo
            .mark_accepted(&invitation.id, account.id, Role::Doctor, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));

        let fetched = repo.get_by_token(&invitation.token).await.unwrap().unwrap();
        assert_eq!(fetched.status, InvitationStatus::Accepted);
        assert_eq!(fetched.accepted_by, Some(account.id));
        assert!(repo.mark_expired(&invitation.id).await.is_err());

        // The failed second accept rolled back its role change
        let stored = store.users().get_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.role, Role::ClinicAdmin);
    }

    #[tokio::test]
    async fn test_accept_for_missing_account_keeps_invitation_pending() {
        let (store, invitation) = setup().await;
        let repo = store.invitations();

        let err = repo
            .mark_accepted(&invitation.id, UserId::new(), Role::Doctor, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound { .. }));

        let fetched = repo.get_by_token(&invitation.token).await.unwrap().unwrap();
        assert_eq!(fetched.status, InvitationStatus::Pending);
    }

    #[tokio::test]
    async fn test_register_rolls_back_on_consumed_invitation() {
        let (store, invitation) = setup().await;
        let repo = store.invitations();
        repo.mark_expired(&invitation.id).await.unwrap();

        let account = Account::new("new@clinic.test", "hash", "N", "D", Role::Doctor, Some(invitation.clinic_id));
        assert!(repo.register(&invitation.id, &account).await.is_err());
        assert!(store.users().get_by_id(account.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_creates_account() {
        let (store, invitation) = setup().await;
        let account = Account::new("new@clinic.test", "hash", "N", "D", Role::Doctor, Some(invitation.clinic_id));

        store.invitations().register(&invitation.id, &account).await.unwrap();

        assert!(store.users().get_by_id(account.id).await.unwrap().is_some());
        let fetched = store.invitations().get_by_token(&invitation.token).await.unwrap().unwrap();
        assert_eq!(fetched.accepted_by, Some(account.id));
    }
}
