//! Account repository
//!
//! Accounts are hard-deleted; deactivation goes through `set_status`.

use chrono::Utc;
use follix_auth::{AccountStatus, ClinicId, Role, UserId};
use tracing::{debug, info};
use turso::{Connection, Database};

use super::{id, opt_id, opt_text, text, timestamp};
use crate::error::{ControlError, Result, unique_or};
use crate::models::{Account, normalize_email};

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, role, clinic_id, status, created_at, updated_at";

/// Account repository
pub struct UserRepo<'a> {
    db: &'a Database,
}

impl<'a> UserRepo<'a> {
    /// Create a new user repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Insert an account
    ///
    /// Fails with `AlreadyExists` when the email is taken.
    pub async fn create(&self, account: &Account) -> Result<()> {
        let conn = self.db.connect()?;
        insert_account(&conn, account).await?;

        info!(user_id = %account.id, email = %account.email, role = %account.role, "Created user");
        Ok(())
    }

    /// Get an account by ID
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<Account>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let mut rows = conn.query(&sql, [id.to_string().as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    /// Get an account by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
        let mut rows = conn.query(&sql, [normalize_email(email).as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    /// List every account, newest first
    pub async fn list(&self) -> Result<Vec<Account>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM users ORDER BY created_at DESC", USER_COLUMNS);
        let mut rows = conn.query(&sql, ()).await?;

        let mut accounts = Vec::new();
        while let Some(row) = rows.next().await? {
            accounts.push(row_to_account(&row)?);
        }
        Ok(accounts)
    }

    /// List the accounts bound to a clinic
    pub async fn list_for_clinic(&self, clinic_id: ClinicId) -> Result<Vec<Account>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM users WHERE clinic_id = ?1 ORDER BY created_at DESC",
            USER_COLUMNS
        );
        let mut rows = conn.query(&sql, [clinic_id.to_string().as_str()]).await?;

        let mut accounts = Vec::new();
        while let Some(row) = rows.next().await? {
            accounts.push(row_to_account(&row)?);
        }
        Ok(accounts)
    }

    /// Activate or disable an account
    pub async fn set_status(&self, id: UserId, status: AccountStatus) -> Result<()> {
        let conn = self.db.connect()?;
        let id_str = id.to_string();
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                "UPDATE users SET status = ?1, updated_at = ?2 WHERE id = ?3",
                [status.as_str(), now.as_str(), id_str.as_str()],
            )
            .await?;

        if changed == 0 {
            return Err(ControlError::not_found("user", id_str));
        }

        info!(user_id = %id, status = %status, "Changed user status");
        Ok(())
    }

    /// Delete an account
    pub async fn delete(&self, id: UserId) -> Result<()> {
        let conn = self.db.connect()?;
        let id_str = id.to_string();

        let changed = conn
            .execute("DELETE FROM users WHERE id = ?1", [id_str.as_str()])
            .await?;

        if changed == 0 {
            return Err(ControlError::not_found("user", id_str));
        }

        debug!(user_id = %id, "Deleted user");
        Ok(())
    }

    /// Count accounts holding `role`
    pub async fn count_with_role(&self, role: Role) -> Result<u64> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM users WHERE role = ?1", [role.as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let count: i64 = row.get(0)?;
                Ok(count as u64)
            }
            None => Ok(0),
        }
    }
}

/// Insert an account on an existing connection
pub(crate) async fn insert_account(conn: &Connection, account: &Account) -> Result<()> {
    let id = account.id.to_string();
    let clinic_id = account.clinic_id.map(|c| c.to_string()).unwrap_or_default();

    conn.execute(
        r#"
        INSERT INTO users (
            id, email, password_hash, first_name, last_name, role,
            clinic_id, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULLIF(?7, ''), ?8, ?9, ?10)
        "#,
        [
            id.as_str(),
            account.email.as_str(),
            account.password_hash.as_str(),
            account.first_name.as_str(),
            account.last_name.as_str(),
            account.role.as_str(),
            clinic_id.as_str(),
            account.status.as_str(),
            account.created_at.to_rfc3339().as_str(),
            account.updated_at.to_rfc3339().as_str(),
        ],
    )
    .await
    .map_err(unique_or("user", &account.email))?;

    Ok(())
}

fn row_to_account(row: &turso::Row) -> Result<Account> {
    let role_raw = text(row, 5, "user.role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| ControlError::invalid("user.role", format!("unknown role: {}", role_raw)))?;
    let status = opt_text(row, 7)?
        .and_then(|s| AccountStatus::parse(&s))
        .unwrap_or(AccountStatus::Disabled);

    Ok(Account {
        id: id(row, 0, "user.id", UserId::parse)?,
        email: text(row, 1, "user.email")?,
        password_hash: text(row, 2, "user.password_hash")?,
        first_name: opt_text(row, 3)?.unwrap_or_default(),
        last_name: opt_text(row, 4)?.unwrap_or_default(),
        role,
        clinic_id: opt_id(row, 6, "user.clinic_id", ClinicId::parse)?,
        status,
        created_at: timestamp(row, 8, "user.created_at")?,
        updated_at: timestamp(row, 9, "user.updated_at")?,
    })
}
