//! Database connection and schema management
//!
//! Uses Turso (async SQLite-compatible). One database holds every tenant;
//! tenant isolation is enforced above this layer by the authorizer, and
//! every tenant-owned table carries its owning foreign key.

use tracing::info;
use turso::{Builder, Connection, Database};

use crate::error::{ControlError, Result};

/// Follix database handle
///
/// Cheap to share behind an `Arc`; each repository call opens its own
/// connection.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) a file-backed store
    ///
    /// Creates the parent directory if needed and applies the schema.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ControlError::invalid("database.path", format!("failed to create directory: {}", e))
            })?;
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| ControlError::invalid("database.path", "path is not valid UTF-8"))?;
        info!(path = %path_str, "Opening database");

        let db = Builder::new_local(path_str).build().await?;
        let store = Self { db };
        store.init_schema().await?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    /// Underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Initialize the schema
    async fn init_schema(&self) -> Result<()> {
        let conn = self.db.connect()?;

        // === Tenants and accounts ===
        conn.execute(SCHEMA_CLINICS, ()).await?;
        conn.execute(SCHEMA_USERS, ()).await?;
        conn.execute(INDEX_USERS_CLINIC, ()).await?;

        // === Clinical data ===
        conn.execute(SCHEMA_PATIENTS, ()).await?;
        conn.execute(INDEX_PATIENTS_CLINIC, ()).await?;
        conn.execute(SCHEMA_SESSIONS, ()).await?;
        conn.execute(INDEX_SESSIONS_PATIENT, ()).await?;
        conn.execute(SCHEMA_JOBS, ()).await?;
        conn.execute(INDEX_JOBS_SESSION, ()).await?;
        conn.execute(SCHEMA_CALIBRATION, ()).await?;
        conn.execute(INDEX_CALIBRATION_CLINIC_NAME, ()).await?;

        // === Onboarding ===
        conn.execute(SCHEMA_INVITATIONS, ()).await?;
        conn.execute(INDEX_INVITATIONS_EMAIL, ()).await?;

        // === Billing ===
        conn.execute(SCHEMA_PLANS, ()).await?;
        conn.execute(SCHEMA_SUBSCRIPTIONS, ()).await?;
        conn.execute(INDEX_SUBSCRIPTIONS_CLINIC, ()).await?;
        conn.execute(SCHEMA_PAYMENTS, ()).await?;
        conn.execute(INDEX_PAYMENTS_SUBSCRIPTION, ()).await?;

        info!("Database schema initialized");
        Ok(())
    }
}

/// Start a write transaction on `conn`
pub(crate) async fn begin(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN", ()).await?;
    Ok(())
}

/// Commit on success, roll back on error
pub(crate) async fn finish<T>(conn: &Connection, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            conn.execute("COMMIT", ()).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

// =============================================================================
// Schema - Tenants and accounts
// =============================================================================

const SCHEMA_CLINICS: &str = r#"
CREATE TABLE IF NOT EXISTS clinics (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const SCHEMA_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    role TEXT NOT NULL,
    clinic_id TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const INDEX_USERS_CLINIC: &str = "CREATE INDEX IF NOT EXISTS idx_users_clinic ON users(clinic_id)";

// =============================================================================
// Schema - Clinical data
// =============================================================================

// clinic_patient_id is NULL when not supplied so the composite UNIQUE only
// applies to real values.
const SCHEMA_PATIENTS: &str = r#"
CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    clinic_id TEXT NOT NULL,
    clinic_patient_id TEXT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    date_of_birth TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (clinic_id, clinic_patient_id),
    FOREIGN KEY (clinic_id) REFERENCES clinics(id)
)
"#;

const INDEX_PATIENTS_CLINIC: &str =
    "CREATE INDEX IF NOT EXISTS idx_patients_clinic ON patients(clinic_id)";

const SCHEMA_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS analysis_sessions (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    created_by TEXT NOT NULL,
    session_date TEXT NOT NULL,
    status TEXT NOT NULL,
    final_report TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (patient_id) REFERENCES patients(id)
)
"#;

const INDEX_SESSIONS_PATIENT: &str =
    "CREATE INDEX IF NOT EXISTS idx_sessions_patient ON analysis_sessions(patient_id)";

const SCHEMA_JOBS: &str = r#"
CREATE TABLE IF NOT EXISTS analysis_jobs (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    patient_id TEXT NOT NULL,
    calibration_profile_id TEXT NOT NULL,
    created_by TEXT NOT NULL,
    location_tag TEXT NOT NULL,
    image_storage_key TEXT NOT NULL,
    annotated_image_key TEXT,
    status TEXT NOT NULL,
    result TEXT,
    doctor_notes TEXT,
    error_message TEXT,
    processing_time_ms INTEGER,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    FOREIGN KEY (session_id) REFERENCES analysis_sessions(id),
    FOREIGN KEY (patient_id) REFERENCES patients(id)
)
"#;

const INDEX_JOBS_SESSION: &str =
    "CREATE INDEX IF NOT EXISTS idx_jobs_session ON analysis_jobs(session_id)";

const SCHEMA_CALIBRATION: &str = r#"
CREATE TABLE IF NOT EXISTS calibration_profiles (
    id TEXT PRIMARY KEY,
    clinic_id TEXT NOT NULL,
    name TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{}',
    version INTEGER NOT NULL,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (clinic_id) REFERENCES clinics(id)
)
"#;

const INDEX_CALIBRATION_CLINIC_NAME: &str =
    "CREATE INDEX IF NOT EXISTS idx_calibration_clinic_name ON calibration_profiles(clinic_id, name)";

// =============================================================================
// Schema - Onboarding
// =============================================================================

const SCHEMA_INVITATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS clinic_invitations (
    id TEXT PRIMARY KEY,
    clinic_id TEXT NOT NULL,
    invited_by TEXT NOT NULL,
    email TEXT NOT NULL,
    role TEXT NOT NULL,
    token TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending',
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    accepted_at TEXT,
    accepted_by TEXT,
    FOREIGN KEY (clinic_id) REFERENCES clinics(id)
)
"#;

const INDEX_INVITATIONS_EMAIL: &str =
    "CREATE INDEX IF NOT EXISTS idx_invitations_email ON clinic_invitations(email)";

// =============================================================================
// Schema - Billing
// =============================================================================

const SCHEMA_PLANS: &str = r#"
CREATE TABLE IF NOT EXISTS subscription_plans (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    price_monthly_cents INTEGER NOT NULL,
    currency TEXT NOT NULL,
    max_users INTEGER NOT NULL,
    max_analyses_per_month INTEGER NOT NULL,
    created_at TEXT NOT NULL
)
"#;

const SCHEMA_SUBSCRIPTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY,
    clinic_id TEXT NOT NULL,
    plan_id TEXT NOT NULL,
    status TEXT NOT NULL,
    gateway_reference TEXT,
    current_period_start TEXT,
    current_period_end TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (clinic_id) REFERENCES clinics(id),
    FOREIGN KEY (plan_id) REFERENCES subscription_plans(id)
)
"#;

const INDEX_SUBSCRIPTIONS_CLINIC: &str =
    "CREATE INDEX IF NOT EXISTS idx_subscriptions_clinic ON subscriptions(clinic_id)";

const SCHEMA_PAYMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    subscription_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    currency TEXT NOT NULL,
    status TEXT NOT NULL,
    gateway_reference TEXT,
    processed_at TEXT NOT NULL,
    FOREIGN KEY (subscription_id) REFERENCES subscriptions(id)
)
"#;

const INDEX_PAYMENTS_SUBSCRIPTION: &str =
    "CREATE INDEX IF NOT EXISTS idx_payments_subscription ON payments(subscription_id)";
