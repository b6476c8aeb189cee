//! Follix repositories
//!
//! Database access layer. Each repository borrows the store's database and
//! opens a connection per call.
//!
//! Optional columns are written with `NULLIF(?n, '')` so an absent value is
//! stored as NULL; the row helpers below read NULL and `''` back as `None`.

mod analysis;
mod billing;
mod calibration;
mod clinics;
mod invitations;
mod patients;
mod users;

pub use analysis::AnalysisRepo;
pub use billing::BillingRepo;
pub use calibration::CalibrationRepo;
pub use clinics::ClinicRepo;
pub use invitations::InvitationRepo;
pub use patients::PatientRepo;
pub use users::UserRepo;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{ControlError, Result};

/// Storage format for calendar dates
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Row helpers
// =============================================================================

/// Required text column
pub(crate) fn text(row: &turso::Row, idx: usize, field: &'static str) -> Result<String> {
    opt_text(row, idx)?.ok_or_else(|| ControlError::invalid(field, "missing value"))
}

/// Nullable text column
pub(crate) fn opt_text(row: &turso::Row, idx: usize) -> Result<Option<String>> {
    Ok(row.get_value(idx)?.as_text().filter(|s| !s.is_empty()).cloned())
}

/// Nullable integer column
pub(crate) fn opt_int(row: &turso::Row, idx: usize) -> Result<Option<i64>> {
    Ok(row.get_value(idx)?.as_integer().copied())
}

/// Required integer column
pub(crate) fn int(row: &turso::Row, idx: usize, field: &'static str) -> Result<i64> {
    opt_int(row, idx)?.ok_or_else(|| ControlError::invalid(field, "missing value"))
}

/// Required id column parsed with the id type's own parser
pub(crate) fn id<T>(
    row: &turso::Row,
    idx: usize,
    field: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<T> {
    let raw = text(row, idx, field)?;
    parse(&raw).ok_or_else(|| ControlError::invalid(field, format!("malformed id: {}", raw)))
}

/// Nullable id column
pub(crate) fn opt_id<T>(
    row: &turso::Row,
    idx: usize,
    field: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    match opt_text(row, idx)? {
        Some(raw) => parse(&raw)
            .map(Some)
            .ok_or_else(|| ControlError::invalid(field, format!("malformed id: {}", raw))),
        None => Ok(None),
    }
}

/// Required RFC 3339 timestamp column
pub(crate) fn timestamp(row: &turso::Row, idx: usize, field: &'static str) -> Result<DateTime<Utc>> {
    parse_timestamp(&text(row, idx, field)?, field)
}

/// Nullable RFC 3339 timestamp column
pub(crate) fn opt_timestamp(
    row: &turso::Row,
    idx: usize,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>> {
    opt_text(row, idx)?
        .map(|raw| parse_timestamp(&raw, field))
        .transpose()
}

/// Nullable calendar date column
pub(crate) fn opt_date(row: &turso::Row, idx: usize, field: &'static str) -> Result<Option<NaiveDate>> {
    opt_text(row, idx)?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|e| ControlError::invalid(field, e.to_string()))
        })
        .transpose()
}

/// Nullable JSON column
pub(crate) fn opt_json(row: &turso::Row, idx: usize) -> Result<Option<serde_json::Value>> {
    opt_text(row, idx)?
        .map(|raw| serde_json::from_str(&raw).map_err(ControlError::from))
        .transpose()
}

fn parse_timestamp(raw: &str, field: &'static str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ControlError::invalid(field, e.to_string()))
}

/// Optional timestamp as a bind parameter (`''` for none)
pub(crate) fn ts_param(value: Option<DateTime<Utc>>) -> String {
    value.map(|dt| dt.to_rfc3339()).unwrap_or_default()
}

/// Optional date as a bind parameter (`''` for none)
pub(crate) fn date_param(value: Option<NaiveDate>) -> String {
    value.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default()
}
