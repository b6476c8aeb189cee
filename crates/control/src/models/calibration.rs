//! Calibration profile model
//!
//! Profiles are versioned per (clinic, name). At most one version of a name
//! is `Active` in a clinic; older versions are `Retired` and kept for the
//! jobs that reference them.

use std::fmt;

use chrono::{DateTime, Utc};
use follix_auth::{ClinicId, ProfileId};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Longest accepted profile name
pub const MAX_PROFILE_NAME_LEN: usize = 100;

/// Profile lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileState {
    /// Usable for new analysis jobs
    Active,
    /// Superseded or deactivated
    Retired,
}

impl ProfileState {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retired => "retired",
        }
    }
}

impl fmt::Display for ProfileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Calibration profile entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Unique identifier
    pub id: ProfileId,
    /// Owning clinic
    pub clinic_id: ClinicId,
    /// Profile name
    pub name: String,
    /// Device calibration parameters
    pub data: serde_json::Value,
    /// Version within (clinic, name), starting at 1
    pub version: i64,
    /// Lifecycle state
    pub state: ProfileState,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl CalibrationProfile {
    /// Create a new active profile
    ///
    /// The version is assigned by the repository on insert.
    pub fn new(clinic_id: ClinicId, name: &str, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: ProfileId::new(),
            clinic_id,
            name: name.trim().to_string(),
            data,
            version: 0,
            state: ProfileState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether new jobs may use this profile
    pub fn is_active(&self) -> bool {
        self.state == ProfileState::Active
    }

    /// Take the profile out of service
    pub fn retire(&mut self) -> Result<()> {
        if self.state == ProfileState::Retired {
            return Err(ControlError::transition("calibration profile", "retired", "retired"));
        }
        self.state = ProfileState::Retired;
        self.updated_at = Utc::now();
        Ok(())
    }
}
