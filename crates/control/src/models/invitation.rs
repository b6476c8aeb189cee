//! Clinic invitation model
//!
//! Invitations let a clinic admin bring staff into their clinic. The role and
//! clinic are fixed on the invitation; the invitee cannot choose either.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use follix_auth::{ClinicId, Role, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ControlError, Result};

/// Length of a hyphenated invitation token
pub const INVITATION_TOKEN_LEN: usize = 36;

/// Default time until an invitation lapses
pub const DEFAULT_INVITATION_TTL_DAYS: i64 = 7;

/// Clinic invitation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicInvitation {
    /// Unique invitation ID
    pub id: String,
    /// Clinic being joined
    pub clinic_id: ClinicId,
    /// Admin who sent the invitation
    pub invited_by: UserId,
    /// Invitee email (lowercase)
    pub email: String,
    /// Role granted on acceptance
    pub role: Role,
    /// Secret token carried in the accept link
    pub token: String,
    /// Invitation status
    pub status: InvitationStatus,
    /// When the invitation lapses
    pub expires_at: DateTime<Utc>,
    /// When the invitation was created
    pub created_at: DateTime<Utc>,
    /// When the invitation was accepted
    pub accepted_at: Option<DateTime<Utc>>,
    /// Account that accepted
    pub accepted_by: Option<UserId>,
}

/// Invitation status
///
/// `pending -> {accepted, expired}`; both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    /// Waiting for the invitee
    Pending,
    /// Invitee joined the clinic
    Accepted,
    /// Lapsed before acceptance
    Expired,
}

impl InvitationStatus {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Expired => "expired",
        }
    }

    /// Transition table
    pub fn can_transition_to(&self, next: InvitationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted) | (Self::Pending, Self::Expired)
        )
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ClinicInvitation {
    /// Create a new invitation expiring after `ttl`
    pub fn new(clinic_id: ClinicId, invited_by: UserId, email: &str, role: Role, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: format!("inv_{}", Uuid::new_v4().simple()),
            clinic_id,
            invited_by,
            email: email.trim().to_lowercase(),
            role,
            token: Uuid::new_v4().to_string(),
            status: InvitationStatus::Pending,
            expires_at: now + ttl,
            created_at: now,
            accepted_at: None,
            accepted_by: None,
        }
    }

    /// Check if the expiry time has passed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Pending and not yet expired
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired_at(now)
    }

    /// Mark accepted by `user`
    pub fn accept(&mut self, user: UserId, at: DateTime<Utc>) -> Result<()> {
        self.advance(InvitationStatus::Accepted)?;
        self.accepted_at = Some(at);
        self.accepted_by = Some(user);
        Ok(())
    }

    /// Mark expired
    pub fn expire(&mut self) -> Result<()> {
        self.advance(InvitationStatus::Expired)
    }

    fn advance(&mut self, next: InvitationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ControlError::transition("invitation", self.status.as_str(), next.as_str()));
        }
        self.status = next;
        Ok(())
    }
}

/// Shape check for a token taken from a URL
pub fn is_well_formed_token(token: &str) -> bool {
    token.len() == INVITATION_TOKEN_LEN
}
