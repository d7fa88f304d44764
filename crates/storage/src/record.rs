use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use holist_core::{ClaimStatus, VerificationMethod};

/// A single claim initiation: one user's attempt to prove ownership of
/// one server via one verification method.
///
/// Timestamps serialize as RFC 3339.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: String,
    pub server_id: String,
    pub user_id: String,
    pub method: VerificationMethod,
    /// Opaque verification token; minted fresh for every initiation,
    /// never reused.
    pub token: String,
    pub status: ClaimStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub initiated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub attempt_count: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<OffsetDateTime>,
    /// Set when the claim reaches VERIFIED, EXPIRED, or CLAIMED_BY_OTHER.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Set when the claim reaches CANCELLED.
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
}

impl ClaimRecord {
    /// PENDING and not yet past the TTL horizon.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.status == ClaimStatus::Pending && self.expires_at > now
    }

    /// Past the TTL horizon, whatever the stored status says.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }

    /// Stored status with read-time expiry derivation applied.
    pub fn effective_status(&self, now: OffsetDateTime) -> ClaimStatus {
        holist_core::effective_status(self.status, self.expires_at, now)
    }
}

/// The directory listing's ownership-relevant fields, held by the store
/// as external-collaborator data. Ownership transfer is guarded by the
/// `version` counter: `UPDATE WHERE version = expected_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    /// Hostname or IP address, optionally `host:port`.
    pub host: String,
    pub port: u16,
    pub website_url: Option<String>,
    pub owner_id: Option<String>,
    pub owner_username: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub verified_at: Option<OffsetDateTime>,
    pub verification_method: Option<VerificationMethod>,
    /// OCC counter, incremented on every ownership mutation.
    pub version: i64,
}

impl ServerRecord {
    /// Owned and verified — no further claims may be initiated.
    pub fn is_verified(&self) -> bool {
        self.owner_id.is_some() && self.verified_at.is_some()
    }
}

/// Claimant identity fields the subsystem consults (EMAIL availability).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
}

/// One row per verification attempt, successful or not. Feeds the
/// sliding-window rate limit and the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: String,
    pub claim_id: String,
    pub server_id: String,
    pub user_id: String,
    pub method: VerificationMethod,
    pub successful: bool,
    pub failure_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub attempted_at: OffsetDateTime,
}

/// Audit record for administrative overrides (invalidate, approve).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub admin_id: String,
    /// Action name, e.g. `invalidate_claim` or `approve_claim`.
    pub action: String,
    pub claim_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}
