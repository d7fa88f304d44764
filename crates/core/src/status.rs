//! Claim lifecycle state machine.
//!
//! A claim initiation starts PENDING and ends in exactly one of four
//! terminal states. Every transition originates from PENDING; terminal
//! states never transition again. Expiry is derived lazily at read time
//! from `expires_at`; the periodic sweep performs the authoritative
//! write-back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Status of a single claim initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Active claim awaiting verification.
    Pending,
    /// Verification succeeded; the claimant became the server owner.
    Verified,
    /// The TTL horizon passed before verification completed.
    Expired,
    /// The claimant (or an administrator) cancelled the claim.
    Cancelled,
    /// A competing claim on the same server verified first.
    ClaimedByOther,
}

impl ClaimStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        self != ClaimStatus::Pending
    }

    /// Wire name, e.g. `CLAIMED_BY_OTHER`.
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Verified => "VERIFIED",
            ClaimStatus::Expired => "EXPIRED",
            ClaimStatus::Cancelled => "CANCELLED",
            ClaimStatus::ClaimedByOther => "CLAIMED_BY_OTHER",
        }
    }

    /// Human-readable name for UI display.
    pub fn display_name(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "Pending",
            ClaimStatus::Verified => "Verified",
            ClaimStatus::Expired => "Expired",
            ClaimStatus::Cancelled => "Cancelled",
            ClaimStatus::ClaimedByOther => "Claimed by Other",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ClaimStatus::Pending),
            "VERIFIED" => Ok(ClaimStatus::Verified),
            "EXPIRED" => Ok(ClaimStatus::Expired),
            "CANCELLED" => Ok(ClaimStatus::Cancelled),
            "CLAIMED_BY_OTHER" => Ok(ClaimStatus::ClaimedByOther),
            other => Err(format!("unknown claim status '{}'", other)),
        }
    }
}

/// Events that drive a claim through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimEvent {
    /// A probe confirmed the proof.
    VerificationSucceeded,
    /// A probe did not confirm the proof; the claim stays PENDING with an
    /// incremented attempt count.
    VerificationFailed,
    /// The claimant cancelled.
    Cancel,
    /// The TTL horizon passed (lazy read or sweep write-back).
    Expire,
    /// A competing claim on the same server verified first.
    ClaimedByOther,
    /// An administrator forced the claim closed.
    AdminInvalidate,
    /// An administrator manually verified the claim (EMAIL method).
    AdminApprove,
}

/// A transition was requested that the table does not permit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("claim in terminal status {status} cannot transition on {event:?}")]
pub struct TransitionError {
    pub status: ClaimStatus,
    pub event: ClaimEvent,
}

/// Apply the transition table: returns the status after `event`.
///
/// Every event requires the claim to be PENDING. `VerificationFailed` is
/// the one PENDING-preserving event; all others move to a terminal state.
pub fn next_status(current: ClaimStatus, event: ClaimEvent) -> Result<ClaimStatus, TransitionError> {
    if current.is_terminal() {
        return Err(TransitionError {
            status: current,
            event,
        });
    }
    Ok(match event {
        ClaimEvent::VerificationSucceeded | ClaimEvent::AdminApprove => ClaimStatus::Verified,
        ClaimEvent::VerificationFailed => ClaimStatus::Pending,
        ClaimEvent::Cancel | ClaimEvent::AdminInvalidate => ClaimStatus::Cancelled,
        ClaimEvent::Expire => ClaimStatus::Expired,
        ClaimEvent::ClaimedByOther => ClaimStatus::ClaimedByOther,
    })
}

/// Read-time status derivation: a stored PENDING claim whose horizon has
/// passed reads as EXPIRED without requiring a prior write.
pub fn effective_status(
    stored: ClaimStatus,
    expires_at: OffsetDateTime,
    now: OffsetDateTime,
) -> ClaimStatus {
    if stored == ClaimStatus::Pending && now > expires_at {
        ClaimStatus::Expired
    } else {
        stored
    }
}

/// Percentage of the claim's TTL still remaining, clamped to 0..=100.
///
/// 100 at `initiated_at`, 0 at `expires_at`, monotonically decreasing
/// between. A degenerate window (`expires_at <= initiated_at`) reads 0.
pub fn time_remaining_percent(
    initiated_at: OffsetDateTime,
    expires_at: OffsetDateTime,
    now: OffsetDateTime,
) -> u8 {
    let window = (expires_at - initiated_at).whole_seconds();
    if window <= 0 {
        return 0;
    }
    let remaining = (expires_at - now).whole_seconds();
    let percent = 100 * remaining / window;
    percent.clamp(0, 100) as u8
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
