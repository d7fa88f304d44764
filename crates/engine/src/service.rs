//! Claim lifecycle service.
//!
//! Orchestrates token issuance, probe execution, and the claim state
//! machine over a `ClaimStore`. Probes run outside storage snapshots;
//! every state transition re-reads the claim under the server's snapshot
//! scope, so a probe result that went stale while in flight is discarded
//! rather than applied.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use holist_core::instructions::{self, ListingRef};
use holist_core::{
    effective_status, next_status, time_remaining_percent, ClaimEvent, ClaimPolicy, ClaimStatus,
    VerificationMethod,
};
use holist_core::token::{issue_token, new_claim_id};
use holist_storage::{
    AttemptRecord, AuditRecord, ClaimRecord, ClaimStore, ServerRecord, StorageError, UserRecord,
};

use crate::error::ClaimError;
use crate::probe::{Probe, ProbeOutcome};

/// Sliding window the attempt budget is counted over.
const ATTEMPT_WINDOW_SECS: u64 = 3600;

/// Sliding window for the daily attempt budget, in seconds.
const DAILY_ATTEMPT_WINDOW_SECS: u64 = 24 * 3600;

// ──────────────────────────────────────────────
// Response shapes
// ──────────────────────────────────────────────

/// One verification method's applicability to a (server, claimant) pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInfo {
    pub method: VerificationMethod,
    pub display_name: &'static str,
    pub description: &'static str,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

/// Result of initiating a claim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateOutcome {
    pub claim_id: String,
    pub server_id: String,
    pub method: VerificationMethod,
    pub verification_token: String,
    pub instructions: String,
    #[serde(with = "time::serde::rfc3339")]
    pub initiated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub claim_token_expiry: OffsetDateTime,
    pub expires_in_seconds: u64,
}

/// Result of a verification attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub claim_id: String,
    pub status: ClaimStatus,
    pub is_verified: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub attempt_count: u32,
}

/// Public claim standing of one server listing, plus the caller's own
/// pending-claim state when an identity accompanies the request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatusResponse {
    pub is_claimed: bool,
    pub is_verified: bool,
    pub owner_id: Option<String>,
    pub owner_username: Option<String>,
    pub verification_method: Option<VerificationMethod>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub verified_at: Option<OffsetDateTime>,
    pub has_pending_claim: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub claim_token_expiry: Option<OffsetDateTime>,
}

/// A claim as presented to claimants and administrators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimView {
    pub claim_id: String,
    pub server_id: String,
    pub server_name: String,
    pub user_id: String,
    pub username: String,
    pub method: VerificationMethod,
    /// Effective status: stored status with read-time expiry applied.
    pub status: ClaimStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub initiated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub claim_token_expiry: OffsetDateTime,
    pub time_remaining_percent: u8,
    pub attempt_count: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<OffsetDateTime>,
}

/// Claims on one server plus the live pending count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimsView {
    pub server_id: String,
    pub pending_count: u64,
    pub claims: Vec<ClaimView>,
}

/// Paginated admin listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPage {
    pub claims: Vec<ClaimView>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

/// Oversight dashboard counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStats {
    pub pending_claims: u64,
    pub expiring_soon_claims: u64,
    pub verified_last_7_days: u64,
    pub total_verified: u64,
    pub total_expired: u64,
    pub total_cancelled: u64,
    pub total_claimed_by_other: u64,
}

// ──────────────────────────────────────────────
// Service
// ──────────────────────────────────────────────

pub struct ClaimService<S: ClaimStore> {
    store: Arc<S>,
    probes: Vec<Arc<dyn Probe>>,
    policy: ClaimPolicy,
}

impl<S: ClaimStore> ClaimService<S> {
    pub fn new(store: Arc<S>, probes: Vec<Arc<dyn Probe>>, policy: ClaimPolicy) -> Self {
        ClaimService {
            store,
            probes,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &ClaimPolicy {
        &self.policy
    }

    fn probe_for(&self, method: VerificationMethod) -> Result<&Arc<dyn Probe>, ClaimError> {
        self.probes
            .iter()
            .find(|p| p.method() == method)
            .ok_or_else(|| {
                ClaimError::validation(format!("verification method {} is not supported", method))
            })
    }

    // ── Method discovery ─────────────────────────────────────────────────

    /// List every verification method with its availability for the given
    /// server and (optionally signed-in) claimant.
    pub async fn available_methods(
        &self,
        server_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<MethodInfo>, ClaimError> {
        let server = self.get_server(server_id).await?;
        let user = match user_id {
            Some(id) => Some(self.get_user(id).await?),
            None => None,
        };

        let mut methods = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let method = probe.method();
            let reason = if server.is_verified() {
                Some("this server has already been claimed".to_string())
            } else {
                probe.unavailable_reason(&server, user.as_ref())
            };
            methods.push(MethodInfo {
                method,
                display_name: method.display_name(),
                description: method.description(),
                available: reason.is_none(),
                unavailable_reason: reason,
            });
        }
        Ok(methods)
    }

    // ── Claim lifecycle ──────────────────────────────────────────────────

    /// Start a claim: mint a fresh token, persist the PENDING record, and
    /// render embedding instructions.
    pub async fn initiate(
        &self,
        server_id: &str,
        user_id: &str,
        method: VerificationMethod,
    ) -> Result<InitiateOutcome, ClaimError> {
        let user = self.get_user(user_id).await?;
        let probe = self.probe_for(method)?;

        let mut snapshot = self.store.begin_snapshot(server_id).await?;
        let server = match self.store.get_server_for_update(&mut snapshot).await {
            Ok(server) => server,
            Err(StorageError::ServerNotFound { .. }) => {
                self.store.abort_snapshot(snapshot).await?;
                return Err(ClaimError::not_found(format!(
                    "server not found: {}",
                    server_id
                )));
            }
            Err(e) => {
                self.store.abort_snapshot(snapshot).await?;
                return Err(e.into());
            }
        };

        if server.is_verified() {
            self.store.abort_snapshot(snapshot).await?;
            return Err(ClaimError::conflict("this server has already been claimed"));
        }
        if let Some(reason) = probe.unavailable_reason(&server, Some(&user)) {
            self.store.abort_snapshot(snapshot).await?;
            return Err(ClaimError::validation(reason));
        }

        let now = OffsetDateTime::now_utc();
        let expires_at = now + Duration::hours(self.policy.ttl_hours);
        // A fresh token on every initiation, never reused from a prior claim.
        let record = ClaimRecord {
            id: new_claim_id(),
            server_id: server_id.to_string(),
            user_id: user_id.to_string(),
            method,
            token: issue_token(),
            status: ClaimStatus::Pending,
            initiated_at: now,
            expires_at,
            attempt_count: 0,
            last_attempt_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        match self.store.insert_claim(&mut snapshot, record.clone()).await {
            Ok(()) => {}
            Err(StorageError::DuplicatePendingClaim { .. }) => {
                self.store.abort_snapshot(snapshot).await?;
                return Err(ClaimError::conflict(
                    "you already have a pending claim for this server; cancel it or let it \
                     expire before starting another",
                ));
            }
            Err(e) => {
                self.store.abort_snapshot(snapshot).await?;
                return Err(e.into());
            }
        }
        self.store.commit_snapshot(snapshot).await?;

        let instructions = instructions::render(
            method,
            ListingRef {
                host: &server.host,
                port: server.port,
                website_url: server.website_url.as_deref(),
            },
            &record.token,
        );

        Ok(InitiateOutcome {
            claim_id: record.id,
            server_id: record.server_id,
            method,
            verification_token: record.token,
            instructions,
            initiated_at: now,
            claim_token_expiry: expires_at,
            expires_in_seconds: (expires_at - now).whole_seconds().max(0) as u64,
        })
    }

    /// Initiation, verification, cancel, and status keyed by server:
    /// the route surface addresses "my claim on this server", so these
    /// resolve the caller's most recent claim first.
    pub async fn claim_status_for(
        &self,
        server_id: &str,
        user_id: &str,
    ) -> Result<ClaimView, ClaimError> {
        let claim = self
            .store
            .find_claim(server_id, user_id)
            .await?
            .ok_or_else(|| {
                ClaimError::not_found(format!("no claim by you on server {}", server_id))
            })?;
        Ok(self.view_of(&claim, OffsetDateTime::now_utc()).await)
    }

    /// Public claim standing of a server. Needs no caller identity;
    /// when one is supplied the response also reports whether that
    /// caller has a live pending claim and when its token lapses.
    pub async fn server_claim_status(
        &self,
        server_id: &str,
        user_id: Option<&str>,
    ) -> Result<ClaimStatusResponse, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let server = self.get_server(server_id).await?;

        let mut has_pending_claim = false;
        let mut claim_token_expiry = None;
        if let Some(user_id) = user_id {
            if let Some(claim) = self.store.find_claim(server_id, user_id).await? {
                if claim.effective_status(now) == ClaimStatus::Pending {
                    has_pending_claim = true;
                    claim_token_expiry = Some(claim.expires_at);
                }
            }
        }

        Ok(ClaimStatusResponse {
            is_claimed: server.owner_id.is_some(),
            is_verified: server.is_verified(),
            owner_id: server.owner_id,
            owner_username: server.owner_username,
            verification_method: server.verification_method,
            verified_at: server.verified_at,
            has_pending_claim,
            claim_token_expiry,
        })
    }

    /// Verify the caller's claim on a server. When `method` is given it
    /// must match the claim's method; a mismatch is a caller mistake,
    /// not a probe failure.
    pub async fn attempt_verification_for(
        &self,
        server_id: &str,
        user_id: &str,
        method: Option<VerificationMethod>,
    ) -> Result<VerificationOutcome, ClaimError> {
        let claim = self
            .store
            .find_claim(server_id, user_id)
            .await?
            .ok_or_else(|| {
                ClaimError::not_found(format!("no claim by you on server {}", server_id))
            })?;
        if let Some(method) = method {
            if claim.method != method {
                return Err(ClaimError::validation(format!(
                    "this claim uses {}, not {}",
                    claim.method, method
                )));
            }
        }
        self.attempt_verification(&claim.id, user_id).await
    }

    /// Cancel the caller's claim on a server.
    pub async fn cancel_for(&self, server_id: &str, user_id: &str) -> Result<ClaimView, ClaimError> {
        let claim = self
            .store
            .find_claim(server_id, user_id)
            .await?
            .ok_or_else(|| {
                ClaimError::not_found(format!("no claim by you on server {}", server_id))
            })?;
        self.cancel(&claim.id, user_id).await
    }

    /// Run the claim's probe and apply the outcome.
    pub async fn attempt_verification(
        &self,
        claim_id: &str,
        user_id: &str,
    ) -> Result<VerificationOutcome, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let claim = self.get_claim(claim_id).await?;
        if claim.user_id != user_id {
            return Err(ClaimError::unauthorized("this claim belongs to another user"));
        }
        match claim.effective_status(now) {
            ClaimStatus::Pending => {}
            ClaimStatus::Expired => {
                return Err(ClaimError::validation(
                    "this claim has expired; start a new claim to try again",
                ))
            }
            other => {
                return Err(ClaimError::validation(format!(
                    "cannot verify a claim in status {}",
                    other
                )))
            }
        }

        let window_start = now - Duration::seconds(ATTEMPT_WINDOW_SECS as i64);
        let recent = self
            .store
            .count_attempts_by_user_since(user_id, window_start)
            .await?;
        if recent >= self.policy.max_attempts_per_hour as u64 {
            return Err(ClaimError::RateLimited {
                retry_after_secs: ATTEMPT_WINDOW_SECS,
            });
        }
        let day_start = now - Duration::seconds(DAILY_ATTEMPT_WINDOW_SECS as i64);
        let today = self
            .store
            .count_attempts_by_user_since(user_id, day_start)
            .await?;
        if today >= self.policy.max_attempts_per_day as u64 {
            return Err(ClaimError::RateLimited {
                retry_after_secs: DAILY_ATTEMPT_WINDOW_SECS,
            });
        }

        let server = self.get_server(&claim.server_id).await?;
        let probe = self.probe_for(claim.method)?;
        // The probe talks to the outside world with no storage scope held.
        let outcome = probe.probe(&server, &claim.token).await;

        self.apply_probe_outcome(claim, outcome).await
    }

    /// Re-read the claim under the server scope and commit the transition
    /// the probe outcome implies. A claim that left PENDING while the
    /// probe was in flight wins over the probe result.
    async fn apply_probe_outcome(
        &self,
        claim: ClaimRecord,
        outcome: ProbeOutcome,
    ) -> Result<VerificationOutcome, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let mut snapshot = self.store.begin_snapshot(&claim.server_id).await?;

        let result = self
            .apply_probe_outcome_inner(&mut snapshot, &claim, outcome, now)
            .await;
        match result {
            Ok(outcome) => {
                self.commit_mapped(snapshot).await?;
                Ok(outcome)
            }
            Err(e) => {
                self.store.abort_snapshot(snapshot).await?;
                Err(e)
            }
        }
    }

    async fn apply_probe_outcome_inner(
        &self,
        snapshot: &mut S::Snapshot,
        claim: &ClaimRecord,
        outcome: ProbeOutcome,
        now: OffsetDateTime,
    ) -> Result<VerificationOutcome, ClaimError> {
        let mut current = self.store.get_claim_for_update(snapshot, &claim.id).await?;
        if current.effective_status(now) != ClaimStatus::Pending {
            // Expired, cancelled, or resolved by a competing actor while
            // the probe ran. The probe result is stale; discard it.
            return Err(ClaimError::conflict(format!(
                "claim state changed during verification (now {})",
                current.effective_status(now)
            )));
        }

        current.attempt_count += 1;
        current.last_attempt_at = Some(now);

        let (successful, failure_reason, is_verified, message) = match &outcome {
            ProbeOutcome::Verified { message } => (true, None, true, message.clone()),
            ProbeOutcome::Failed { reason, message } => {
                (false, Some(reason.as_str().to_string()), false, message.clone())
            }
            ProbeOutcome::ManualReview { message } => {
                (false, Some("MANUAL_REVIEW".to_string()), false, message.clone())
            }
        };

        self.store
            .insert_attempt(
                snapshot,
                AttemptRecord {
                    id: new_claim_id(),
                    claim_id: current.id.clone(),
                    server_id: current.server_id.clone(),
                    user_id: current.user_id.clone(),
                    method: current.method,
                    successful,
                    failure_reason: failure_reason.clone(),
                    attempted_at: now,
                },
            )
            .await?;

        if is_verified {
            self.finalize_verified(snapshot, &mut current, now).await?;
        } else {
            // VerificationFailed keeps the claim PENDING.
            current.status = next_status(current.status, ClaimEvent::VerificationFailed)
                .map_err(|e| ClaimError::validation(e.to_string()))?;
            self.store
                .update_claim(snapshot, ClaimStatus::Pending, current.clone())
                .await?;
        }

        Ok(VerificationOutcome {
            claim_id: current.id.clone(),
            status: current.status,
            is_verified,
            message,
            failure_reason,
            attempt_count: current.attempt_count,
        })
    }

    /// Stage the full success path: claim to VERIFIED, ownership transfer
    /// under OCC, and the CLAIMED_BY_OTHER sweep for competing claims.
    async fn finalize_verified(
        &self,
        snapshot: &mut S::Snapshot,
        current: &mut ClaimRecord,
        now: OffsetDateTime,
    ) -> Result<(), ClaimError> {
        let server = self.store.get_server_for_update(snapshot).await?;
        if server.is_verified() {
            return Err(ClaimError::conflict("this server has already been claimed"));
        }

        current.status = next_status(current.status, ClaimEvent::VerificationSucceeded)
            .map_err(|e| ClaimError::validation(e.to_string()))?;
        current.completed_at = Some(now);
        self.store
            .update_claim(snapshot, ClaimStatus::Pending, current.clone())
            .await?;

        let user = self.get_user(&current.user_id).await?;
        self.store
            .transfer_ownership(
                snapshot,
                server.version,
                &current.user_id,
                &user.username,
                current.method,
                now,
            )
            .await
            .map_err(|e| match e {
                StorageError::ConcurrentConflict { .. } => {
                    ClaimError::conflict("another claim was verified for this server first")
                }
                other => other.into(),
            })?;
        self.store
            .mark_other_pending_claims(snapshot, &current.user_id, now)
            .await?;
        Ok(())
    }

    /// Commit, translating the commit-time race errors into conflicts.
    async fn commit_mapped(&self, snapshot: S::Snapshot) -> Result<(), ClaimError> {
        self.store.commit_snapshot(snapshot).await.map_err(|e| match e {
            StorageError::ConcurrentConflict { .. } | StorageError::StaleClaim { .. } => {
                ClaimError::conflict("a competing update was applied first; re-check the claim")
            }
            other => other.into(),
        })
    }

    /// Cancel the caller's own PENDING claim.
    pub async fn cancel(&self, claim_id: &str, user_id: &str) -> Result<ClaimView, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let claim = self.get_claim(claim_id).await?;
        if claim.user_id != user_id {
            return Err(ClaimError::unauthorized("this claim belongs to another user"));
        }

        let mut snapshot = self.store.begin_snapshot(&claim.server_id).await?;
        let result = self.cancel_inner(&mut snapshot, claim_id, now).await;
        match result {
            Ok(record) => {
                self.commit_mapped(snapshot).await?;
                Ok(self.view_of(&record, now).await)
            }
            Err(e) => {
                self.store.abort_snapshot(snapshot).await?;
                Err(e)
            }
        }
    }

    async fn cancel_inner(
        &self,
        snapshot: &mut S::Snapshot,
        claim_id: &str,
        now: OffsetDateTime,
    ) -> Result<ClaimRecord, ClaimError> {
        let mut current = self.store.get_claim_for_update(snapshot, claim_id).await?;
        match current.effective_status(now) {
            ClaimStatus::Pending => {}
            other => {
                return Err(ClaimError::validation(format!(
                    "cannot cancel a claim in status {}",
                    other
                )))
            }
        }
        current.status = next_status(current.status, ClaimEvent::Cancel)
            .map_err(|e| ClaimError::validation(e.to_string()))?;
        current.cancelled_at = Some(now);
        self.store
            .update_claim(snapshot, ClaimStatus::Pending, current.clone())
            .await?;
        Ok(current)
    }

    /// Current state of one claim, visible to its owner.
    pub async fn claim_status(
        &self,
        claim_id: &str,
        user_id: &str,
    ) -> Result<ClaimView, ClaimError> {
        let claim = self.get_claim(claim_id).await?;
        if claim.user_id != user_id {
            return Err(ClaimError::unauthorized("this claim belongs to another user"));
        }
        Ok(self.view_of(&claim, OffsetDateTime::now_utc()).await)
    }

    /// All of a user's claims, newest first.
    pub async fn user_claims(&self, user_id: &str) -> Result<Vec<ClaimView>, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let claims = self.store.claims_by_user(user_id).await?;
        let mut views = Vec::with_capacity(claims.len());
        for claim in &claims {
            views.push(self.view_of(claim, now).await);
        }
        Ok(views)
    }

    /// The user's claims that are still actionable (effectively PENDING).
    pub async fn active_claims(&self, user_id: &str) -> Result<Vec<ClaimView>, ClaimError> {
        let mut views = self.user_claims(user_id).await?;
        views.retain(|v| v.status == ClaimStatus::Pending);
        Ok(views)
    }

    pub async fn active_claim_count(&self, user_id: &str) -> Result<usize, ClaimError> {
        Ok(self.active_claims(user_id).await?.len())
    }

    /// All claims on one server plus the live pending count.
    pub async fn server_claims(&self, server_id: &str) -> Result<ServerClaimsView, ClaimError> {
        let now = OffsetDateTime::now_utc();
        self.get_server(server_id).await?;
        let claims = self.store.claims_by_server(server_id).await?;
        let pending_count = self.store.count_pending_for_server(server_id, now).await?;
        let mut views = Vec::with_capacity(claims.len());
        for claim in &claims {
            views.push(self.view_of(claim, now).await);
        }
        Ok(ServerClaimsView {
            server_id: server_id.to_string(),
            pending_count,
            claims: views,
        })
    }

    // ── Admin oversight ──────────────────────────────────────────────────

    pub async fn admin_stats(&self) -> Result<ClaimStats, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let expiring = self
            .store
            .claims_expiring_between(
                now,
                now + Duration::hours(self.policy.expiring_soon_hours),
            )
            .await?;
        Ok(ClaimStats {
            pending_claims: self.store.count_by_status(ClaimStatus::Pending).await?,
            expiring_soon_claims: expiring.len() as u64,
            verified_last_7_days: self.store.count_verified_since(now - Duration::days(7)).await?,
            total_verified: self.store.count_by_status(ClaimStatus::Verified).await?,
            total_expired: self.store.count_by_status(ClaimStatus::Expired).await?,
            total_cancelled: self.store.count_by_status(ClaimStatus::Cancelled).await?,
            total_claimed_by_other: self
                .store
                .count_by_status(ClaimStatus::ClaimedByOther)
                .await?,
        })
    }

    pub async fn admin_list_claims(
        &self,
        status: Option<ClaimStatus>,
        page: usize,
        size: usize,
    ) -> Result<ClaimPage, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let (claims, total) = self.store.list_claims(status, page, size).await?;
        let mut views = Vec::with_capacity(claims.len());
        for claim in &claims {
            views.push(self.view_of(claim, now).await);
        }
        Ok(ClaimPage {
            claims: views,
            page,
            size,
            total,
        })
    }

    /// PENDING claims inside the expiring-soon horizon, soonest first.
    pub async fn admin_expiring_soon(&self) -> Result<Vec<ClaimView>, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let until = now + Duration::hours(self.policy.expiring_soon_hours);
        let claims = self.store.claims_expiring_between(now, until).await?;
        let mut views = Vec::with_capacity(claims.len());
        for claim in &claims {
            views.push(self.view_of(claim, now).await);
        }
        Ok(views)
    }

    /// Administrative cancellation of a PENDING claim, with an audit row.
    pub async fn admin_invalidate(
        &self,
        claim_id: &str,
        admin_id: &str,
    ) -> Result<ClaimView, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let claim = self.get_claim(claim_id).await?;

        let mut snapshot = self.store.begin_snapshot(&claim.server_id).await?;
        let result = async {
            let mut current = self.store.get_claim_for_update(&mut snapshot, claim_id).await?;
            match current.effective_status(now) {
                ClaimStatus::Pending => {}
                other => {
                    return Err(ClaimError::validation(format!(
                        "cannot invalidate a claim in status {}",
                        other
                    )))
                }
            }
            current.status = next_status(current.status, ClaimEvent::AdminInvalidate)
                .map_err(|e| ClaimError::validation(e.to_string()))?;
            current.cancelled_at = Some(now);
            self.store
                .update_claim(&mut snapshot, ClaimStatus::Pending, current.clone())
                .await?;
            self.store
                .insert_audit(
                    &mut snapshot,
                    AuditRecord {
                        id: new_claim_id(),
                        admin_id: admin_id.to_string(),
                        action: "invalidate_claim".to_string(),
                        claim_id: claim_id.to_string(),
                        recorded_at: now,
                    },
                )
                .await?;
            Ok(current)
        }
        .await;

        match result {
            Ok(record) => {
                self.commit_mapped(snapshot).await?;
                Ok(self.view_of(&record, now).await)
            }
            Err(e) => {
                self.store.abort_snapshot(snapshot).await?;
                Err(e)
            }
        }
    }

    /// Administrative approval, the terminal step of the EMAIL method.
    /// Applies the same success path as a probe-confirmed verification.
    pub async fn admin_approve(
        &self,
        claim_id: &str,
        admin_id: &str,
    ) -> Result<ClaimView, ClaimError> {
        let now = OffsetDateTime::now_utc();
        let claim = self.get_claim(claim_id).await?;

        let mut snapshot = self.store.begin_snapshot(&claim.server_id).await?;
        let result = async {
            let mut current = self.store.get_claim_for_update(&mut snapshot, claim_id).await?;
            match current.effective_status(now) {
                ClaimStatus::Pending => {}
                other => {
                    return Err(ClaimError::validation(format!(
                        "cannot approve a claim in status {}",
                        other
                    )))
                }
            }
            let server = self.store.get_server_for_update(&mut snapshot).await?;
            if server.is_verified() {
                return Err(ClaimError::conflict("this server has already been claimed"));
            }
            current.status = next_status(current.status, ClaimEvent::AdminApprove)
                .map_err(|e| ClaimError::validation(e.to_string()))?;
            current.completed_at = Some(now);
            self.store
                .update_claim(&mut snapshot, ClaimStatus::Pending, current.clone())
                .await?;
            let user = self.get_user(&current.user_id).await?;
            self.store
                .transfer_ownership(
                    &mut snapshot,
                    server.version,
                    &current.user_id,
                    &user.username,
                    current.method,
                    now,
                )
                .await?;
            self.store
                .mark_other_pending_claims(&mut snapshot, &current.user_id, now)
                .await?;
            self.store
                .insert_audit(
                    &mut snapshot,
                    AuditRecord {
                        id: new_claim_id(),
                        admin_id: admin_id.to_string(),
                        action: "approve_claim".to_string(),
                        claim_id: claim_id.to_string(),
                        recorded_at: now,
                    },
                )
                .await?;
            Ok(current)
        }
        .await;

        match result {
            Ok(record) => {
                self.commit_mapped(snapshot).await?;
                Ok(self.view_of(&record, now).await)
            }
            Err(e) => {
                self.store.abort_snapshot(snapshot).await?;
                Err(e)
            }
        }
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Authoritative expiry sweep. Idempotent; returns the number of
    /// claims transitioned by this call.
    pub async fn expire_sweep(&self) -> Result<u64, ClaimError> {
        let now = OffsetDateTime::now_utc();
        Ok(self.store.expire_pending_before(now).await?)
    }

    /// Purge terminal claims older than the retention horizon. The
    /// horizon defaults to the policy's retention window.
    pub async fn cleanup_old_claims(&self, days_to_keep: Option<i64>) -> Result<u64, ClaimError> {
        let days = match days_to_keep {
            Some(days) if days >= 1 => days,
            Some(_) => return Err(ClaimError::validation("daysToKeep must be at least 1")),
            None => self.policy.retention_days,
        };
        let cutoff = OffsetDateTime::now_utc() - Duration::days(days);
        Ok(self.store.delete_terminal_claims_before(cutoff).await?)
    }

    // ── Lookups ──────────────────────────────────────────────────────────

    async fn get_server(&self, server_id: &str) -> Result<ServerRecord, ClaimError> {
        self.store.get_server(server_id).await.map_err(|e| match e {
            StorageError::ServerNotFound { server_id } => {
                ClaimError::not_found(format!("server not found: {}", server_id))
            }
            other => other.into(),
        })
    }

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, ClaimError> {
        self.store.get_user(user_id).await.map_err(|e| match e {
            StorageError::UserNotFound { user_id } => {
                ClaimError::not_found(format!("user not found: {}", user_id))
            }
            other => other.into(),
        })
    }

    async fn get_claim(&self, claim_id: &str) -> Result<ClaimRecord, ClaimError> {
        self.store.get_claim(claim_id).await.map_err(|e| match e {
            StorageError::ClaimNotFound { claim_id } => {
                ClaimError::not_found(format!("claim not found: {}", claim_id))
            }
            other => other.into(),
        })
    }

    async fn view_of(&self, claim: &ClaimRecord, now: OffsetDateTime) -> ClaimView {
        let server_name = self
            .store
            .get_server(&claim.server_id)
            .await
            .map(|s| s.name)
            .unwrap_or_else(|_| claim.server_id.clone());
        let username = self
            .store
            .get_user(&claim.user_id)
            .await
            .map(|u| u.username)
            .unwrap_or_else(|_| claim.user_id.clone());
        ClaimView {
            claim_id: claim.id.clone(),
            server_id: claim.server_id.clone(),
            server_name,
            user_id: claim.user_id.clone(),
            username,
            method: claim.method,
            status: effective_status(claim.status, claim.expires_at, now),
            initiated_at: claim.initiated_at,
            claim_token_expiry: claim.expires_at,
            time_remaining_percent: time_remaining_percent(claim.initiated_at, claim.expires_at, now),
            attempt_count: claim.attempt_count,
            last_attempt_at: claim.last_attempt_at,
        }
    }
}
