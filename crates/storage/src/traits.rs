use async_trait::async_trait;
use time::OffsetDateTime;

use holist_core::{ClaimStatus, VerificationMethod};

use crate::error::StorageError;
use crate::record::{AttemptRecord, AuditRecord, ClaimRecord, ServerRecord, UserRecord};

/// Durable storage for claim initiations and the collaborator data
/// (servers, users) the subsystem consults.
///
/// ## Snapshot Semantics
///
/// Claim-affecting mutations take `&mut Self::Snapshot`, a type
/// representing an in-progress transaction scoped to ONE server:
///
/// 1. `begin_snapshot(server_id)` — acquire the server's mutual-exclusion
///    scope and start a transaction
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` — apply all staged mutations atomically
///    OR `abort_snapshot(snapshot)` — discard them
///
/// Dropping a snapshot without committing MUST discard its mutations and
/// release the server scope. Reads within a snapshot observe committed
/// state; mutations are staged, not read back.
///
/// The per-server scope is what guarantees the at-most-one-winner
/// invariant: two claimants racing to verify the same server serialize
/// here, and the loser observes the winner's committed transition. It is
/// deliberately NOT a global lock — claims on different servers proceed
/// concurrently.
///
/// ## OCC on Ownership
///
/// `transfer_ownership` is conditional on the server record's `version`.
/// A mismatch returns `StorageError::ConcurrentConflict` and the snapshot
/// must commit nothing.
///
/// Cross-server maintenance (`expire_pending_before`,
/// `delete_terminal_claims_before`) and all queries run outside snapshots
/// and must be internally atomic.
#[async_trait]
pub trait ClaimStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this backend. Must be
    /// `Send` to cross async task boundaries.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────

    /// Begin a snapshot holding the mutual-exclusion scope for `server_id`.
    async fn begin_snapshot(&self, server_id: &str) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, applying all staged mutations atomically.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort a snapshot, discarding all staged mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Reads within a snapshot (server scope held) ───────────────────────

    /// Read a claim for update under the snapshot's server scope.
    async fn get_claim_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        claim_id: &str,
    ) -> Result<ClaimRecord, StorageError>;

    /// Read the server record for update under the snapshot's scope.
    async fn get_server_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
    ) -> Result<ServerRecord, StorageError>;

    // ── Mutations (within snapshot) ───────────────────────────────────────

    /// Stage a new claim record.
    ///
    /// Returns `Err(StorageError::DuplicatePendingClaim)` when an active
    /// (PENDING and unexpired as of the record's `initiated_at`) claim
    /// already exists for the same (server, user) pair.
    async fn insert_claim(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ClaimRecord,
    ) -> Result<(), StorageError>;

    /// Stage a claim update. The update is conditional on the committed
    /// status still being `expected_status`; a mismatch surfaces as
    /// `StorageError::StaleClaim` at commit.
    async fn update_claim(
        &self,
        snapshot: &mut Self::Snapshot,
        expected_status: ClaimStatus,
        record: ClaimRecord,
    ) -> Result<(), StorageError>;

    /// Stage the atomic ownership transfer onto the snapshot's server,
    /// conditional on `expected_version` (OCC). Returns the new version.
    #[allow(clippy::too_many_arguments)]
    async fn transfer_ownership(
        &self,
        snapshot: &mut Self::Snapshot,
        expected_version: i64,
        owner_id: &str,
        owner_username: &str,
        method: VerificationMethod,
        verified_at: OffsetDateTime,
    ) -> Result<i64, StorageError>;

    /// Stage the CLAIMED_BY_OTHER sweep: every PENDING claim on the
    /// snapshot's server not belonging to `winner_user_id` moves to
    /// CLAIMED_BY_OTHER with `completed_at`. Returns the count staged.
    async fn mark_other_pending_claims(
        &self,
        snapshot: &mut Self::Snapshot,
        winner_user_id: &str,
        completed_at: OffsetDateTime,
    ) -> Result<u64, StorageError>;

    /// Stage an attempt record.
    async fn insert_attempt(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AttemptRecord,
    ) -> Result<(), StorageError>;

    /// Stage an administrative audit record.
    async fn insert_audit(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AuditRecord,
    ) -> Result<(), StorageError>;

    // ── Queries (outside snapshots) ───────────────────────────────────────

    async fn get_claim(&self, claim_id: &str) -> Result<ClaimRecord, StorageError>;

    async fn get_server(&self, server_id: &str) -> Result<ServerRecord, StorageError>;

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, StorageError>;

    /// Most recent claim by `user_id` on `server_id`, if any.
    async fn find_claim(
        &self,
        server_id: &str,
        user_id: &str,
    ) -> Result<Option<ClaimRecord>, StorageError>;

    /// All claims for a server, newest first.
    async fn claims_by_server(&self, server_id: &str) -> Result<Vec<ClaimRecord>, StorageError>;

    /// All claims by a user, newest first.
    async fn claims_by_user(&self, user_id: &str) -> Result<Vec<ClaimRecord>, StorageError>;

    /// Paginated listing, newest first, optionally filtered by stored
    /// status. Returns the page plus the total matching count.
    async fn list_claims(
        &self,
        status: Option<ClaimStatus>,
        page: usize,
        size: usize,
    ) -> Result<(Vec<ClaimRecord>, usize), StorageError>;

    async fn count_by_status(&self, status: ClaimStatus) -> Result<u64, StorageError>;

    /// VERIFIED claims completed at or after `since`.
    async fn count_verified_since(&self, since: OffsetDateTime) -> Result<u64, StorageError>;

    /// Active PENDING claims for a server as of `now`.
    async fn count_pending_for_server(
        &self,
        server_id: &str,
        now: OffsetDateTime,
    ) -> Result<u64, StorageError>;

    /// PENDING claims with `now < expires_at <= until`, soonest first.
    async fn claims_expiring_between(
        &self,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<ClaimRecord>, StorageError>;

    /// Attempts recorded for `user_id` at or after `since` (rate limit).
    async fn count_attempts_by_user_since(
        &self,
        user_id: &str,
        since: OffsetDateTime,
    ) -> Result<u64, StorageError>;

    // ── Batch maintenance (atomic, outside snapshots) ─────────────────────

    /// Authoritative expiry write-back: every PENDING claim with
    /// `expires_at < now` moves to EXPIRED. Idempotent; returns the
    /// number of claims transitioned by THIS call.
    async fn expire_pending_before(&self, now: OffsetDateTime) -> Result<u64, StorageError>;

    /// Hard-delete terminal-status claims whose terminal timestamp is
    /// before `cutoff`. Never deletes PENDING rows. Returns the count.
    async fn delete_terminal_claims_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StorageError>;

    // ── Collaborator data ─────────────────────────────────────────────────

    /// Insert or replace a server listing record.
    async fn upsert_server(&self, record: ServerRecord) -> Result<(), StorageError>;

    /// Insert or replace a user record.
    async fn upsert_user(&self, record: UserRecord) -> Result<(), StorageError>;
}
