//! In-memory `ClaimStore` backend.
//!
//! Snapshots hold a per-server async mutex for their whole lifetime, so
//! claim-affecting transactions on the same server serialize while
//! different servers proceed concurrently. Mutations are staged and
//! applied to a working copy of the state at commit, so a failing
//! validation (OCC conflict, stale claim) leaves nothing applied.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use holist_core::{ClaimStatus, VerificationMethod};

use crate::error::StorageError;
use crate::record::{AttemptRecord, AuditRecord, ClaimRecord, ServerRecord, UserRecord};
use crate::traits::ClaimStore;

#[derive(Default, Clone)]
struct StoreState {
    claims: HashMap<String, ClaimRecord>,
    servers: HashMap<String, ServerRecord>,
    users: HashMap<String, UserRecord>,
    attempts: Vec<AttemptRecord>,
    audits: Vec<AuditRecord>,
}

/// A mutation staged inside a snapshot, validated and applied at commit.
enum StagedOp {
    InsertClaim(ClaimRecord),
    UpdateClaim {
        expected_status: ClaimStatus,
        record: ClaimRecord,
    },
    TransferOwnership {
        expected_version: i64,
        owner_id: String,
        owner_username: String,
        method: VerificationMethod,
        verified_at: OffsetDateTime,
    },
    MarkOtherPending {
        winner_user_id: String,
        completed_at: OffsetDateTime,
    },
    InsertAttempt(AttemptRecord),
    InsertAudit(AuditRecord),
}

/// In-progress transaction scoped to one server.
pub struct MemorySnapshot {
    server_id: String,
    staged: Vec<StagedOp>,
    /// Held for the snapshot's lifetime; dropping it releases the scope.
    _scope: OwnedMutexGuard<()>,
}

/// In-memory claim store. Cheap to construct; intended for serving a
/// directory whose listing data is loaded at startup.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    server_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn server_lock(&self, server_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.server_locks.lock().expect("server lock map poisoned");
        locks
            .entry(server_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply one staged op to a working copy of the state.
    fn apply(
        state: &mut StoreState,
        server_id: &str,
        op: StagedOp,
    ) -> Result<(), StorageError> {
        match op {
            StagedOp::InsertClaim(record) => {
                state.claims.insert(record.id.clone(), record);
            }
            StagedOp::UpdateClaim {
                expected_status,
                record,
            } => {
                let current = state.claims.get(&record.id).ok_or_else(|| {
                    StorageError::ClaimNotFound {
                        claim_id: record.id.clone(),
                    }
                })?;
                if current.status != expected_status {
                    return Err(StorageError::StaleClaim {
                        claim_id: record.id.clone(),
                    });
                }
                state.claims.insert(record.id.clone(), record);
            }
            StagedOp::TransferOwnership {
                expected_version,
                owner_id,
                owner_username,
                method,
                verified_at,
            } => {
                let server = state.servers.get_mut(server_id).ok_or_else(|| {
                    StorageError::ServerNotFound {
                        server_id: server_id.to_string(),
                    }
                })?;
                if server.version != expected_version {
                    return Err(StorageError::ConcurrentConflict {
                        server_id: server_id.to_string(),
                        expected_version,
                    });
                }
                server.owner_id = Some(owner_id);
                server.owner_username = Some(owner_username);
                server.verification_method = Some(method);
                server.verified_at = Some(verified_at);
                server.version += 1;
            }
            StagedOp::MarkOtherPending {
                winner_user_id,
                completed_at,
            } => {
                for claim in state.claims.values_mut() {
                    if claim.server_id == server_id
                        && claim.user_id != winner_user_id
                        && claim.status == ClaimStatus::Pending
                    {
                        claim.status = ClaimStatus::ClaimedByOther;
                        claim.completed_at = Some(completed_at);
                    }
                }
            }
            StagedOp::InsertAttempt(record) => state.attempts.push(record),
            StagedOp::InsertAudit(record) => state.audits.push(record),
        }
        Ok(())
    }

    /// Audit records for a claim (test and operator visibility).
    pub async fn audits_for_claim(&self, claim_id: &str) -> Vec<AuditRecord> {
        let state = self.state.read().await;
        state
            .audits
            .iter()
            .filter(|a| a.claim_id == claim_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClaimStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self, server_id: &str) -> Result<Self::Snapshot, StorageError> {
        let scope = self.server_lock(server_id).lock_owned().await;
        Ok(MemorySnapshot {
            server_id: server_id.to_string(),
            staged: Vec::new(),
            _scope: scope,
        })
    }

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        // Validate against a working copy so a mid-commit failure applies
        // nothing (no partial transition).
        let mut next = state.clone();
        for op in snapshot.staged {
            Self::apply(&mut next, &snapshot.server_id, op)?;
        }
        *state = next;
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn get_claim_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        claim_id: &str,
    ) -> Result<ClaimRecord, StorageError> {
        let state = self.state.read().await;
        let claim = state
            .claims
            .get(claim_id)
            .cloned()
            .ok_or_else(|| StorageError::ClaimNotFound {
                claim_id: claim_id.to_string(),
            })?;
        debug_assert_eq!(claim.server_id, snapshot.server_id);
        Ok(claim)
    }

    async fn get_server_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
    ) -> Result<ServerRecord, StorageError> {
        let state = self.state.read().await;
        state
            .servers
            .get(&snapshot.server_id)
            .cloned()
            .ok_or_else(|| StorageError::ServerNotFound {
                server_id: snapshot.server_id.clone(),
            })
    }

    async fn insert_claim(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ClaimRecord,
    ) -> Result<(), StorageError> {
        let state = self.state.read().await;
        if !state.servers.contains_key(&record.server_id) {
            return Err(StorageError::ServerNotFound {
                server_id: record.server_id.clone(),
            });
        }
        let duplicate = state.claims.values().any(|c| {
            c.server_id == record.server_id
                && c.user_id == record.user_id
                && c.is_active(record.initiated_at)
        });
        if duplicate {
            return Err(StorageError::DuplicatePendingClaim {
                server_id: record.server_id.clone(),
                user_id: record.user_id.clone(),
            });
        }
        drop(state);
        snapshot.staged.push(StagedOp::InsertClaim(record));
        Ok(())
    }

    async fn update_claim(
        &self,
        snapshot: &mut Self::Snapshot,
        expected_status: ClaimStatus,
        record: ClaimRecord,
    ) -> Result<(), StorageError> {
        snapshot.staged.push(StagedOp::UpdateClaim {
            expected_status,
            record,
        });
        Ok(())
    }

    async fn transfer_ownership(
        &self,
        snapshot: &mut Self::Snapshot,
        expected_version: i64,
        owner_id: &str,
        owner_username: &str,
        method: VerificationMethod,
        verified_at: OffsetDateTime,
    ) -> Result<i64, StorageError> {
        // Early OCC check against committed state; commit re-validates.
        let state = self.state.read().await;
        let server = state.servers.get(&snapshot.server_id).ok_or_else(|| {
            StorageError::ServerNotFound {
                server_id: snapshot.server_id.clone(),
            }
        })?;
        if server.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                server_id: snapshot.server_id.clone(),
                expected_version,
            });
        }
        drop(state);
        snapshot.staged.push(StagedOp::TransferOwnership {
            expected_version,
            owner_id: owner_id.to_string(),
            owner_username: owner_username.to_string(),
            method,
            verified_at,
        });
        Ok(expected_version + 1)
    }

    async fn mark_other_pending_claims(
        &self,
        snapshot: &mut Self::Snapshot,
        winner_user_id: &str,
        completed_at: OffsetDateTime,
    ) -> Result<u64, StorageError> {
        let state = self.state.read().await;
        let count = state
            .claims
            .values()
            .filter(|c| {
                c.server_id == snapshot.server_id
                    && c.user_id != winner_user_id
                    && c.status == ClaimStatus::Pending
            })
            .count() as u64;
        drop(state);
        snapshot.staged.push(StagedOp::MarkOtherPending {
            winner_user_id: winner_user_id.to_string(),
            completed_at,
        });
        Ok(count)
    }

    async fn insert_attempt(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AttemptRecord,
    ) -> Result<(), StorageError> {
        snapshot.staged.push(StagedOp::InsertAttempt(record));
        Ok(())
    }

    async fn insert_audit(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AuditRecord,
    ) -> Result<(), StorageError> {
        snapshot.staged.push(StagedOp::InsertAudit(record));
        Ok(())
    }

    async fn get_claim(&self, claim_id: &str) -> Result<ClaimRecord, StorageError> {
        let state = self.state.read().await;
        state
            .claims
            .get(claim_id)
            .cloned()
            .ok_or_else(|| StorageError::ClaimNotFound {
                claim_id: claim_id.to_string(),
            })
    }

    async fn get_server(&self, server_id: &str) -> Result<ServerRecord, StorageError> {
        let state = self.state.read().await;
        state
            .servers
            .get(server_id)
            .cloned()
            .ok_or_else(|| StorageError::ServerNotFound {
                server_id: server_id.to_string(),
            })
    }

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, StorageError> {
        let state = self.state.read().await;
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StorageError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn find_claim(
        &self,
        server_id: &str,
        user_id: &str,
    ) -> Result<Option<ClaimRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .claims
            .values()
            .filter(|c| c.server_id == server_id && c.user_id == user_id)
            .max_by_key(|c| c.initiated_at)
            .cloned())
    }

    async fn claims_by_server(&self, server_id: &str) -> Result<Vec<ClaimRecord>, StorageError> {
        let state = self.state.read().await;
        let mut claims: Vec<ClaimRecord> = state
            .claims
            .values()
            .filter(|c| c.server_id == server_id)
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.initiated_at.cmp(&a.initiated_at));
        Ok(claims)
    }

    async fn claims_by_user(&self, user_id: &str) -> Result<Vec<ClaimRecord>, StorageError> {
        let state = self.state.read().await;
        let mut claims: Vec<ClaimRecord> = state
            .claims
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.initiated_at.cmp(&a.initiated_at));
        Ok(claims)
    }

    async fn list_claims(
        &self,
        status: Option<ClaimStatus>,
        page: usize,
        size: usize,
    ) -> Result<(Vec<ClaimRecord>, usize), StorageError> {
        let state = self.state.read().await;
        let mut claims: Vec<ClaimRecord> = state
            .claims
            .values()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.initiated_at.cmp(&a.initiated_at));
        let total = claims.len();
        let page_items = claims.into_iter().skip(page * size).take(size).collect();
        Ok((page_items, total))
    }

    async fn count_by_status(&self, status: ClaimStatus) -> Result<u64, StorageError> {
        let state = self.state.read().await;
        Ok(state.claims.values().filter(|c| c.status == status).count() as u64)
    }

    async fn count_verified_since(&self, since: OffsetDateTime) -> Result<u64, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .claims
            .values()
            .filter(|c| {
                c.status == ClaimStatus::Verified
                    && c.completed_at.is_some_and(|at| at >= since)
            })
            .count() as u64)
    }

    async fn count_pending_for_server(
        &self,
        server_id: &str,
        now: OffsetDateTime,
    ) -> Result<u64, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .claims
            .values()
            .filter(|c| c.server_id == server_id && c.is_active(now))
            .count() as u64)
    }

    async fn claims_expiring_between(
        &self,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<ClaimRecord>, StorageError> {
        let state = self.state.read().await;
        let mut claims: Vec<ClaimRecord> = state
            .claims
            .values()
            .filter(|c| {
                c.status == ClaimStatus::Pending && c.expires_at > now && c.expires_at <= until
            })
            .cloned()
            .collect();
        claims.sort_by_key(|c| c.expires_at);
        Ok(claims)
    }

    async fn count_attempts_by_user_since(
        &self,
        user_id: &str,
        since: OffsetDateTime,
    ) -> Result<u64, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.attempted_at >= since)
            .count() as u64)
    }

    async fn expire_pending_before(&self, now: OffsetDateTime) -> Result<u64, StorageError> {
        let mut state = self.state.write().await;
        let mut expired = 0u64;
        for claim in state.claims.values_mut() {
            if claim.status == ClaimStatus::Pending && claim.expires_at < now {
                claim.status = ClaimStatus::Expired;
                claim.completed_at = Some(now);
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn delete_terminal_claims_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StorageError> {
        let mut state = self.state.write().await;
        let before = state.claims.len();
        state.claims.retain(|_, c| {
            if c.status == ClaimStatus::Pending {
                return true;
            }
            let terminal_at = c.completed_at.or(c.cancelled_at);
            !terminal_at.is_some_and(|at| at < cutoff)
        });
        Ok((before - state.claims.len()) as u64)
    }

    async fn upsert_server(&self, record: ServerRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.servers.insert(record.id.clone(), record);
        Ok(())
    }

    async fn upsert_user(&self, record: UserRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.users.insert(record.id.clone(), record);
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use time::Duration;
    use tokio::time::timeout;

    fn server(id: &str) -> ServerRecord {
        ServerRecord {
            id: id.to_string(),
            name: format!("Server {}", id),
            host: "play.example.com".to_string(),
            port: 5520,
            website_url: None,
            owner_id: None,
            owner_username: None,
            verified_at: None,
            verification_method: None,
            version: 0,
        }
    }

    fn claim(id: &str, server_id: &str, user_id: &str, now: OffsetDateTime) -> ClaimRecord {
        ClaimRecord {
            id: id.to_string(),
            server_id: server_id.to_string(),
            user_id: user_id.to_string(),
            method: VerificationMethod::Motd,
            token: format!("token-{}", id),
            status: ClaimStatus::Pending,
            initiated_at: now,
            expires_at: now + Duration::hours(72),
            attempt_count: 0,
            last_attempt_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_server(server("s1")).await.unwrap();
        store.upsert_server(server("s2")).await.unwrap();
        store
    }

    async fn insert(store: &MemoryStore, record: ClaimRecord) {
        let mut snap = store.begin_snapshot(&record.server_id.clone()).await.unwrap();
        store.insert_claim(&mut snap, record).await.unwrap();
        store.commit_snapshot(snap).await.unwrap();
    }

    #[tokio::test]
    async fn insert_and_find_latest_claim() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();

        let mut old = claim("c1", "s1", "u1", now - Duration::hours(100));
        old.status = ClaimStatus::Expired;
        insert(&store, old).await;
        insert(&store, claim("c2", "s1", "u1", now)).await;

        let found = store.find_claim("s1", "u1").await.unwrap().unwrap();
        assert_eq!(found.id, "c2");
    }

    #[tokio::test]
    async fn duplicate_active_pending_claim_is_rejected() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();
        insert(&store, claim("c1", "s1", "u1", now)).await;

        let mut snap = store.begin_snapshot("s1").await.unwrap();
        let err = store
            .insert_claim(&mut snap, claim("c2", "s1", "u1", now))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicatePendingClaim { .. }));
        store.abort_snapshot(snap).await.unwrap();

        // A second claim by a DIFFERENT user on the same server is fine.
        insert(&store, claim("c3", "s1", "u2", now)).await;
    }

    #[tokio::test]
    async fn stale_claim_update_fails_at_commit_and_applies_nothing() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();
        let mut rec = claim("c1", "s1", "u1", now - Duration::hours(100));
        rec.expires_at = now - Duration::hours(1);
        insert(&store, rec.clone()).await;

        let mut snap = store.begin_snapshot("s1").await.unwrap();
        rec.status = ClaimStatus::Verified;
        rec.completed_at = Some(now);
        store
            .update_claim(&mut snap, ClaimStatus::Pending, rec)
            .await
            .unwrap();

        // The sweep wins the race before the snapshot commits.
        assert_eq!(store.expire_pending_before(now).await.unwrap(), 1);

        let err = store.commit_snapshot(snap).await.unwrap_err();
        assert!(matches!(err, StorageError::StaleClaim { .. }));
        let stored = store.get_claim("c1").await.unwrap();
        assert_eq!(stored.status, ClaimStatus::Expired);
    }

    #[tokio::test]
    async fn ownership_transfer_is_occ_guarded() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();

        let mut snap = store.begin_snapshot("s1").await.unwrap();
        let new_version = store
            .transfer_ownership(&mut snap, 0, "u1", "alice", VerificationMethod::Motd, now)
            .await
            .unwrap();
        assert_eq!(new_version, 1);
        store.commit_snapshot(snap).await.unwrap();

        let s = store.get_server("s1").await.unwrap();
        assert_eq!(s.owner_id.as_deref(), Some("u1"));
        assert!(s.is_verified());
        assert_eq!(s.version, 1);

        // A transfer staged against the stale version is refused.
        let mut snap = store.begin_snapshot("s1").await.unwrap();
        let err = store
            .transfer_ownership(&mut snap, 0, "u2", "bob", VerificationMethod::Motd, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConcurrentConflict { .. }));
        store.abort_snapshot(snap).await.unwrap();
    }

    #[tokio::test]
    async fn losing_claims_move_to_claimed_by_other() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();
        insert(&store, claim("winner", "s1", "u1", now)).await;
        insert(&store, claim("loser", "s1", "u2", now)).await;
        insert(&store, claim("unrelated", "s2", "u3", now)).await;

        let mut snap = store.begin_snapshot("s1").await.unwrap();
        let flipped = store
            .mark_other_pending_claims(&mut snap, "u1", now)
            .await
            .unwrap();
        assert_eq!(flipped, 1);
        store.commit_snapshot(snap).await.unwrap();

        assert_eq!(
            store.get_claim("loser").await.unwrap().status,
            ClaimStatus::ClaimedByOther
        );
        assert_eq!(
            store.get_claim("winner").await.unwrap().status,
            ClaimStatus::Pending
        );
        assert_eq!(
            store.get_claim("unrelated").await.unwrap().status,
            ClaimStatus::Pending
        );
    }

    #[tokio::test]
    async fn expire_sweep_is_idempotent() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();
        let mut rec = claim("c1", "s1", "u1", now - Duration::hours(100));
        rec.expires_at = now - Duration::hours(1);
        insert(&store, rec).await;
        insert(&store, claim("c2", "s1", "u2", now)).await;

        assert_eq!(store.expire_pending_before(now).await.unwrap(), 1);
        assert_eq!(store.expire_pending_before(now).await.unwrap(), 0);
        assert_eq!(
            store.get_claim("c2").await.unwrap().status,
            ClaimStatus::Pending
        );
    }

    #[tokio::test]
    async fn cleanup_deletes_only_old_terminal_claims() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();

        let mut old_terminal = claim("old", "s1", "u1", now - Duration::days(200));
        old_terminal.status = ClaimStatus::Cancelled;
        old_terminal.cancelled_at = Some(now - Duration::days(120));
        insert(&store, old_terminal).await;

        let mut fresh_terminal = claim("fresh", "s1", "u2", now - Duration::days(2));
        fresh_terminal.status = ClaimStatus::Expired;
        fresh_terminal.completed_at = Some(now - Duration::days(1));
        insert(&store, fresh_terminal).await;

        let mut old_pending = claim("pending", "s1", "u3", now - Duration::days(200));
        old_pending.expires_at = now + Duration::hours(1);
        insert(&store, old_pending).await;

        let deleted = store
            .delete_terminal_claims_before(now - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_claim("old").await.is_err());
        assert!(store.get_claim("fresh").await.is_ok());
        assert!(store.get_claim("pending").await.is_ok());
    }

    #[tokio::test]
    async fn list_claims_paginates_newest_first() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();
        for i in 0..5 {
            insert(
                &store,
                claim(&format!("c{}", i), "s1", &format!("u{}", i), now + Duration::seconds(i)),
            )
            .await;
        }

        let (page, total) = store.list_claims(None, 0, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "c4");
        assert_eq!(page[1].id, "c3");

        let (page, _) = store.list_claims(None, 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "c0");

        let (filtered, total) = store
            .list_claims(Some(ClaimStatus::Verified), 0, 10)
            .await
            .unwrap();
        assert_eq!(total, 0);
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn snapshots_serialize_per_server_not_globally() {
        let store = Arc::new(seeded_store().await);

        let snap1 = store.begin_snapshot("s1").await.unwrap();

        // A different server's snapshot is not blocked.
        let snap2 = timeout(StdDuration::from_millis(100), store.begin_snapshot("s2"))
            .await
            .expect("different server must not block")
            .unwrap();
        store.abort_snapshot(snap2).await.unwrap();

        // The same server blocks until the first snapshot resolves.
        assert!(
            timeout(StdDuration::from_millis(100), store.begin_snapshot("s1"))
                .await
                .is_err(),
            "same server must serialize"
        );

        store.abort_snapshot(snap1).await.unwrap();
        let snap3 = timeout(StdDuration::from_millis(100), store.begin_snapshot("s1"))
            .await
            .expect("scope must be released on abort")
            .unwrap();
        store.abort_snapshot(snap3).await.unwrap();
    }

    #[tokio::test]
    async fn attempts_feed_the_sliding_window_count() {
        let store = seeded_store().await;
        let now = OffsetDateTime::now_utc();
        insert(&store, claim("c1", "s1", "u1", now)).await;

        let mut snap = store.begin_snapshot("s1").await.unwrap();
        for i in 0..3 {
            store
                .insert_attempt(
                    &mut snap,
                    AttemptRecord {
                        id: format!("a{}", i),
                        claim_id: "c1".to_string(),
                        server_id: "s1".to_string(),
                        user_id: "u1".to_string(),
                        method: VerificationMethod::Motd,
                        successful: false,
                        failure_reason: Some("TOKEN_MISMATCH".to_string()),
                        attempted_at: now - Duration::minutes(i * 10),
                    },
                )
                .await
                .unwrap();
        }
        store.commit_snapshot(snap).await.unwrap();

        let hour = store
            .count_attempts_by_user_since("u1", now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(hour, 3);
        let recent = store
            .count_attempts_by_user_since("u1", now - Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(recent, 2);
    }
}
