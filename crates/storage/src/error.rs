/// All errors that can be returned by a `ClaimStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency conflict — the server's ownership record was
    /// modified concurrently and the expected version was not found.
    #[error("concurrent conflict on server {server_id}: expected version {expected_version}")]
    ConcurrentConflict {
        server_id: String,
        expected_version: i64,
    },

    /// No claim record with the given id.
    #[error("claim not found: {claim_id}")]
    ClaimNotFound { claim_id: String },

    /// No server record with the given id.
    #[error("server not found: {server_id}")]
    ServerNotFound { server_id: String },

    /// No user record with the given id.
    #[error("user not found: {user_id}")]
    UserNotFound { user_id: String },

    /// An active PENDING claim already exists for this (server, user) pair.
    #[error("active pending claim already exists for server {server_id} by user {user_id}")]
    DuplicatePendingClaim { server_id: String, user_id: String },

    /// A claim mutation found the record in a different status than the
    /// snapshot read — a competing transition committed first.
    #[error("stale claim update for {claim_id}: status changed concurrently")]
    StaleClaim { claim_id: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
