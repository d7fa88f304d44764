use holist_storage::StorageError;

/// All errors surfaced by the claim service.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    /// The referenced server, user, or claim does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request is well-formed but not permitted in the current state
    /// (server already verified, method unavailable, claim terminal).
    #[error("{0}")]
    Validation(String),

    /// A concurrent actor won the race; the caller should re-read state.
    #[error("{0}")]
    Conflict(String),

    /// The caller exhausted the verification attempt budget.
    #[error("verification rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The caller does not own the claim it is acting on.
    #[error("{0}")]
    Unauthorized(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ClaimError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ClaimError::NotFound(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        ClaimError::Validation(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        ClaimError::Conflict(what.into())
    }

    pub fn unauthorized(what: impl Into<String>) -> Self {
        ClaimError::Unauthorized(what.into())
    }
}
