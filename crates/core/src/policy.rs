//! Policy knobs for the claim subsystem.

/// Tunable policy for claim lifecycle and probing.
///
/// Defaults match the documented policy: 72-hour claim TTL, 10 attempts
/// per sliding hour and 20 per sliding day, 6-hour "expiring soon"
/// lookahead, 90-day retention of terminal claims, 10-second probe
/// timeout.
#[derive(Debug, Clone)]
pub struct ClaimPolicy {
    /// TTL horizon applied at initiation, in hours.
    pub ttl_hours: i64,
    /// Verification attempts allowed per user in a sliding one-hour window.
    pub max_attempts_per_hour: u32,
    /// Verification attempts allowed per user in a sliding one-day window.
    pub max_attempts_per_day: u32,
    /// Lookahead window for the admin "expiring soon" view, in hours.
    pub expiring_soon_hours: i64,
    /// Default retention horizon for terminal claims, in days.
    pub retention_days: i64,
    /// Hard timeout per probe attempt, in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        ClaimPolicy {
            ttl_hours: 72,
            max_attempts_per_hour: 10,
            max_attempts_per_day: 20,
            expiring_soon_hours: 6,
            retention_days: 90,
            probe_timeout_secs: 10,
        }
    }
}
