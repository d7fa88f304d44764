//! Verification probes — one per verification method.
//!
//! A probe inspects an externally controlled surface (server MOTD, DNS
//! zone, website, mailbox domain) for the claim's token. Probes run
//! OUTSIDE storage snapshots; the service re-reads claim state under the
//! snapshot after the probe returns, so a slow probe can never hold the
//! server's mutual-exclusion scope.

mod dns;
mod email;
mod http_file;
mod motd;

pub use dns::DnsTxtProbe;
pub use email::EmailProbe;
pub use http_file::FileUploadProbe;
pub use motd::MotdProbe;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use holist_core::{ClaimPolicy, VerificationMethod};
use holist_storage::{ServerRecord, UserRecord};

/// Why a probe did not find the token. Recorded verbatim on the attempt
/// row and echoed to the claimant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The target could not be reached at all.
    NetworkUnreachable,
    /// The surface was reachable but the token was absent or wrong.
    TokenMismatch,
    /// The target did not answer within the probe deadline.
    Timeout,
    /// The target answered with something the probe could not parse.
    ProtocolError,
}

impl ProbeFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeFailure::NetworkUnreachable => "NETWORK_UNREACHABLE",
            ProbeFailure::TokenMismatch => "TOKEN_MISMATCH",
            ProbeFailure::Timeout => "TIMEOUT",
            ProbeFailure::ProtocolError => "PROTOCOL_ERROR",
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of one probe execution.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// The token was found where the instructions said to put it.
    Verified { message: String },
    /// The token was not confirmed; the claim stays PENDING.
    Failed {
        reason: ProbeFailure,
        message: String,
    },
    /// The method cannot self-verify; an administrator decides.
    ManualReview { message: String },
}

#[async_trait]
pub trait Probe: Send + Sync {
    /// The verification method this probe implements.
    fn method(&self) -> VerificationMethod;

    /// `None` when the method applies to this (server, claimant) pair,
    /// otherwise a human-readable reason it is unavailable.
    fn unavailable_reason(&self, server: &ServerRecord, user: Option<&UserRecord>)
        -> Option<String>;

    /// Inspect the external surface for `token`. Never mutates claim
    /// state; the service interprets the outcome under a snapshot.
    async fn probe(&self, server: &ServerRecord, token: &str) -> ProbeOutcome;
}

/// The default probe set, one per supported method.
pub fn default_probes(policy: &ClaimPolicy) -> Vec<Arc<dyn Probe>> {
    vec![
        Arc::new(MotdProbe::new(policy.probe_timeout_secs)),
        Arc::new(DnsTxtProbe::new(policy.probe_timeout_secs)),
        Arc::new(FileUploadProbe::new(policy.probe_timeout_secs)),
        Arc::new(EmailProbe::new()),
    ]
}
