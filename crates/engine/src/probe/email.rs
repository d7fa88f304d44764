//! Email probe.
//!
//! Email ownership cannot be confirmed mechanically here, so this probe
//! always reports manual review. The claim stays PENDING until an
//! administrator approves or invalidates it; the availability check is
//! where the real gating happens.

use async_trait::async_trait;

use holist_core::host::{email_domain, registrable_domain};
use holist_core::VerificationMethod;
use holist_storage::{ServerRecord, UserRecord};

use super::{Probe, ProbeOutcome};

#[derive(Default)]
pub struct EmailProbe;

impl EmailProbe {
    pub fn new() -> Self {
        EmailProbe
    }
}

/// EMAIL is offered only when the claimant's verified email address lives
/// on the server's registrable domain.
pub(crate) fn email_unavailable_reason(
    server: &ServerRecord,
    user: Option<&UserRecord>,
) -> Option<String> {
    let Some(server_domain) = registrable_domain(&server.host) else {
        return Some(
            "email verification requires the server to be listed under a domain name".into(),
        );
    };
    let Some(user) = user else {
        return Some("email verification requires a signed-in claimant".into());
    };
    if !user.email_verified {
        return Some("email verification requires a verified account email address".into());
    }
    match email_domain(&user.email) {
        Some(d) if d == server_domain || d.ends_with(&format!(".{}", server_domain)) => None,
        _ => Some(format!(
            "email verification requires an address at {}",
            server_domain
        )),
    }
}

#[async_trait]
impl Probe for EmailProbe {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::Email
    }

    fn unavailable_reason(
        &self,
        server: &ServerRecord,
        user: Option<&UserRecord>,
    ) -> Option<String> {
        email_unavailable_reason(server, user)
    }

    async fn probe(&self, _server: &ServerRecord, _token: &str) -> ProbeOutcome {
        ProbeOutcome::ManualReview {
            message: "email claims are reviewed by an administrator; the claim stays pending \
                      until approved"
                .to_string(),
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
