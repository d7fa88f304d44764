//! File-upload probe — fetches `/.well-known/hol-verify.txt` from the
//! listing's website (or plain HTTP against the host) and compares the
//! body to the token.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime.

use std::time::Duration;

use async_trait::async_trait;

use holist_core::instructions::{file_probe_base, ListingRef, WELL_KNOWN_PATH};
use holist_core::VerificationMethod;
use holist_storage::{ServerRecord, UserRecord};

use super::{Probe, ProbeFailure, ProbeOutcome};

/// Cap on the fetched body. A legitimate verification file is one line.
const MAX_BODY_BYTES: u64 = 64 * 1024;

pub struct FileUploadProbe {
    timeout: Duration,
}

impl FileUploadProbe {
    pub fn new(timeout_secs: u64) -> Self {
        FileUploadProbe {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// URL the probe fetches for a given listing.
    pub fn probe_url(server: &ServerRecord) -> String {
        let base = file_probe_base(ListingRef {
            host: &server.host,
            port: server.port,
            website_url: server.website_url.as_deref(),
        });
        format!("{}/{}", base, WELL_KNOWN_PATH)
    }
}

/// Whitespace-tolerant body comparison. Hosting setups love to append a
/// trailing newline.
pub(crate) fn body_matches(body: &str, token: &str) -> bool {
    body.trim() == token
}

fn classify_fetch_error(e: &ureq::Error) -> (ProbeFailure, String) {
    match e {
        // The host answered; the file is missing or blocked.
        ureq::Error::StatusCode(code) => (
            ProbeFailure::TokenMismatch,
            format!("verification file request returned HTTP {}", code),
        ),
        ureq::Error::Timeout(_) => (ProbeFailure::Timeout, "request timed out".to_string()),
        other => (ProbeFailure::NetworkUnreachable, other.to_string()),
    }
}

#[async_trait]
impl Probe for FileUploadProbe {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::FileUpload
    }

    fn unavailable_reason(
        &self,
        _server: &ServerRecord,
        _user: Option<&UserRecord>,
    ) -> Option<String> {
        // Falls back to http://<host> when no website is configured.
        None
    }

    async fn probe(&self, server: &ServerRecord, token: &str) -> ProbeOutcome {
        let url = Self::probe_url(server);
        let token = token.to_string();
        let timeout = self.timeout;

        let result = tokio::task::spawn_blocking(move || {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build()
                .new_agent();

            let response = match agent.get(&url).call() {
                Ok(response) => response,
                Err(e) => {
                    let (reason, detail) = classify_fetch_error(&e);
                    return ProbeOutcome::Failed {
                        reason,
                        message: format!("could not fetch {}: {}", url, detail),
                    };
                }
            };

            let body = match response
                .into_body()
                .with_config()
                .limit(MAX_BODY_BYTES)
                .read_to_string()
            {
                Ok(body) => body,
                Err(e) => {
                    return ProbeOutcome::Failed {
                        reason: ProbeFailure::ProtocolError,
                        message: format!("could not read verification file at {}: {}", url, e),
                    }
                }
            };

            if body_matches(&body, &token) {
                ProbeOutcome::Verified {
                    message: format!("verification file found at {}", url),
                }
            } else {
                ProbeOutcome::Failed {
                    reason: ProbeFailure::TokenMismatch,
                    message: format!(
                        "the file at {} does not contain the verification token",
                        url
                    ),
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => ProbeOutcome::Failed {
                reason: ProbeFailure::NetworkUnreachable,
                message: format!("probe task failed: {}", e),
            },
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
