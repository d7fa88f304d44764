//! DNS TXT probe.
//!
//! Looks for the token in a TXT record at `_hol-verify.<host>`, falling
//! back to an apex record of the form `hol-verify=<token>` for hosts
//! whose DNS provider cannot create underscore labels.

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;

use holist_core::host::{is_domain, strip_port};
use holist_core::instructions::{dns_record_name, APEX_TXT_PREFIX};
use holist_core::VerificationMethod;
use holist_storage::{ServerRecord, UserRecord};

use super::{Probe, ProbeFailure, ProbeOutcome};

enum LookupIssue {
    /// NXDOMAIN or an empty answer.
    Absent,
    Timeout,
    Network(String),
}

pub struct DnsTxtProbe {
    resolver: TokioAsyncResolver,
    timeout_secs: u64,
}

impl DnsTxtProbe {
    pub fn new(timeout_secs: u64) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(timeout_secs);
        DnsTxtProbe {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
            timeout_secs,
        }
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, LookupIssue> {
        match self.resolver.txt_lookup(name.to_string()).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|part| String::from_utf8_lossy(part).into_owned())
                        .collect::<String>()
                })
                .collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Err(LookupIssue::Absent),
                ResolveErrorKind::Timeout => Err(LookupIssue::Timeout),
                _ => Err(LookupIssue::Network(e.to_string())),
            },
        }
    }
}

/// Exact-value match for the dedicated `_hol-verify` label.
pub(crate) fn matches_subdomain(values: &[String], token: &str) -> bool {
    values.iter().any(|v| v.trim() == token)
}

/// Prefixed match for an apex TXT record.
pub(crate) fn matches_apex(values: &[String], token: &str) -> bool {
    values
        .iter()
        .filter_map(|v| v.trim().strip_prefix(APEX_TXT_PREFIX))
        .any(|rest| rest == token)
}

#[async_trait]
impl Probe for DnsTxtProbe {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::DnsTxt
    }

    fn unavailable_reason(
        &self,
        server: &ServerRecord,
        _user: Option<&UserRecord>,
    ) -> Option<String> {
        if is_domain(&server.host) {
            None
        } else {
            Some("DNS verification requires the server to be listed under a domain name".into())
        }
    }

    async fn probe(&self, server: &ServerRecord, token: &str) -> ProbeOutcome {
        let host = strip_port(&server.host);
        let record_name = dns_record_name(&server.host);

        match self.lookup_txt(&record_name).await {
            Ok(values) if matches_subdomain(&values, token) => {
                return ProbeOutcome::Verified {
                    message: format!("TXT record found at {}", record_name),
                }
            }
            // Wrong or missing value at the label; the apex may still match.
            Ok(_) | Err(LookupIssue::Absent) => {}
            Err(LookupIssue::Timeout) => {
                return ProbeOutcome::Failed {
                    reason: ProbeFailure::Timeout,
                    message: format!(
                        "DNS lookup for {} timed out after {}s",
                        record_name, self.timeout_secs
                    ),
                }
            }
            Err(LookupIssue::Network(e)) => {
                return ProbeOutcome::Failed {
                    reason: ProbeFailure::NetworkUnreachable,
                    message: format!("DNS lookup for {} failed: {}", record_name, e),
                }
            }
        }

        match self.lookup_txt(&host).await {
            Ok(values) if matches_apex(&values, token) => ProbeOutcome::Verified {
                message: format!("apex TXT record found at {}", host),
            },
            Ok(_) | Err(LookupIssue::Absent) => ProbeOutcome::Failed {
                reason: ProbeFailure::TokenMismatch,
                message: format!(
                    "no TXT record with the verification token at {} or {}",
                    record_name, host
                ),
            },
            Err(LookupIssue::Timeout) => ProbeOutcome::Failed {
                reason: ProbeFailure::Timeout,
                message: format!(
                    "DNS lookup for {} timed out after {}s",
                    host, self.timeout_secs
                ),
            },
            Err(LookupIssue::Network(e)) => ProbeOutcome::Failed {
                reason: ProbeFailure::NetworkUnreachable,
                message: format!("DNS lookup for {} failed: {}", host, e),
            },
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
