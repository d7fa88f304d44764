//! Human-readable instructions for embedding a verification token, one
//! rendering per verification method.

use crate::host::{registrable_domain, strip_port};
use crate::method::VerificationMethod;

/// DNS label the TXT probe queries under the server's host.
pub const DNS_LABEL: &str = "_hol-verify";

/// Prefix accepted for an apex-level TXT record, `hol-verify=<token>`.
pub const APEX_TXT_PREFIX: &str = "hol-verify=";

/// Well-known path the file probe fetches.
pub const WELL_KNOWN_PATH: &str = ".well-known/hol-verify.txt";

/// The server listing fields instruction rendering needs.
#[derive(Debug, Clone, Copy)]
pub struct ListingRef<'a> {
    pub host: &'a str,
    pub port: u16,
    pub website_url: Option<&'a str>,
}

/// Render per-method instructions for embedding `token`.
pub fn render(method: VerificationMethod, listing: ListingRef<'_>, token: &str) -> String {
    match method {
        VerificationMethod::Motd => format!(
            "Set your server's message of the day (MOTD) to contain:\n\n    {token}\n\n\
             Make sure the server is online and reachable at {host}:{port}, then trigger \
             verification. You can remove the code afterwards.",
            token = token,
            host = listing.host,
            port = listing.port,
        ),
        VerificationMethod::DnsTxt => {
            let host = strip_port(listing.host);
            format!(
                "Publish a DNS TXT record for your domain:\n\n    \
                 Host/Name: {label}.{host}\n    Type: TXT\n    Value: {token}\n\n\
                 Alternatively, add a TXT record on the root domain with value \
                 {prefix}{token}. Allow time for DNS propagation before triggering \
                 verification; the record can be removed afterwards.",
                label = DNS_LABEL,
                host = host,
                token = token,
                prefix = APEX_TXT_PREFIX,
            )
        }
        VerificationMethod::FileUpload => {
            let base = file_probe_base(listing);
            format!(
                "Host a plain-text file at:\n\n    {base}/{path}\n\n\
                 containing exactly this verification code:\n\n    {token}\n\n\
                 The file must be publicly readable. It can be deleted after \
                 verification succeeds.",
                base = base,
                path = WELL_KNOWN_PATH,
                token = token,
            )
        }
        VerificationMethod::Email => format!(
            "Reply from an email address at the server's registered domain and include \
             this verification code in the message body:\n\n    {token}\n\n\
             Email claims are reviewed manually by an administrator; the claim stays \
             pending until approved.",
            token = token,
        ),
    }
}

/// Base URL the file probe fetches from: the listing's website when
/// configured, otherwise plain HTTP against the host.
pub fn file_probe_base(listing: ListingRef<'_>) -> String {
    match listing.website_url {
        Some(url) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
        _ => format!("http://{}", strip_port(listing.host)),
    }
}

/// Fully-qualified name the DNS probe queries for a listing host.
pub fn dns_record_name(host: &str) -> String {
    format!("{}.{}", DNS_LABEL, strip_port(host))
}

/// Availability-hint helper: the registrable domain a claimant's email
/// must match for the EMAIL method.
pub fn email_match_domain(host: &str) -> Option<String> {
    registrable_domain(host)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
