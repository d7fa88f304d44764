//! Verification methods: the four ways a claimant can prove control of a
//! listed server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The mechanism a claimant uses to prove control of a server.
///
/// The method is fixed for the lifetime of a claim initiation. Adding a
/// new method means adding a variant here plus one probe implementation
/// in `holist-engine`; the state machine is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    /// Token embedded in the game server's message-of-the-day.
    Motd,
    /// Token published as a DNS TXT record on the server's domain.
    DnsTxt,
    /// Token hosted as a well-known file on the server's website.
    FileUpload,
    /// Manual review of an email reply from the server's domain.
    Email,
}

impl VerificationMethod {
    /// All methods, in the order they are presented to users.
    pub const ALL: [VerificationMethod; 4] = [
        VerificationMethod::Motd,
        VerificationMethod::DnsTxt,
        VerificationMethod::FileUpload,
        VerificationMethod::Email,
    ];

    /// Wire name, e.g. `DNS_TXT`.
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationMethod::Motd => "MOTD",
            VerificationMethod::DnsTxt => "DNS_TXT",
            VerificationMethod::FileUpload => "FILE_UPLOAD",
            VerificationMethod::Email => "EMAIL",
        }
    }

    /// Human-readable name for UI display.
    pub fn display_name(self) -> &'static str {
        match self {
            VerificationMethod::Motd => "Server MOTD",
            VerificationMethod::DnsTxt => "DNS TXT Record",
            VerificationMethod::FileUpload => "File Upload",
            VerificationMethod::Email => "Email Domain",
        }
    }

    /// One-line description of what the method asks the claimant to do.
    pub fn description(self) -> &'static str {
        match self {
            VerificationMethod::Motd => {
                "Add the verification code to your server's message of the day (MOTD)."
            }
            VerificationMethod::DnsTxt => {
                "Add a DNS TXT record to your domain to prove ownership."
            }
            VerificationMethod::FileUpload => {
                "Host a verification file at a well-known path on your website."
            }
            VerificationMethod::Email => {
                "Verify using a registered email address on the server's domain (manual review)."
            }
        }
    }

    /// What the server listing must have for this method to be usable.
    pub fn requirement_hint(self) -> &'static str {
        match self {
            VerificationMethod::Motd => "Requires the server to be online and queryable.",
            VerificationMethod::DnsTxt => "Requires a domain name (not an IP address).",
            VerificationMethod::FileUpload => "Requires a reachable website or hostname.",
            VerificationMethod::Email => {
                "Requires your verified email domain to match the server's domain."
            }
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MOTD" => Ok(VerificationMethod::Motd),
            "DNS_TXT" => Ok(VerificationMethod::DnsTxt),
            "FILE_UPLOAD" => Ok(VerificationMethod::FileUpload),
            "EMAIL" => Ok(VerificationMethod::Email),
            other => Err(format!("unknown verification method '{}'", other)),
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for method in VerificationMethod::ALL {
            assert_eq!(method.as_str().parse::<VerificationMethod>(), Ok(method));
        }
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&VerificationMethod::DnsTxt).unwrap();
        assert_eq!(json, "\"DNS_TXT\"");
        let back: VerificationMethod = serde_json::from_str("\"FILE_UPLOAD\"").unwrap();
        assert_eq!(back, VerificationMethod::FileUpload);
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!("CARRIER_PIGEON".parse::<VerificationMethod>().is_err());
    }
}
