//! Verification token and identifier minting.
//!
//! Tokens come from the OS CSPRNG and carry no recoverable relation to
//! the server or user they are bound to. A fresh token is minted on every
//! initiation; tokens are never reused.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;

/// Token entropy: 24 bytes = 192 bits, comfortably above the 128-bit floor.
const TOKEN_BYTES: usize = 24;

/// Claim record identifiers are 16 random bytes, hex-encoded.
const ID_BYTES: usize = 16;

/// Mint a verification token: URL-safe base64 of 24 CSPRNG bytes.
pub fn issue_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE64_URL.encode(bytes)
}

/// Mint a claim record identifier (lowercase hex).
pub fn new_claim_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_never_repeated() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(issue_token()), "token collision");
        }
    }

    #[test]
    fn token_has_expected_length_and_alphabet() {
        let token = issue_token();
        // 24 bytes → 32 base64 chars, no padding.
        assert_eq!(token.len(), 32);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn claim_ids_are_hex_and_unique() {
        let id = new_claim_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_claim_id(), new_claim_id());
    }
}
