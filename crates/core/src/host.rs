//! Hostname and domain utilities shared by method availability checks,
//! instruction rendering, and the DNS/email verification paths.

use std::net::IpAddr;

/// True when the address parses as a bare IPv4/IPv6 address.
pub fn is_ip_address(address: &str) -> bool {
    address.parse::<IpAddr>().is_ok()
}

/// Strip a trailing `:port` from a host string and lowercase it.
///
/// IPv6 literals in brackets keep their address untouched.
pub fn strip_port(address: &str) -> String {
    let trimmed = address.trim();
    if let Some(rest) = trimmed.strip_prefix('[') {
        // [::1]:25565 → ::1
        if let Some(end) = rest.find(']') {
            return rest[..end].to_ascii_lowercase();
        }
    }
    match trimmed.rsplit_once(':') {
        // A second ':' means an unbracketed IPv6 literal, not host:port.
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !host.contains(':') => {
            host.to_ascii_lowercase()
        }
        _ => trimmed.to_ascii_lowercase(),
    }
}

/// True when the host (after stripping any port) is a domain name rather
/// than an IP address.
pub fn is_domain(address: &str) -> bool {
    let host = strip_port(address);
    !host.is_empty() && !is_ip_address(&host)
}

/// Registrable domain of a hostname: `play.example.com` → `example.com`,
/// with a small allowance for common two-part TLDs such as `co.uk`.
///
/// Returns `None` for IP addresses and empty hosts.
pub fn registrable_domain(address: &str) -> Option<String> {
    let host = strip_port(address);
    if host.is_empty() || is_ip_address(&host) {
        return None;
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() < 2 {
        return Some(host);
    }

    let tld = parts[parts.len() - 1];
    let second = parts[parts.len() - 2];
    if parts.len() >= 3 && is_two_part_tld(second, tld) {
        return Some(format!("{}.{}.{}", parts[parts.len() - 3], second, tld));
    }
    Some(format!("{}.{}", second, tld))
}

/// Domain part of an email address, lowercased.
pub fn email_domain(email: &str) -> Option<String> {
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(domain.trim().to_ascii_lowercase())
}

fn is_two_part_tld(second: &str, tld: &str) -> bool {
    matches!(second, "co" | "com" | "org" | "net" | "gov" | "edu" | "ac")
        && matches!(tld, "uk" | "au" | "nz" | "za" | "in" | "jp")
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ip_addresses() {
        assert!(is_ip_address("192.168.1.1"));
        assert!(is_ip_address("::1"));
        assert!(!is_ip_address("play.example.com"));
        assert!(!is_ip_address("999.1.1.1"));
    }

    #[test]
    fn strips_ports() {
        assert_eq!(strip_port("Play.Example.com:25565"), "play.example.com");
        assert_eq!(strip_port("play.example.com"), "play.example.com");
        assert_eq!(strip_port("[::1]:25565"), "::1");
        assert_eq!(strip_port("fe80::1"), "fe80::1");
    }

    #[test]
    fn domain_check_excludes_ips() {
        assert!(is_domain("play.example.com:25565"));
        assert!(!is_domain("10.0.0.1:25565"));
        assert!(!is_domain(""));
    }

    #[test]
    fn registrable_domain_collapses_subdomains() {
        assert_eq!(
            registrable_domain("play.example.com").as_deref(),
            Some("example.com")
        );
        assert_eq!(
            registrable_domain("mc.server.example.co.uk").as_deref(),
            Some("example.co.uk")
        );
        assert_eq!(registrable_domain("example.com:7777").as_deref(), Some("example.com"));
        assert_eq!(registrable_domain("203.0.113.9"), None);
    }

    #[test]
    fn email_domain_extraction() {
        assert_eq!(
            email_domain("admin@Example.COM").as_deref(),
            Some("example.com")
        );
        assert_eq!(email_domain("not-an-email"), None);
        assert_eq!(email_domain("@example.com"), None);
        assert_eq!(email_domain("a@b@c"), None);
    }
}
