/*!
Hostname / domain utilities for realmscout.

This module centralizes:
- client hostname validation (lower-case, not a loopback alias)
- hostname syntax checks and IP literal detection
- parent-domain derivation and the label walk used by domain guessing
- `dc=` base DN decomposition
- LDAP URL construction (IPv6 literals bracketed)
- reading the kernel hostname for FQDN detection
*/

use std::fs;
use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{DiscoveryError, Result};

/// Hostnames that can never identify an enrolled client.
const LOOPBACK_NAMES: [&str; 2] = ["localhost", "localhost.localdomain"];

/// One DNS label: alphanumerics and inner hyphens, at most 63 octets.
static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)[a-z0-9_]([a-z0-9_-]{0,61}[a-z0-9_])?$").unwrap());

/// Normalize a domain: trim whitespace and the trailing dot, lower-case.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Validate the client hostname before any network activity.
///
/// Rejects names that are not entirely lower-case and the loopback aliases.
/// The FQDN (dot) requirement is checked by the discovery engine so that it
/// maps onto the `NotFqdn` outcome.
pub fn validate_client_hostname(hostname: &str) -> Result<()> {
    if hostname != hostname.to_lowercase() {
        return Err(DiscoveryError::invalid_hostname(
            hostname,
            "must be lower-case",
        ));
    }
    if LOOPBACK_NAMES.contains(&hostname) {
        return Err(DiscoveryError::invalid_hostname(
            hostname,
            "must not be used",
        ));
    }
    Ok(())
}

/// True if `host` is an IPv4 or IPv6 literal (optionally bracketed).
pub fn is_ip_literal(host: &str) -> bool {
    parse_ip_literal(host).is_some()
}

/// Parse an IP literal, accepting the `[v6]` form used in URLs.
pub fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    trimmed.parse::<IpAddr>().ok()
}

/// Syntactic hostname check (RFC 1123 labels, 253 octets max).
pub fn is_valid_hostname(host: &str) -> bool {
    let host = host.trim_end_matches('.');
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| LABEL_RE.is_match(label))
}

/// The hostname minus its leftmost label; `None` for single-label names.
pub fn parent_domain(host: &str) -> Option<String> {
    let host = host.trim_end_matches('.');
    let (_, rest) = host.split_once('.')?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_ascii_lowercase())
}

/// Progressively shorter parents of `domain`, starting with `domain` itself,
/// stopping before fewer than two labels remain.
///
/// `a.b.example.com` -> `["a.b.example.com", "b.example.com", "example.com"]`
pub fn domain_walk(domain: &str) -> Vec<String> {
    let mut labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    let mut out = Vec::new();
    while labels.len() >= 2 {
        out.push(labels.join(".").to_ascii_lowercase());
        labels.remove(0);
    }
    out
}

/// `example.com` -> `dc=example,dc=com`
pub fn basedn_from_domain(domain: &str) -> String {
    normalize_domain(domain)
        .split('.')
        .filter(|l| !l.is_empty())
        .map(|l| format!("dc={l}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build an `ldap://` URL, bracketing IPv6 literals.
pub fn ldap_url(host: &str, port: u16) -> String {
    match parse_ip_literal(host) {
        Some(IpAddr::V6(v6)) => format!("ldap://[{v6}]:{port}"),
        _ => format!("ldap://{host}:{port}"),
    }
}

/// Kernel hostname of this machine, as configured (may be a short name).
pub fn kernel_hostname() -> Option<String> {
    const SOURCES: [&str; 2] = ["/proc/sys/kernel/hostname", "/etc/hostname"];
    for path in SOURCES {
        if let Ok(content) = fs::read_to_string(path) {
            let name = content.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_client_hostname() {
        assert!(validate_client_hostname("client1.example.com").is_ok());
        assert!(validate_client_hostname("Client1.example.com").is_err());
        assert!(validate_client_hostname("localhost").is_err());
        assert!(validate_client_hostname("localhost.localdomain").is_err());
    }

    #[test]
    fn test_ip_literals() {
        assert!(is_ip_literal("10.0.0.5"));
        assert!(is_ip_literal("2001:db8::1"));
        assert!(is_ip_literal("[2001:db8::1]"));
        assert!(!is_ip_literal("server1.example.com"));
    }

    #[test]
    fn test_hostname_syntax() {
        assert!(is_valid_hostname("server1.example.com"));
        assert!(is_valid_hostname("server1.example.com."));
        assert!(!is_valid_hostname("-bad.example.com"));
        assert!(!is_valid_hostname("bad..example.com"));
        assert!(!is_valid_hostname("spaces in.example.com"));
        assert!(!is_valid_hostname(""));
    }

    #[test]
    fn test_parent_domain() {
        assert_eq!(
            parent_domain("client1.example.com").as_deref(),
            Some("example.com")
        );
        assert_eq!(parent_domain("client1"), None);
        assert_eq!(parent_domain("client1."), None);
    }

    #[test]
    fn test_domain_walk() {
        assert_eq!(
            domain_walk("a.b.example.com"),
            vec!["a.b.example.com", "b.example.com", "example.com"]
        );
        assert!(domain_walk("com").is_empty());
        assert_eq!(domain_walk("example.com."), vec!["example.com"]);
    }

    #[test]
    fn test_basedn_from_domain() {
        assert_eq!(basedn_from_domain("example.com"), "dc=example,dc=com");
        assert_eq!(basedn_from_domain("Sub.Example.COM."), "dc=sub,dc=example,dc=com");
    }

    #[test]
    fn test_ldap_url() {
        assert_eq!(ldap_url("server1.example.com", 389), "ldap://server1.example.com:389");
        assert_eq!(ldap_url("2001:db8::1", 389), "ldap://[2001:db8::1]:389");
        assert_eq!(ldap_url("10.0.0.5", 389), "ldap://10.0.0.5:389");
    }
}
