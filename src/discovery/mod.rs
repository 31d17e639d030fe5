//! Realm / server discovery.
//!
//! The engine walks a fixed ladder of stages (explicit servers, SRV in a
//! given domain, SRV in guessed parent domains, address fallback) and stops
//! at the first stage that reaches a verdict. Every fact it records carries
//! the [`Provenance`] of the layer that produced it.
//!
//! ```ignore
//! let mut engine = DiscoveryEngine::new(&resolver, &probe, &config.discovery);
//! let outcome = engine.search(&SearchRequest::new("client1.example.com")).await;
//! if outcome.is_success() {
//!     println!("{:?}", engine.result().servers());
//! }
//! ```

mod engine;
mod stages;

pub use engine::DiscoveryEngine;

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::probe::ProbeStatus;

/// Where a discovered fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Supplied by the caller
    ExplicitOption,
    /// Parent domain of an explicitly supplied server
    DerivedFromServer,
    /// `_ldap._tcp` / `_kerberos._udp` SRV answers
    DnsSrvRecord,
    /// PTR record of an IP-literal server
    DnsReverseLookup,
    /// Parent domain of the client hostname
    DnsHostDomain,
    /// A/AAAA record of the conventional server name
    DnsAddressRecord,
    /// Read from the directory server's root entry
    DirectoryRootEntry,
    /// Computed from the domain (upper-cased realm, `dc=` base DN)
    DerivedFromDomain,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provenance::ExplicitOption => "explicit-option",
            Provenance::DerivedFromServer => "derived-from-server",
            Provenance::DnsSrvRecord => "dns-srv-record",
            Provenance::DnsReverseLookup => "dns-reverse-lookup",
            Provenance::DnsHostDomain => "dns-host-domain",
            Provenance::DnsAddressRecord => "dns-address-record",
            Provenance::DirectoryRootEntry => "directory-root-entry",
            Provenance::DerivedFromDomain => "derived-from-domain",
        };
        f.write_str(s)
    }
}

/// A value together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Sourced<T> {
    pub value: T,
    pub source: Provenance,
}

impl<T> Sourced<T> {
    pub fn new(value: T, source: Provenance) -> Self {
        Self { value, source }
    }

    pub fn explicit(value: T) -> Self {
        Self::new(value, Provenance::ExplicitOption)
    }
}

/// Store `value` if nothing was recorded yet; an explicit hint always wins.
fn record<T>(slot: &mut Option<Sourced<T>>, value: T, source: Provenance) {
    if slot.is_none() || source == Provenance::ExplicitOption {
        *slot = Some(Sourced::new(value, source));
    }
}

/// Everything one engine has learned, accumulated across its searches.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub domain: Option<Sourced<String>>,
    pub realm: Option<Sourced<String>>,
    /// Preference order; the first entry is the primary server.
    pub servers: Option<Sourced<Vec<String>>>,
    pub basedn: Option<Sourced<String>>,
    pub kdc: Vec<String>,
    pub client_hostname: String,
    pub warnings: Vec<String>,
}

impl DiscoveryResult {
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_ref().map(|d| d.value.as_str())
    }

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_ref().map(|r| r.value.as_str())
    }

    pub fn servers(&self) -> &[String] {
        self.servers
            .as_ref()
            .map(|s| s.value.as_slice())
            .unwrap_or_default()
    }

    pub fn primary_server(&self) -> Option<&str> {
        self.servers().first().map(String::as_str)
    }

    pub fn basedn(&self) -> Option<&str> {
        self.basedn.as_ref().map(|b| b.value.as_str())
    }

    fn warn(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }
}

/// Verdict of one `search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchOutcome {
    Success,
    NotFqdn,
    NoLdapServer,
    NotIpaServer,
    NoAccessToLdap,
    NoTlsLdap,
    DomainNotFound,
    BadHostConfig,
}

impl SearchOutcome {
    /// Numeric outcome code (0 on success, negative otherwise).
    pub fn code(self) -> i32 {
        match self {
            SearchOutcome::Success => 0,
            SearchOutcome::NotFqdn => -1,
            SearchOutcome::NoLdapServer => -2,
            SearchOutcome::NotIpaServer => -4,
            SearchOutcome::NoAccessToLdap => -5,
            SearchOutcome::NoTlsLdap => -6,
            SearchOutcome::DomainNotFound => -7,
            SearchOutcome::BadHostConfig => -10,
        }
    }

    pub fn is_success(self) -> bool {
        self == SearchOutcome::Success
    }

    /// A server was found, possibly with a downgradable warning.
    pub fn found_server(self) -> bool {
        matches!(
            self,
            SearchOutcome::Success | SearchOutcome::NoAccessToLdap | SearchOutcome::NoTlsLdap
        )
    }

    /// The outcome of accepting a server with this probe status.
    pub fn from_probe(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Ok => SearchOutcome::Success,
            ProbeStatus::NoAnonymousAccess => SearchOutcome::NoAccessToLdap,
            ProbeStatus::TlsRequiredUnavailable => SearchOutcome::NoTlsLdap,
            ProbeStatus::NotCompatibleServer => SearchOutcome::NotIpaServer,
            ProbeStatus::NoServerReachable | ProbeStatus::BadHostnameFormat => {
                SearchOutcome::NoLdapServer
            }
        }
    }
}

impl std::fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SearchOutcome::Success => "success",
            SearchOutcome::NotFqdn => "not-fqdn",
            SearchOutcome::NoLdapServer => "no-ldap-server",
            SearchOutcome::NotIpaServer => "not-ipa-server",
            SearchOutcome::NoAccessToLdap => "no-access-to-ldap",
            SearchOutcome::NoTlsLdap => "no-tls-ldap",
            SearchOutcome::DomainNotFound => "domain-not-found",
            SearchOutcome::BadHostConfig => "bad-host-config",
        };
        f.write_str(s)
    }
}

/// Hints for one `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub domain: Option<Sourced<String>>,
    pub servers: Vec<String>,
    pub realm: Option<String>,
    pub hostname: String,
    pub ca_cert: Option<PathBuf>,
}

impl SearchRequest {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    pub fn with_domain(self, domain: impl Into<String>) -> Self {
        self.with_sourced_domain(Sourced::explicit(domain.into()))
    }

    pub fn with_sourced_domain(mut self, domain: Sourced<String>) -> Self {
        self.domain = Some(Sourced::new(
            crate::netutil::normalize_domain(&domain.value),
            domain.source,
        ));
        self
    }

    pub fn with_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers = servers
            .into_iter()
            .map(|s| crate::netutil::normalize_domain(&s.into()))
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_ca_cert(mut self, path: Option<PathBuf>) -> Self {
        self.ca_cert = path;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_first_value() {
        let mut slot = None;
        record(&mut slot, "example.com".to_string(), Provenance::DnsSrvRecord);
        record(&mut slot, "other.com".to_string(), Provenance::DnsHostDomain);
        let slot = slot.unwrap();
        assert_eq!(slot.value, "example.com");
        assert_eq!(slot.source, Provenance::DnsSrvRecord);
    }

    #[test]
    fn record_explicit_hint_overwrites() {
        let mut slot = Some(Sourced::new("example.com".to_string(), Provenance::DnsSrvRecord));
        record(&mut slot, "sub.example.com".to_string(), Provenance::ExplicitOption);
        assert_eq!(slot, Some(Sourced::explicit("sub.example.com".to_string())));
    }

    #[test]
    fn outcome_codes() {
        assert_eq!(SearchOutcome::Success.code(), 0);
        assert_eq!(SearchOutcome::BadHostConfig.code(), -10);
        assert!(SearchOutcome::NoAccessToLdap.found_server());
        assert!(!SearchOutcome::NotIpaServer.found_server());
        assert_eq!(
            SearchOutcome::from_probe(ProbeStatus::TlsRequiredUnavailable),
            SearchOutcome::NoTlsLdap
        );
    }

    #[test]
    fn provenance_serializes_kebab_case() {
        let json = serde_json::to_string(&Provenance::DnsSrvRecord).unwrap();
        assert_eq!(json, "\"dns-srv-record\"");
        assert_eq!(Provenance::DerivedFromServer.to_string(), "derived-from-server");
    }

    #[test]
    fn request_normalizes_hints() {
        let req = SearchRequest::new("client1.example.com")
            .with_domain("Example.COM.")
            .with_servers(["Server1.Example.com.", " "]);
        assert_eq!(req.domain.unwrap().value, "example.com");
        assert_eq!(req.servers, vec!["server1.example.com"]);
    }
}
