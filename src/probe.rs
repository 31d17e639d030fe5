//! Directory probe.
//!
//! A probe answers one question about one candidate host: is this a
//! reachable directory server of the expected product, and if so what is its
//! base DN (and, when advertised, its Kerberos realm)? Probes are read-only:
//! an anonymous bind, a root entry read and a handful of base-scope searches.
//! Calling one repeatedly against the same server yields the same status.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Config;
use crate::netutil::{is_ip_literal, is_valid_hostname, ldap_url};

/// Classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeStatus {
    Ok,
    NoServerReachable,
    NotCompatibleServer,
    NoAnonymousAccess,
    TlsRequiredUnavailable,
    BadHostnameFormat,
}

impl ProbeStatus {
    /// Reachable and not known to be the wrong product.
    ///
    /// Access-denied and TLS-required servers count: an authenticated step
    /// follows discovery and supplies its own credentials.
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            ProbeStatus::Ok | ProbeStatus::NoAnonymousAccess | ProbeStatus::TlsRequiredUnavailable
        )
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProbeStatus::Ok => "ok",
            ProbeStatus::NoServerReachable => "no-server-reachable",
            ProbeStatus::NotCompatibleServer => "not-compatible-server",
            ProbeStatus::NoAnonymousAccess => "no-anonymous-access",
            ProbeStatus::TlsRequiredUnavailable => "tls-required-unavailable",
            ProbeStatus::BadHostnameFormat => "bad-hostname-format",
        };
        f.write_str(s)
    }
}

/// Attributes read from a compatible server's root entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootEntry {
    pub basedn: String,
    /// The single Kerberos realm the server advertises, if exactly one.
    pub realm: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_version: Option<String>,
    pub naming_contexts: Vec<String>,
}

/// Result of probing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub host: String,
    pub status: ProbeStatus,
    /// The candidate was an IP literal; later join steps need an FQDN.
    pub ip_literal: bool,
    pub root: Option<RootEntry>,
}

impl ProbeOutcome {
    pub fn new(host: impl Into<String>, status: ProbeStatus) -> Self {
        let host = host.into();
        Self {
            ip_literal: is_ip_literal(&host),
            host,
            status,
            root: None,
        }
    }

    pub fn with_root(mut self, root: RootEntry) -> Self {
        self.root = Some(root);
        self
    }
}

/// Something that can classify a candidate directory server.
#[async_trait]
pub trait DirectoryProbe: Send + Sync {
    async fn probe(&self, host: &str, ca_cert: Option<&Path>) -> ProbeOutcome;
}

/// LDAP result codes that mean "the server refuses anonymous readers".
const ACCESS_DENIED_CODES: [u32; 3] = [48, 50, 53];
/// LDAP result codes that mean "talk to me over TLS".
const TLS_REQUIRED_CODES: [u32; 2] = [8, 13];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    AccessDenied,
    TlsRequired,
    Unreachable,
    Rejected(u32),
}

fn classify(err: &LdapError) -> Failure {
    match err {
        LdapError::LdapResult { result } if ACCESS_DENIED_CODES.contains(&result.rc) => {
            Failure::AccessDenied
        }
        LdapError::LdapResult { result } if TLS_REQUIRED_CODES.contains(&result.rc) => {
            Failure::TlsRequired
        }
        LdapError::LdapResult { result } => Failure::Rejected(result.rc),
        _ => Failure::Unreachable,
    }
}

fn first_attr(attrs: &HashMap<String, Vec<String>>, name: &str) -> Option<String> {
    all_attr(attrs, name).into_iter().next()
}

fn all_attr(attrs: &HashMap<String, Vec<String>>, name: &str) -> Vec<String> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

/// Probe over LDAP (port 389, StartTLS when a CA certificate is supplied).
pub struct LdapProbe {
    port: u16,
    connect_timeout: Duration,
    op_timeout: Duration,
    compat_marker: String,
}

impl LdapProbe {
    pub fn new(config: &Config) -> Self {
        Self {
            port: config.discovery.ldap_port,
            connect_timeout: config.network.ldap_connect_timeout,
            op_timeout: config.network.ldap_op_timeout,
            compat_marker: config.discovery.compat_marker.clone(),
        }
    }

    /// Upper bound for a whole probe: connect plus every operation it issues.
    fn budget(&self) -> Duration {
        self.connect_timeout + self.op_timeout * 6
    }

    async fn settings(&self, ca_cert: Option<&Path>) -> Result<LdapConnSettings, String> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.connect_timeout);
        let Some(path) = ca_cert else {
            return Ok(settings);
        };
        let pem = tokio::fs::read(path)
            .await
            .map_err(|e| format!("cannot read CA certificate {}: {e}", path.display()))?;
        let cert = native_tls::Certificate::from_pem(&pem)
            .map_err(|e| format!("invalid CA certificate {}: {e}", path.display()))?;
        let connector = native_tls::TlsConnector::builder()
            .add_root_certificate(cert)
            .build()
            .map_err(|e| format!("TLS setup failed: {e}"))?;
        Ok(settings.set_starttls(true).set_connector(connector))
    }

    async fn run(&self, host: &str, ca_cert: Option<&Path>) -> (ProbeStatus, Option<RootEntry>) {
        let settings = match self.settings(ca_cert).await {
            Ok(s) => s,
            Err(reason) => {
                // Without a working connector there is no connection at all.
                warn!(%host, %reason, "CA certificate unusable");
                return (ProbeStatus::NoServerReachable, None);
            }
        };

        let url = ldap_url(host, self.port);
        debug!(%url, starttls = ca_cert.is_some(), "connecting");
        let (conn, mut ldap) = match LdapConnAsync::with_settings(settings, &url).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(%host, error = %e, "connection failed");
                return (ProbeStatus::NoServerReachable, None);
            }
        };
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                debug!(error = %e, "LDAP connection closed with error");
            }
        });

        let result = self.inspect(host, &mut ldap).await;
        if let Err(e) = ldap.unbind().await {
            debug!(%host, error = %e, "unbind failed");
        }
        result
    }

    async fn inspect(&self, host: &str, ldap: &mut Ldap) -> (ProbeStatus, Option<RootEntry>) {
        let mut anonymous_denied = false;
        let bind = ldap
            .with_timeout(self.op_timeout)
            .simple_bind("", "")
            .await
            .and_then(|r| r.success());
        if let Err(e) = bind {
            match classify(&e) {
                Failure::AccessDenied => {
                    debug!(%host, "anonymous bind refused, trying unauthenticated read");
                    anonymous_denied = true;
                }
                Failure::TlsRequired => return (ProbeStatus::TlsRequiredUnavailable, None),
                Failure::Unreachable => return (ProbeStatus::NoServerReachable, None),
                Failure::Rejected(rc) => {
                    debug!(%host, rc, "anonymous bind rejected");
                    return (ProbeStatus::NotCompatibleServer, None);
                }
            }
        }

        let root_attrs = match self.read_root_dse(ldap).await {
            Ok(attrs) => attrs,
            Err(Failure::AccessDenied) => return (ProbeStatus::NoAnonymousAccess, None),
            Err(Failure::TlsRequired) => return (ProbeStatus::TlsRequiredUnavailable, None),
            Err(Failure::Unreachable) => return (ProbeStatus::NoServerReachable, None),
            Err(Failure::Rejected(rc)) => {
                debug!(%host, rc, "root entry read rejected");
                return (ProbeStatus::NotCompatibleServer, None);
            }
        };

        let mut contexts = all_attr(&root_attrs, "namingContexts");
        if let Some(default) = first_attr(&root_attrs, "defaultNamingContext") {
            contexts.retain(|c| !c.eq_ignore_ascii_case(&default));
            contexts.insert(0, default);
        }

        let mut context_denied = false;
        let mut basedn = None;
        for context in &contexts {
            match self.read_info(ldap, context).await {
                Ok(values) if values.iter().any(|v| v.eq_ignore_ascii_case(&self.compat_marker)) => {
                    basedn = Some(context.clone());
                    break;
                }
                Ok(_) => {}
                Err(Failure::AccessDenied) => context_denied = true,
                Err(Failure::Unreachable) => return (ProbeStatus::NoServerReachable, None),
                Err(_) => {}
            }
        }

        let Some(basedn) = basedn else {
            if anonymous_denied || context_denied {
                return (ProbeStatus::NoAnonymousAccess, None);
            }
            debug!(%host, ?contexts, "no naming context carries the product marker");
            return (ProbeStatus::NotCompatibleServer, None);
        };

        let realm = self.read_realm(ldap, &basedn).await;
        let root = RootEntry {
            basedn,
            realm,
            vendor_name: first_attr(&root_attrs, "vendorName"),
            vendor_version: first_attr(&root_attrs, "vendorVersion"),
            naming_contexts: contexts,
        };

        let status = if anonymous_denied {
            ProbeStatus::NoAnonymousAccess
        } else {
            ProbeStatus::Ok
        };
        (status, Some(root))
    }

    async fn read_root_dse(
        &self,
        ldap: &mut Ldap,
    ) -> Result<HashMap<String, Vec<String>>, Failure> {
        let (entries, _) = ldap
            .with_timeout(self.op_timeout)
            .search(
                "",
                Scope::Base,
                "(objectClass=*)",
                vec![
                    "namingContexts",
                    "defaultNamingContext",
                    "vendorName",
                    "vendorVersion",
                ],
            )
            .await
            .and_then(|r| r.success())
            .map_err(|e| classify(&e))?;
        Ok(entries
            .into_iter()
            .next()
            .map(|e| SearchEntry::construct(e).attrs)
            .unwrap_or_default())
    }

    async fn read_info(&self, ldap: &mut Ldap, context: &str) -> Result<Vec<String>, Failure> {
        let (entries, _) = ldap
            .with_timeout(self.op_timeout)
            .search(context, Scope::Base, "(objectClass=*)", vec!["info"])
            .await
            .and_then(|r| r.success())
            .map_err(|e| classify(&e))?;
        Ok(entries
            .into_iter()
            .next()
            .map(|e| all_attr(&SearchEntry::construct(e).attrs, "info"))
            .unwrap_or_default())
    }

    async fn read_realm(&self, ldap: &mut Ldap, basedn: &str) -> Option<String> {
        let base = format!("cn=kerberos,{basedn}");
        let found = ldap
            .with_timeout(self.op_timeout)
            .search(
                &base,
                Scope::Subtree,
                "(objectClass=krbRealmContainer)",
                vec!["cn"],
            )
            .await
            .and_then(|r| r.success());
        let (entries, _) = match found {
            Ok(pair) => pair,
            Err(e) => {
                debug!(%base, error = %e, "realm container not readable");
                return None;
            }
        };
        let realms: Vec<String> = entries
            .into_iter()
            .filter_map(|e| first_attr(&SearchEntry::construct(e).attrs, "cn"))
            .collect();
        match realms.as_slice() {
            [realm] => Some(realm.to_ascii_uppercase()),
            [] => None,
            many => {
                debug!(?many, "several realms advertised, not choosing one");
                None
            }
        }
    }
}

#[async_trait]
impl DirectoryProbe for LdapProbe {
    async fn probe(&self, host: &str, ca_cert: Option<&Path>) -> ProbeOutcome {
        if !is_ip_literal(host) && !is_valid_hostname(host) {
            return ProbeOutcome::new(host, ProbeStatus::BadHostnameFormat);
        }

        let (status, root) = match timeout(self.budget(), self.run(host, ca_cert)).await {
            Ok(pair) => pair,
            Err(_) => {
                debug!(%host, "probe timed out");
                (ProbeStatus::NoServerReachable, None)
            }
        };
        debug!(%host, %status, "probe finished");

        let outcome = ProbeOutcome::new(host, status);
        match root {
            Some(root) => outcome.with_root(root),
            None => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_statuses() {
        assert!(ProbeStatus::Ok.is_usable());
        assert!(ProbeStatus::NoAnonymousAccess.is_usable());
        assert!(ProbeStatus::TlsRequiredUnavailable.is_usable());
        assert!(!ProbeStatus::NotCompatibleServer.is_usable());
        assert!(!ProbeStatus::NoServerReachable.is_usable());
        assert!(!ProbeStatus::BadHostnameFormat.is_usable());
    }

    #[test]
    fn outcome_flags_ip_literals() {
        assert!(ProbeOutcome::new("10.0.0.5", ProbeStatus::Ok).ip_literal);
        assert!(!ProbeOutcome::new("server1.example.com", ProbeStatus::Ok).ip_literal);
    }

    #[test]
    fn attribute_lookup_is_case_insensitive() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "namingcontexts".to_string(),
            vec!["dc=example,dc=com".to_string(), "o=netscaperoot".to_string()],
        );
        assert_eq!(all_attr(&attrs, "namingContexts").len(), 2);
        assert_eq!(
            first_attr(&attrs, "NAMINGCONTEXTS").as_deref(),
            Some("dc=example,dc=com")
        );
        assert_eq!(first_attr(&attrs, "vendorName"), None);
    }

    #[tokio::test]
    async fn malformed_hostname_is_rejected_without_network() {
        let probe = LdapProbe::new(&Config::default());
        let outcome = probe.probe("bad host!.example.com", None).await;
        assert_eq!(outcome.status, ProbeStatus::BadHostnameFormat);
        assert!(outcome.root.is_none());
    }

    /// Probe aimed at a local port nobody listens on.
    fn closed_port_probe() -> LdapProbe {
        // Grab a free port and release it so nothing is listening.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .map(|a| a.port())
            .unwrap();
        let mut config = Config::default();
        config.discovery.ldap_port = port;
        config.network.ldap_connect_timeout = Duration::from_secs(2);
        LdapProbe::new(&config)
    }

    #[tokio::test]
    async fn unusable_ca_certificate_is_unreachable() {
        let probe = closed_port_probe();

        let missing = probe
            .probe("127.0.0.1", Some(Path::new("/nonexistent/realmscout/ca.pem")))
            .await;
        assert_eq!(missing.status, ProbeStatus::NoServerReachable);
        assert!(!missing.status.is_usable());

        let garbage = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(garbage.path(), "not a certificate").unwrap();
        let invalid = probe.probe("127.0.0.1", Some(garbage.path())).await;
        assert_eq!(invalid.status, ProbeStatus::NoServerReachable);
        assert!(invalid.root.is_none());
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable_every_time() {
        let probe = closed_port_probe();

        let first = probe.probe("127.0.0.1", None).await;
        let second = probe.probe("127.0.0.1", None).await;
        assert_eq!(first.status, ProbeStatus::NoServerReachable);
        assert_eq!(first, second);
        assert!(first.ip_literal);
    }
}
