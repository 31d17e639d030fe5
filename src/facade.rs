use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discovery::{
    DiscoveryEngine, DiscoveryResult, Provenance, SearchOutcome, SearchRequest, Sourced,
};
use crate::dns::{DnsResolver, SystemResolver, candidate_hosts};
use crate::enrollment::EnrollmentState;
use crate::errors::{DiscoveryError, Result};
use crate::netutil::{
    is_ip_literal, kernel_hostname, normalize_domain, parent_domain, validate_client_hostname,
};
use crate::probe::{DirectoryProbe, LdapProbe, ProbeStatus};
use crate::structured_output::{DiscoveryReport, FieldSources, HostnameSource, OutputMetadata};

const NO_ANONYMOUS_ACCESS: &str = "Anonymous access to the LDAP server is disabled.";
const NO_TLS_CA: &str = "The LDAP server requires TLS but we do not have the CA.";

/// Caller-supplied hints for one discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRequest {
    pub servers: Vec<String>,
    pub domain: Option<String>,
    pub realm: Option<String>,
    pub hostname: Option<String>,
    pub ca_cert: Option<PathBuf>,
    /// Dry run: discover and validate without changing the identity domain.
    pub check: bool,
}

/// High-level façade providing the library-consumable discovery entry point.
///
/// Wraps the engine with the policy around it: hostname resolution, the
/// bounded retries, downgrading of access warnings, the DNS sanity check,
/// realm and enrollment conflict detection and report assembly. Nothing is
/// printed; callers render the returned [`DiscoveryReport`].
pub struct Discoverer {
    config: Config,
    resolver: Box<dyn DnsResolver>,
    probe: Box<dyn DirectoryProbe>,
}

impl Discoverer {
    pub fn new(
        config: Config,
        resolver: Box<dyn DnsResolver>,
        probe: Box<dyn DirectoryProbe>,
    ) -> Self {
        Self {
            config,
            resolver,
            probe,
        }
    }

    /// Discoverer on the system resolver and a real LDAP probe.
    pub fn from_config(config: Config) -> Result<Self> {
        let resolver = SystemResolver::from_system_conf(&config.network)?;
        let probe = LdapProbe::new(&config);
        Ok(Self::new(config, Box::new(resolver), Box::new(probe)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryReport> {
        let (hostname, hostname_source) = match &request.hostname {
            Some(h) => (h.trim().to_string(), HostnameSource::ExplicitOption),
            None => (self.machine_fqdn().await, HostnameSource::MachineFqdn),
        };
        if !hostname.is_empty() {
            validate_client_hostname(&hostname)?;
        }
        debug!(%hostname, ?hostname_source, check = request.check, "client hostname");

        let ca_cert = self.config.ca_cert_path(request.ca_cert.as_deref());
        let base = SearchRequest::new(hostname.clone())
            .with_servers(request.servers.iter().cloned())
            .with_ca_cert(ca_cert.clone());
        let servers = base.servers.clone();

        let mut engine =
            DiscoveryEngine::new(self.resolver.as_ref(), self.probe.as_ref(), &self.config.discovery);

        let mut first = base.clone();
        if let Some(domain) = &request.domain {
            first = first.with_domain(domain.clone());
        }
        if let Some(realm) = &request.realm {
            first = first.with_realm(realm.clone());
        }
        let mut outcome = engine.search(&first).await;

        if !servers.is_empty() && !outcome.found_server() {
            return Err(DiscoveryError::unverified_servers(&servers));
        }
        match outcome {
            SearchOutcome::BadHostConfig => {
                return Err(DiscoveryError::BadHostConfig {
                    reason: "no hostname available".into(),
                });
            }
            SearchOutcome::NotFqdn => return Err(DiscoveryError::NotFqdn { hostname }),
            _ => {}
        }

        let explicit_domain = request
            .domain
            .as_ref()
            .map(|d| Sourced::explicit(normalize_domain(d)))
            .or_else(|| {
                servers
                    .first()
                    .filter(|s| !is_ip_literal(s))
                    .and_then(|s| parent_domain(s))
                    .map(|d| Sourced::new(d, Provenance::DerivedFromServer))
            });

        if no_server(outcome) || engine.result().domain.is_none() {
            log_failure(&engine, outcome);
            let Some(domain) = explicit_domain else {
                return Err(DiscoveryError::DomainNotFound);
            };
            outcome = engine.search(&base.clone().with_sourced_domain(domain)).await;
        }

        let mut dnsok = false;
        if no_server(outcome) || engine.result().servers().is_empty() {
            debug!("no usable server after domain retry");
            if servers.is_empty() {
                return Err(DiscoveryError::server_not_found("Unable to find IPA Server to join"));
            }
            let mut retry = base.clone();
            if let Some(domain) = engine.result().domain.clone() {
                retry = retry.with_sourced_domain(domain);
            }
            outcome = engine.search(&retry).await;
        } else if servers.is_empty() {
            if let Some(domain) = engine.result().domain() {
                dnsok = engine.verify_dns(domain, ca_cert.as_deref()).await;
                if dnsok {
                    debug!(%domain, "DNS validated, enabling discovery");
                } else {
                    debug!(%domain, "DNS discovery failed, disabling discovery");
                }
            }
        } else {
            debug!("using servers from command line, disabling DNS discovery");
        }

        let mut warnings = Vec::new();
        match outcome {
            SearchOutcome::Success => {}
            SearchOutcome::NotIpaServer => {
                return Err(DiscoveryError::IncompatibleServer {
                    server: incompatible_server(&engine, &servers),
                });
            }
            SearchOutcome::NoAccessToLdap => {
                warn!("{NO_ANONYMOUS_ACCESS}");
                warnings.push(NO_ANONYMOUS_ACCESS.to_string());
            }
            SearchOutcome::NoTlsLdap => {
                warn!("{NO_TLS_CA}");
                warnings.push(NO_TLS_CA.to_string());
            }
            _ => {
                let tried = if servers.is_empty() {
                    engine.result().servers().to_vec()
                } else {
                    servers.clone()
                };
                return Err(DiscoveryError::unverified_servers(&tried));
            }
        }

        let result = engine.into_result();
        let (domain, realm, found_servers, basedn) = required_fields(&result)?;

        if dnsok && result.kdc.is_empty() {
            return Err(DiscoveryError::KdcNotConfigured {
                domain: realm.value.to_ascii_lowercase(),
            });
        }
        if dnsok {
            info!("Discovery was successful!");
        }

        if let Some(provided) = &request.realm
            && provided != &realm.value
        {
            return Err(DiscoveryError::realm_conflict(provided, &realm.value));
        }

        info!(%hostname, source = ?hostname_source, "Client hostname");
        info!(realm = %realm.value, source = %realm.source, "Realm");
        info!(domain = %domain.value, source = %domain.source, "DNS Domain");
        info!(servers = %found_servers.value.join(", "), source = %found_servers.source, "IPA Server");
        info!(basedn = %basedn.value, source = %basedn.source, "BaseDN");

        let ntp_servers = self.ntp_servers(&domain.value).await;

        if let Some(state) = EnrollmentState::load(&self.config.paths)? {
            state.check_conflict(&domain.value, &realm.value)?;
        }

        warnings.extend(result.warnings.iter().cloned());

        Ok(DiscoveryReport {
            metadata: OutputMetadata::new(),
            servers: found_servers.value.clone(),
            domain: domain.value.clone(),
            realm: realm.value.clone(),
            kdc: result.kdc.clone(),
            basedn: basedn.value.clone(),
            client_domain: parent_domain(&hostname).unwrap_or_default(),
            hostname,
            dnsok,
            subject_base: format!("O={}", realm.value),
            ntp_servers,
            sources: FieldSources {
                hostname: hostname_source,
                domain: domain.source,
                realm: realm.source,
                servers: found_servers.source,
                basedn: basedn.source,
            },
            warnings,
        })
    }

    /// Kernel hostname, canonicalized through DNS when it is a short name.
    async fn machine_fqdn(&self) -> String {
        let Some(name) = kernel_hostname() else {
            return String::new();
        };
        if name.contains('.') {
            return name;
        }
        let lookup = tokio::net::lookup_host((name.clone(), 0)).await;
        let addresses = match lookup {
            Ok(addrs) => addrs.map(|a| a.ip()).collect::<Vec<_>>(),
            Err(e) => {
                debug!(%name, %e, "cannot resolve short hostname");
                return name;
            }
        };
        for ip in addresses {
            if let Ok(Some(fqdn)) = self.resolver.reverse_lookup(ip).await
                && fqdn.contains('.')
            {
                return fqdn;
            }
        }
        name
    }

    /// Best effort: lookup failures yield an empty list.
    async fn ntp_servers(&self, domain: &str) -> Vec<String> {
        let (service, protocol) = &self.config.discovery.ntp_srv;
        match self.resolver.lookup_srv(service, protocol, domain).await {
            Ok(targets) => candidate_hosts(targets),
            Err(e) => {
                debug!(%e, %domain, "NTP SRV lookup failed");
                Vec::new()
            }
        }
    }
}

fn no_server(outcome: SearchOutcome) -> bool {
    matches!(outcome, SearchOutcome::NoLdapServer | SearchOutcome::NotIpaServer)
}

fn log_failure(engine: &DiscoveryEngine<'_>, outcome: SearchOutcome) {
    let last = engine.probes().last().map(|p| p.host.as_str());
    match (outcome, last) {
        (SearchOutcome::NoLdapServer, Some(host)) => info!("{host} is not an LDAP server"),
        (SearchOutcome::NoLdapServer, None) => info!("No LDAP server found"),
        (SearchOutcome::NotIpaServer, Some(host)) => info!("{host} is not an IPA server"),
        (SearchOutcome::NotIpaServer, None) => info!("No IPA server found"),
        _ => info!("Domain not found"),
    }
}

fn incompatible_server(engine: &DiscoveryEngine<'_>, servers: &[String]) -> String {
    engine
        .probes()
        .iter()
        .find(|p| p.status == ProbeStatus::NotCompatibleServer)
        .map(|p| p.host.clone())
        .or_else(|| servers.first().cloned())
        .unwrap_or_default()
}

type Fields<'r> = (
    &'r Sourced<String>,
    &'r Sourced<String>,
    &'r Sourced<Vec<String>>,
    &'r Sourced<String>,
);

fn required_fields(result: &DiscoveryResult) -> Result<Fields<'_>> {
    let domain = result.domain.as_ref().ok_or(DiscoveryError::DomainNotFound)?;
    let servers = result
        .servers
        .as_ref()
        .filter(|s| !s.value.is_empty())
        .ok_or_else(|| DiscoveryError::server_not_found("Unable to find IPA Server to join"))?;
    let realm = result
        .realm
        .as_ref()
        .ok_or_else(|| DiscoveryError::internal("realm missing after successful discovery"))?;
    let basedn = result
        .basedn
        .as_ref()
        .ok_or_else(|| DiscoveryError::internal("base DN missing after successful discovery"))?;
    Ok((domain, realm, servers, basedn))
}
