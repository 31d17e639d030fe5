use std::path::Path;

use tracing::{debug, info, trace, warn};

use super::stages::{
    AddressFallback, DomainGuess, DomainSrv, ExplicitServers, SearchContext, Stage, StageResult,
};
use super::{DiscoveryResult, Provenance, SearchOutcome, SearchRequest, Sourced, record};
use crate::config::DiscoveryConfig;
use crate::dns::{DnsResolver, candidate_hosts};
use crate::netutil::{basedn_from_domain, normalize_domain};
use crate::probe::{DirectoryProbe, ProbeOutcome};

/// Runs the discovery ladder and owns everything it learns.
///
/// One engine serves one discovery: repeated `search` calls accumulate into
/// the same [`DiscoveryResult`].
pub struct DiscoveryEngine<'a> {
    resolver: &'a dyn DnsResolver,
    prober: &'a dyn DirectoryProbe,
    settings: &'a DiscoveryConfig,
    result: DiscoveryResult,
    probes: Vec<ProbeOutcome>,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(
        resolver: &'a dyn DnsResolver,
        prober: &'a dyn DirectoryProbe,
        settings: &'a DiscoveryConfig,
    ) -> Self {
        Self {
            resolver,
            prober,
            settings,
            result: DiscoveryResult::default(),
            probes: Vec::new(),
        }
    }

    pub fn result(&self) -> &DiscoveryResult {
        &self.result
    }

    pub fn into_result(self) -> DiscoveryResult {
        self.result
    }

    /// Every probe made by the most recent `search`, in order.
    pub fn probes(&self) -> &[ProbeOutcome] {
        &self.probes
    }

    /// Run the ladder once with the given hints.
    pub async fn search(&mut self, request: &SearchRequest) -> SearchOutcome {
        self.probes.clear();

        let hostname = normalize_domain(&request.hostname);
        if hostname.is_empty() {
            warn!("no client hostname to search from");
            return SearchOutcome::BadHostConfig;
        }
        if !hostname.contains('.') {
            warn!(%hostname, "client hostname is not fully qualified");
            return SearchOutcome::NotFqdn;
        }
        self.result.client_hostname = hostname;

        if let Some(domain) = &request.domain {
            record(&mut self.result.domain, domain.value.clone(), domain.source);
        }

        debug!(
            hostname = %self.result.client_hostname,
            domain = ?self.result.domain(),
            servers = ?request.servers,
            "starting discovery search"
        );

        let ladder: [&dyn Stage; 4] = [&ExplicitServers, &DomainSrv, &DomainGuess, &AddressFallback];
        let mut ctx = SearchContext {
            request,
            resolver: self.resolver,
            prober: self.prober,
            settings: self.settings,
            result: &mut self.result,
            probes: &mut self.probes,
            accepted: None,
        };

        let mut outcome = SearchOutcome::DomainNotFound;
        for stage in ladder {
            match stage.run(&mut ctx).await {
                StageResult::Done(verdict) => {
                    debug!(stage = stage.name(), %verdict, "stage reached a verdict");
                    outcome = verdict;
                    break;
                }
                StageResult::Continue => trace!(stage = stage.name(), "stage passed"),
            }
        }

        if let Some(winner) = ctx.accepted.take() {
            self.finish(&winner).await;
        }

        info!(
            %outcome,
            code = outcome.code(),
            domain = ?self.result.domain(),
            server = ?self.result.primary_server(),
            "discovery search finished"
        );
        outcome
    }

    /// Fill realm, base DN and KDC list from the accepted server.
    async fn finish(&mut self, winner: &ProbeOutcome) {
        let result = &mut self.result;

        if let Some(root) = &winner.root {
            debug!(
                host = %winner.host,
                vendor = root.vendor_name.as_deref().unwrap_or("unknown"),
                version = root.vendor_version.as_deref().unwrap_or("unknown"),
                naming_contexts = ?root.naming_contexts,
                "accepted server root entry"
            );
            if let Some(realm) = &root.realm {
                // A realm read from the directory replaces a derived guess.
                if result
                    .realm
                    .as_ref()
                    .is_none_or(|r| r.source == Provenance::DerivedFromDomain)
                {
                    result.realm = Some(Sourced::new(
                        realm.to_ascii_uppercase(),
                        Provenance::DirectoryRootEntry,
                    ));
                }
                if result.domain.is_none() {
                    record(
                        &mut result.domain,
                        realm.to_ascii_lowercase(),
                        Provenance::DirectoryRootEntry,
                    );
                }
            }
            if result
                .basedn
                .as_ref()
                .is_none_or(|b| b.source == Provenance::DerivedFromDomain)
            {
                result.basedn = Some(Sourced::new(
                    root.basedn.clone(),
                    Provenance::DirectoryRootEntry,
                ));
            }
        }

        if let Some(domain) = result.domain().map(str::to_string) {
            record(
                &mut result.realm,
                domain.to_ascii_uppercase(),
                Provenance::DerivedFromDomain,
            );
            record(
                &mut result.basedn,
                basedn_from_domain(&domain),
                Provenance::DerivedFromDomain,
            );
        }

        let Some(realm) = result.realm().map(str::to_ascii_lowercase) else {
            return;
        };
        let (service, protocol) = &self.settings.kerberos_srv;
        match self.resolver.lookup_srv(service, protocol, &realm).await {
            Ok(targets) => {
                self.result.kdc = candidate_hosts(targets);
                debug!(kdc = ?self.result.kdc, "KDC SRV lookup");
            }
            Err(e) => {
                warn!(%e, "KDC lookup failed");
                self.result.kdc.clear();
                self.result.warn(e.to_string());
            }
        }
    }

    /// Re-probe `domain` through DNS alone. Does not touch the result.
    pub async fn verify_dns(&self, domain: &str, ca_cert: Option<&Path>) -> bool {
        let (service, protocol) = &self.settings.ldap_srv;
        let hosts = match self.resolver.lookup_srv(service, protocol, domain).await {
            Ok(targets) => candidate_hosts(targets),
            Err(e) => {
                warn!(%e, %domain, "DNS sanity check lookup failed");
                return false;
            }
        };
        for host in &hosts {
            let outcome = self.prober.probe(host, ca_cert).await;
            if outcome.status.is_usable() {
                debug!(%host, %domain, "DNS sanity check passed");
                return true;
            }
        }
        debug!(%domain, candidates = hosts.len(), "DNS sanity check found no usable server");
        false
    }
}
