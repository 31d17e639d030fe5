//! The discovery ladder.
//!
//! Each stage either reaches a verdict for the whole search or hands over to
//! the next one. Stages share a [`SearchContext`] holding the request, the
//! collaborators and the result being accumulated.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{DiscoveryResult, Provenance, SearchOutcome, SearchRequest, record};
use crate::config::DiscoveryConfig;
use crate::dns::{DnsError, DnsResolver, candidate_hosts};
use crate::netutil::{domain_walk, parent_domain, parse_ip_literal};
use crate::probe::{DirectoryProbe, ProbeOutcome, ProbeStatus};

pub(super) enum StageResult {
    Done(SearchOutcome),
    Continue,
}

/// Shared mutable state of one `search`.
pub(super) struct SearchContext<'a> {
    pub request: &'a SearchRequest,
    pub resolver: &'a dyn DnsResolver,
    pub prober: &'a dyn DirectoryProbe,
    pub settings: &'a DiscoveryConfig,
    pub result: &'a mut DiscoveryResult,
    pub probes: &'a mut Vec<ProbeOutcome>,
    pub accepted: Option<ProbeOutcome>,
}

impl SearchContext<'_> {
    pub fn domain(&self) -> Option<String> {
        self.result.domain().map(str::to_string)
    }

    pub fn dns_warning(&mut self, err: &DnsError) {
        warn!(%err, "DNS lookup failed, treating as empty answer");
        self.result.warn(err.to_string());
    }

    /// Sorted `_ldap._tcp` candidates of `domain`; transport errors count as
    /// an empty answer.
    pub async fn ldap_candidates(&mut self, domain: &str) -> Vec<String> {
        let (service, protocol) = &self.settings.ldap_srv;
        match self.resolver.lookup_srv(service, protocol, domain).await {
            Ok(targets) => candidate_hosts(targets),
            Err(e) => {
                self.dns_warning(&e);
                Vec::new()
            }
        }
    }

    /// Probe `hosts` in order and return the first usable one.
    pub async fn probe_in_order(&mut self, hosts: &[String]) -> Option<ProbeOutcome> {
        let ca_cert = self.request.ca_cert.as_deref();
        for host in hosts {
            let outcome = self.prober.probe(host, ca_cert).await;
            debug!(host = %outcome.host, status = %outcome.status, "probed candidate");
            if outcome.ip_literal {
                warn!(%host, "server given as an IP address");
                self.result.warn(ip_literal_warning(host));
            }
            let usable = outcome.status.is_usable();
            self.probes.push(outcome.clone());
            if usable {
                return Some(outcome);
            }
        }
        None
    }

    /// Outcome when none of the probes recorded after `since` was usable.
    pub fn failure_since(&self, since: usize) -> SearchOutcome {
        let incompatible = self.probes[since..]
            .iter()
            .any(|p| p.status == ProbeStatus::NotCompatibleServer);
        if incompatible {
            SearchOutcome::NotIpaServer
        } else {
            SearchOutcome::NoLdapServer
        }
    }

    pub fn accept(&mut self, winner: ProbeOutcome, source: Provenance) -> SearchOutcome {
        let outcome = SearchOutcome::from_probe(winner.status);
        record(&mut self.result.servers, vec![winner.host.clone()], source);
        self.accepted = Some(winner);
        outcome
    }

    async fn probe_stage(&mut self, hosts: &[String], source: Provenance) -> StageResult {
        let since = self.probes.len();
        match self.probe_in_order(hosts).await {
            Some(winner) => StageResult::Done(self.accept(winner, source)),
            None => StageResult::Done(self.failure_since(since)),
        }
    }
}

pub(super) fn ip_literal_warning(host: &str) -> String {
    format!(
        "It seems that you are using an IP address ({host}) instead of FQDN as a server. \
         The installation may break in some cases."
    )
}

#[async_trait]
pub(super) trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &mut SearchContext<'_>) -> StageResult;
}

/// Servers supplied by the caller; never falls through to DNS.
pub(super) struct ExplicitServers;

impl ExplicitServers {
    async fn derive_domain(ctx: &mut SearchContext<'_>) {
        let request = ctx.request;
        let first = &request.servers[0];
        if let Some(ip) = parse_ip_literal(first) {
            match ctx.resolver.reverse_lookup(ip).await {
                Ok(Some(name)) => {
                    if let Some(domain) = parent_domain(&name) {
                        debug!(%ip, %name, %domain, "domain from reverse lookup");
                        record(&mut ctx.result.domain, domain, Provenance::DnsReverseLookup);
                    }
                }
                Ok(None) => debug!(%ip, "no PTR record for server"),
                Err(e) => ctx.dns_warning(&e),
            }
        } else if let Some(domain) = parent_domain(first) {
            record(&mut ctx.result.domain, domain, Provenance::DerivedFromServer);
        }
    }
}

#[async_trait]
impl Stage for ExplicitServers {
    fn name(&self) -> &'static str {
        "explicit-servers"
    }

    async fn run(&self, ctx: &mut SearchContext<'_>) -> StageResult {
        if ctx.request.servers.is_empty() {
            return StageResult::Continue;
        }
        if ctx.result.domain.is_none() {
            Self::derive_domain(ctx).await;
        }
        let servers = ctx.request.servers.clone();
        ctx.probe_stage(&servers, Provenance::ExplicitOption).await
    }
}

/// `_ldap._tcp` SRV records of an already known domain.
pub(super) struct DomainSrv;

#[async_trait]
impl Stage for DomainSrv {
    fn name(&self) -> &'static str {
        "domain-srv"
    }

    async fn run(&self, ctx: &mut SearchContext<'_>) -> StageResult {
        if !ctx.request.servers.is_empty() {
            return StageResult::Continue;
        }
        let Some(domain) = ctx.domain() else {
            return StageResult::Continue;
        };
        let hosts = ctx.ldap_candidates(&domain).await;
        if hosts.is_empty() {
            debug!(%domain, "no LDAP SRV records");
            return StageResult::Continue;
        }
        ctx.probe_stage(&hosts, Provenance::DnsSrvRecord).await
    }
}

/// SRV records of the client's parent domains, longest first.
pub(super) struct DomainGuess;

#[async_trait]
impl Stage for DomainGuess {
    fn name(&self) -> &'static str {
        "domain-guess"
    }

    async fn run(&self, ctx: &mut SearchContext<'_>) -> StageResult {
        if ctx.result.domain.is_some() {
            return StageResult::Continue;
        }
        let Some(parent) = parent_domain(&ctx.result.client_hostname) else {
            return StageResult::Continue;
        };
        for candidate in domain_walk(&parent) {
            let hosts = ctx.ldap_candidates(&candidate).await;
            if hosts.is_empty() {
                debug!(domain = %candidate, "no LDAP SRV records, trying parent");
                continue;
            }
            debug!(domain = %candidate, "domain established by SRV records");
            record(&mut ctx.result.domain, candidate, Provenance::DnsSrvRecord);
            return ctx.probe_stage(&hosts, Provenance::DnsSrvRecord).await;
        }
        StageResult::Continue
    }
}

/// `<label>.<domain>` address lookup; always reaches a verdict.
pub(super) struct AddressFallback;

#[async_trait]
impl Stage for AddressFallback {
    fn name(&self) -> &'static str {
        "address-fallback"
    }

    async fn run(&self, ctx: &mut SearchContext<'_>) -> StageResult {
        let (domain, guessed) = match ctx.domain() {
            Some(domain) => (domain, false),
            None => match parent_domain(&ctx.result.client_hostname) {
                Some(parent) => (parent, true),
                None => return StageResult::Done(SearchOutcome::DomainNotFound),
            },
        };
        let miss = if guessed {
            SearchOutcome::DomainNotFound
        } else {
            SearchOutcome::NoLdapServer
        };

        let host = format!("{}.{}", ctx.settings.fallback_label, domain);
        let addresses = match ctx.resolver.lookup_addresses(&host).await {
            Ok(addresses) => addresses,
            Err(e) => {
                ctx.dns_warning(&e);
                Default::default()
            }
        };
        if addresses.is_empty() {
            debug!(%host, "fallback name does not resolve");
            return StageResult::Done(miss);
        }

        let since = ctx.probes.len();
        match ctx.probe_in_order(std::slice::from_ref(&host)).await {
            Some(winner) => {
                if guessed {
                    record(&mut ctx.result.domain, domain, Provenance::DnsHostDomain);
                }
                StageResult::Done(ctx.accept(winner, Provenance::DnsAddressRecord))
            }
            None if guessed => StageResult::Done(miss),
            None => StageResult::Done(ctx.failure_since(since)),
        }
    }
}
