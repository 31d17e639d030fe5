//! DNS resolver adapter.
//!
//! Wraps SRV, A/AAAA and PTR queries behind the [`DnsResolver`] trait so the
//! discovery engine can run against the system resolver or an in-memory
//! double. "Not found" is never an error: it is an empty answer. Only
//! transport-level failures (timeouts, unreachable nameservers, a missing
//! resolver configuration) surface as [`DnsError`].

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, trace};
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};

use crate::config::NetworkConfig;
use crate::netutil::normalize_domain;
use crate::retry::{DnsRetryPolicy, RetryConfig, RetryExecutor};

/// Transport-level resolver failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    #[error("DNS query timed out after {seconds}s: {query}")]
    Timeout { query: String, seconds: u64 },

    #[error("DNS lookup failed for {query}: {reason}")]
    Transport { query: String, reason: String },

    #[error("No usable DNS resolver configuration: {reason}")]
    NoNameservers { reason: String },
}

/// One SRV answer, hostname normalized (lower-case, no trailing dot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub hostname: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

impl SrvTarget {
    pub fn new(hostname: &str, port: u16, priority: u16, weight: u16) -> Self {
        Self {
            hostname: normalize_domain(hostname),
            port,
            priority,
            weight,
        }
    }
}

/// Order SRV answers by ascending priority, then descending weight.
///
/// The sort is stable, so records that tie on both keep their answer order.
pub fn order_srv_targets(targets: &mut [SrvTarget]) {
    targets.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.weight.cmp(&a.weight))
    });
}

/// Ordered, de-duplicated candidate hostnames for probing.
///
/// The root target `.` ("service decidedly not available") is dropped.
pub fn candidate_hosts(mut targets: Vec<SrvTarget>) -> Vec<String> {
    order_srv_targets(&mut targets);
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .map(|t| t.hostname)
        .filter(|h| !h.is_empty())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}

/// The queries the discovery engine needs from DNS.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// SRV lookup of `<service>.<protocol>.<domain>`, e.g. `_ldap`, `_tcp`.
    async fn lookup_srv(
        &self,
        service: &str,
        protocol: &str,
        domain: &str,
    ) -> Result<Vec<SrvTarget>, DnsError>;

    /// A and AAAA lookup; empty when the name does not exist.
    async fn lookup_addresses(&self, hostname: &str) -> Result<BTreeSet<IpAddr>, DnsError>;

    /// PTR lookup; first name, normalized.
    async fn reverse_lookup(&self, ip: IpAddr) -> Result<Option<String>, DnsError>;
}

/// Resolver backed by the system DNS configuration.
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
    query_timeout: Duration,
    retry: RetryExecutor,
}

impl SystemResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf(network: &NetworkConfig) -> Result<Self, DnsError> {
        let (config, mut opts) = trust_dns_resolver::system_conf::read_system_conf()
            .map_err(|e| DnsError::NoNameservers {
                reason: e.to_string(),
            })?;
        if config.name_servers().is_empty() {
            return Err(DnsError::NoNameservers {
                reason: "no nameservers configured".into(),
            });
        }
        opts.timeout = network.dns_timeout;
        opts.attempts = 1;

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            query_timeout: network.dns_timeout,
            retry: RetryExecutor::new(RetryConfig::for_network(network)),
        })
    }

    fn seconds(&self) -> u64 {
        self.query_timeout.as_secs().max(1)
    }
}

/// Map a timed resolver result onto "answer", "not found" or transport error.
fn classify<T>(
    query: &str,
    seconds: u64,
    res: Result<Result<T, ResolveError>, tokio::time::error::Elapsed>,
) -> Result<Option<T>, DnsError> {
    match res {
        Ok(Ok(answer)) => Ok(Some(answer)),
        Ok(Err(e)) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
            ResolveErrorKind::Timeout => Err(DnsError::Timeout {
                query: query.to_string(),
                seconds,
            }),
            _ => Err(DnsError::Transport {
                query: query.to_string(),
                reason: e.to_string(),
            }),
        },
        Err(_) => Err(DnsError::Timeout {
            query: query.to_string(),
            seconds,
        }),
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn lookup_srv(
        &self,
        service: &str,
        protocol: &str,
        domain: &str,
    ) -> Result<Vec<SrvTarget>, DnsError> {
        // Absolute name so the resolver search list is never appended.
        let query = format!("{service}.{protocol}.{}.", normalize_domain(domain));
        debug!(%query, "SRV lookup");

        let resolver = &self.resolver;
        let to = self.query_timeout;
        let seconds = self.seconds();
        let answer = self
            .retry
            .execute(
                || {
                    let query = query.clone();
                    async move {
                        let res = timeout(to, resolver.srv_lookup(query.as_str())).await;
                        classify(&query, seconds, res)
                    }
                },
                DnsRetryPolicy,
            )
            .await?;

        let targets: Vec<SrvTarget> = answer
            .map(|lookup| {
                lookup
                    .iter()
                    .map(|srv| {
                        SrvTarget::new(
                            &srv.target().to_utf8(),
                            srv.port(),
                            srv.priority(),
                            srv.weight(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        trace!(%query, count = targets.len(), "SRV answers");
        Ok(targets)
    }

    async fn lookup_addresses(&self, hostname: &str) -> Result<BTreeSet<IpAddr>, DnsError> {
        let query = format!("{}.", normalize_domain(hostname));
        debug!(%query, "A/AAAA lookup");

        let resolver = &self.resolver;
        let to = self.query_timeout;
        let seconds = self.seconds();
        let answer = self
            .retry
            .execute(
                || {
                    let query = query.clone();
                    async move {
                        let res = timeout(to, resolver.lookup_ip(query.as_str())).await;
                        classify(&query, seconds, res)
                    }
                },
                DnsRetryPolicy,
            )
            .await?;

        Ok(answer
            .map(|lookup| lookup.iter().collect())
            .unwrap_or_default())
    }

    async fn reverse_lookup(&self, ip: IpAddr) -> Result<Option<String>, DnsError> {
        let query = ip.to_string();
        debug!(%query, "PTR lookup");

        let resolver = &self.resolver;
        let to = self.query_timeout;
        let seconds = self.seconds();
        let answer = self
            .retry
            .execute(
                || {
                    let query = query.clone();
                    async move {
                        let res = timeout(to, resolver.reverse_lookup(ip)).await;
                        classify(&query, seconds, res)
                    }
                },
                DnsRetryPolicy,
            )
            .await?;

        Ok(answer
            .and_then(|lookup| lookup.iter().next().map(|n| n.to_utf8()))
            .map(|name| normalize_domain(&name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srv_ordering_priority_then_weight() {
        let mut targets = vec![
            SrvTarget::new("h1.example.com", 389, 10, 5),
            SrvTarget::new("h2.example.com", 389, 5, 1),
            SrvTarget::new("h3.example.com", 389, 5, 9),
        ];
        order_srv_targets(&mut targets);
        let order: Vec<&str> = targets.iter().map(|t| t.hostname.as_str()).collect();
        assert_eq!(order, vec!["h3.example.com", "h2.example.com", "h1.example.com"]);
    }

    #[test]
    fn srv_ordering_is_stable_on_ties() {
        let mut targets = vec![
            SrvTarget::new("b.example.com", 389, 0, 100),
            SrvTarget::new("a.example.com", 389, 0, 100),
            SrvTarget::new("c.example.com", 389, 0, 100),
        ];
        order_srv_targets(&mut targets);
        let order: Vec<&str> = targets.iter().map(|t| t.hostname.as_str()).collect();
        assert_eq!(order, vec!["b.example.com", "a.example.com", "c.example.com"]);
    }

    #[test]
    fn candidates_are_normalized_and_deduplicated() {
        let hosts = candidate_hosts(vec![
            SrvTarget::new("Server1.Example.com.", 389, 0, 100),
            SrvTarget::new("server2.example.com.", 389, 0, 50),
            SrvTarget::new("server1.example.com", 636, 1, 100),
            SrvTarget::new(".", 0, 0, 0),
        ]);
        assert_eq!(hosts, vec!["server1.example.com", "server2.example.com"]);
    }
}
