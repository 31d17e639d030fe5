//! In-memory doubles for the resolver, probe and host directory seams.
//!
//! Used by the unit tests, the scenario tests under `tests/` and the
//! benchmarks. Every double records the calls it receives so tests can
//! assert that a path did (or did not) touch the network layer.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::dns::{DnsError, DnsResolver, SrvTarget};
use crate::host::{HostAttributes, HostDirectory, HostEntry, HostError};
use crate::netutil::{is_valid_hostname, normalize_domain, parse_ip_literal};
use crate::probe::{DirectoryProbe, ProbeOutcome, ProbeStatus, RootEntry};

/// Resolver answering from fixed tables.
///
/// Clones share the query log, so a test can keep one handle and give
/// another to the code under test.
#[derive(Default, Clone)]
pub struct StaticResolver {
    srv: HashMap<String, Vec<SrvTarget>>,
    addresses: HashMap<String, BTreeSet<IpAddr>>,
    ptr: HashMap<IpAddr, String>,
    failing: HashSet<String>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name` is the full query name, e.g. `_ldap._tcp.example.com`;
    /// targets are `(hostname, priority, weight)` on port 389.
    pub fn with_srv(mut self, name: &str, targets: &[(&str, u16, u16)]) -> Self {
        let entry = self.srv.entry(normalize_domain(name)).or_default();
        entry.extend(
            targets
                .iter()
                .map(|(host, priority, weight)| SrvTarget::new(host, 389, *priority, *weight)),
        );
        self
    }

    pub fn with_address(mut self, hostname: &str, ip: &str) -> Self {
        if let Ok(ip) = ip.parse() {
            self.addresses
                .entry(normalize_domain(hostname))
                .or_default()
                .insert(ip);
        }
        self
    }

    pub fn with_ptr(mut self, ip: &str, hostname: &str) -> Self {
        if let Some(ip) = parse_ip_literal(ip) {
            self.ptr.insert(ip, normalize_domain(hostname));
        }
        self
    }

    /// Make lookups of `name` fail with a transport error.
    pub fn failing_srv(mut self, name: &str) -> Self {
        self.failing.insert(normalize_domain(name));
        self
    }

    /// Every query received, prefixed with its record type.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    /// Names of the SRV queries received, in order.
    pub fn srv_queries(&self) -> Vec<String> {
        self.queries()
            .into_iter()
            .filter_map(|q| q.strip_prefix("SRV ").map(str::to_string))
            .collect()
    }

    fn log(&self, query: String) {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query);
        }
    }

    fn check(&self, name: &str) -> Result<(), DnsError> {
        if self.failing.contains(name) {
            return Err(DnsError::Transport {
                query: name.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn lookup_srv(
        &self,
        service: &str,
        protocol: &str,
        domain: &str,
    ) -> Result<Vec<SrvTarget>, DnsError> {
        let name = format!("{service}.{protocol}.{}", normalize_domain(domain));
        self.log(format!("SRV {name}"));
        self.check(&name)?;
        Ok(self.srv.get(&name).cloned().unwrap_or_default())
    }

    async fn lookup_addresses(&self, hostname: &str) -> Result<BTreeSet<IpAddr>, DnsError> {
        let name = normalize_domain(hostname);
        self.log(format!("A {name}"));
        self.check(&name)?;
        Ok(self.addresses.get(&name).cloned().unwrap_or_default())
    }

    async fn reverse_lookup(&self, ip: IpAddr) -> Result<Option<String>, DnsError> {
        self.log(format!("PTR {ip}"));
        self.check(&ip.to_string())?;
        Ok(self.ptr.get(&ip).cloned())
    }
}

/// Probe returning scripted outcomes; unknown hosts are unreachable.
#[derive(Default, Clone)]
pub struct ScriptedProbe {
    script: HashMap<String, (ProbeStatus, Option<RootEntry>)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, status: ProbeStatus, root: Option<RootEntry>) -> Self {
        self.script.insert(normalize_domain(host), (status, root));
        self
    }

    /// Hosts probed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DirectoryProbe for ScriptedProbe {
    async fn probe(&self, host: &str, _ca_cert: Option<&Path>) -> ProbeOutcome {
        if parse_ip_literal(host).is_none() && !is_valid_hostname(host) {
            return ProbeOutcome::new(host, ProbeStatus::BadHostnameFormat);
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(host.to_string());
        }
        match self.script.get(&normalize_domain(host)) {
            Some((status, Some(root))) => ProbeOutcome::new(host, *status).with_root(root.clone()),
            Some((status, None)) => ProbeOutcome::new(host, *status),
            None => ProbeOutcome::new(host, ProbeStatus::NoServerReachable),
        }
    }
}

/// Host directory kept in a map, recording each mutating call.
#[derive(Default)]
pub struct MemoryHostDirectory {
    hosts: Mutex<BTreeMap<String, HostEntry>>,
    operations: Mutex<Vec<String>>,
}

impl MemoryHostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(self, fqdn: &str, attributes: HostAttributes) -> Self {
        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.insert(
                fqdn.to_string(),
                HostEntry {
                    fqdn: fqdn.to_string(),
                    attributes,
                    random_password: None,
                },
            );
        }
        self
    }

    /// Mutating operations received, as `"<op> <fqdn>"`.
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn get(&self, fqdn: &str) -> Option<HostEntry> {
        self.hosts.lock().ok()?.get(fqdn).cloned()
    }

    fn log(&self, operation: &str, fqdn: &str) {
        if let Ok(mut ops) = self.operations.lock() {
            ops.push(format!("{operation} {fqdn}"));
        }
    }

    fn lock_error(operation: &str) -> HostError {
        HostError::Api {
            operation: operation.to_string(),
            reason: "host table lock poisoned".into(),
        }
    }
}

/// `random` is an action, not an attribute: it yields a one-time password.
fn apply_random(entry: &mut HostEntry, attributes: &HostAttributes) {
    if attributes.contains_key("random") {
        entry.random_password = Some(format!("otp-{}", entry.fqdn.len()));
    }
}

#[async_trait]
impl HostDirectory for MemoryHostDirectory {
    async fn show(&self, fqdn: &str) -> Result<HostEntry, HostError> {
        let hosts = self.hosts.lock().map_err(|_| Self::lock_error("show"))?;
        hosts.get(fqdn).cloned().ok_or_else(|| HostError::NotFound {
            fqdn: fqdn.to_string(),
        })
    }

    async fn add(&self, fqdn: &str, attributes: &HostAttributes) -> Result<HostEntry, HostError> {
        self.log("add", fqdn);
        let mut hosts = self.hosts.lock().map_err(|_| Self::lock_error("add"))?;
        if hosts.contains_key(fqdn) {
            return Err(HostError::Api {
                operation: "add".into(),
                reason: format!("host with name \"{fqdn}\" already exists"),
            });
        }
        let mut entry = HostEntry {
            fqdn: fqdn.to_string(),
            attributes: attributes
                .iter()
                .filter(|(k, _)| k.as_str() != "random")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            random_password: None,
        };
        apply_random(&mut entry, attributes);
        hosts.insert(fqdn.to_string(), entry.clone());
        Ok(entry)
    }

    async fn modify(&self, fqdn: &str, changes: &HostAttributes) -> Result<HostEntry, HostError> {
        self.log("modify", fqdn);
        let mut hosts = self.hosts.lock().map_err(|_| Self::lock_error("modify"))?;
        let entry = hosts.get_mut(fqdn).ok_or_else(|| HostError::NotFound {
            fqdn: fqdn.to_string(),
        })?;
        for (key, values) in changes {
            if key != "random" {
                entry.attributes.insert(key.clone(), values.clone());
            }
        }
        let mut updated = entry.clone();
        apply_random(&mut updated, changes);
        Ok(updated)
    }

    async fn delete(&self, fqdn: &str) -> Result<(), HostError> {
        self.log("delete", fqdn);
        let mut hosts = self.hosts.lock().map_err(|_| Self::lock_error("delete"))?;
        hosts
            .remove(fqdn)
            .map(|_| ())
            .ok_or_else(|| HostError::NotFound {
                fqdn: fqdn.to_string(),
            })
    }
}
