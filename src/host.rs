//! Host entry lifecycle.
//!
//! Brings a host object in the realm to a desired state (present with given
//! attributes, or absent) by reading it, computing a diff and applying only
//! what differs. The remote API is reached through [`HostDirectory`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::structured_output::DiscoveryReport;

/// Multi-valued attributes keyed by their API name.
pub type HostAttributes = BTreeMap<String, Vec<String>>;

/// Attributes the API accepts on creation only.
const CREATE_ONLY: [&str; 1] = ["ip_address"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("{fqdn}: host not found")]
    NotFound { fqdn: String },

    #[error("Host {operation} failed: {reason}")]
    Api { operation: String, reason: String },
}

/// A host object as the directory returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostEntry {
    pub fqdn: String,
    pub attributes: HostAttributes,
    /// One-time enrollment password, only right after it was generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_password: Option<String>,
}

/// Remote host CRUD.
#[async_trait]
pub trait HostDirectory: Send + Sync {
    async fn show(&self, fqdn: &str) -> Result<HostEntry, HostError>;
    async fn add(&self, fqdn: &str, attributes: &HostAttributes) -> Result<HostEntry, HostError>;
    async fn modify(&self, fqdn: &str, changes: &HostAttributes) -> Result<HostEntry, HostError>;
    async fn delete(&self, fqdn: &str) -> Result<(), HostError>;
}

/// The realm a host directory client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub realm: String,
    pub server: String,
    pub domain: String,
    pub basedn: String,
}

impl HostTarget {
    /// Target of a completed discovery; `None` without a server.
    pub fn from_report(report: &DiscoveryReport) -> Option<Self> {
        Some(Self {
            realm: report.realm.clone(),
            server: report.servers.first()?.clone(),
            domain: report.domain.clone(),
            basedn: report.basedn.clone(),
        })
    }

    /// Qualify a short host name with the target domain.
    pub fn qualify(&self, name: &str) -> String {
        let name = crate::netutil::normalize_domain(name);
        if name.contains('.') || self.domain.is_empty() {
            name
        } else {
            format!("{name}.{}", self.domain)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostState {
    #[default]
    Present,
    Absent,
}

/// Desired host attributes.
#[derive(Debug, Clone, Default)]
pub struct HostSpec {
    pub fqdn: String,
    pub certificates: Vec<String>,
    pub ssh_public_key: Option<String>,
    pub ip_address: Option<String>,
    /// Request a one-time enrollment password.
    pub random_password: bool,
}

impl HostSpec {
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            ..Default::default()
        }
    }

    pub fn attributes(&self) -> HostAttributes {
        let mut attrs = HostAttributes::new();
        if !self.certificates.is_empty() {
            attrs.insert("usercertificate".into(), self.certificates.clone());
        }
        if let Some(key) = &self.ssh_public_key {
            attrs.insert("ipasshpubkey".into(), vec![key.clone()]);
        }
        if let Some(ip) = &self.ip_address {
            attrs.insert("ip_address".into(), vec![ip.clone()]);
        }
        if self.random_password {
            attrs.insert("random".into(), vec!["TRUE".into()]);
        }
        attrs
    }
}

/// What `ensure_host` did (or, in check mode, would do).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostChange {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostEntry>,
}

/// Attributes of `desired` that differ from `current`.
///
/// Values compare as sets; creation-only attributes never appear.
pub fn host_diff(current: &HostAttributes, desired: &HostAttributes) -> HostAttributes {
    desired
        .iter()
        .filter(|(key, _)| !CREATE_ONLY.contains(&key.as_str()))
        .filter(|(key, wanted)| {
            let mut wanted = (*wanted).clone();
            wanted.sort();
            let mut have = current.get(*key).cloned().unwrap_or_default();
            have.sort();
            have != wanted
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Reconcile one host entry against `spec`.
pub async fn ensure_host(
    directory: &dyn HostDirectory,
    target: &HostTarget,
    spec: &HostSpec,
    state: HostState,
    check_mode: bool,
) -> Result<HostChange, HostError> {
    let fqdn = target.qualify(&spec.fqdn);
    debug!(%fqdn, server = %target.server, realm = %target.realm, ?state, "reconciling host");

    let current = match directory.show(&fqdn).await {
        Ok(entry) => Some(entry),
        Err(HostError::NotFound { .. }) => None,
        Err(e) => return Err(e),
    };

    match (state, current) {
        (HostState::Absent, None) => Ok(HostChange::default()),
        (HostState::Absent, Some(entry)) => {
            if !check_mode {
                directory.delete(&fqdn).await?;
                info!(%fqdn, "host removed");
            }
            Ok(HostChange {
                changed: true,
                host: Some(entry),
            })
        }
        (HostState::Present, None) => {
            if check_mode {
                return Ok(HostChange {
                    changed: true,
                    host: None,
                });
            }
            let added = directory.add(&fqdn, &spec.attributes()).await?;
            info!(%fqdn, "host added");
            Ok(HostChange {
                changed: true,
                host: Some(refresh(directory, &fqdn, added).await?),
            })
        }
        (HostState::Present, Some(entry)) => {
            let changes = host_diff(&entry.attributes, &spec.attributes());
            if changes.is_empty() {
                return Ok(HostChange {
                    changed: false,
                    host: Some(entry),
                });
            }
            if check_mode {
                return Ok(HostChange {
                    changed: true,
                    host: Some(entry),
                });
            }
            let modified = directory.modify(&fqdn, &changes).await?;
            info!(%fqdn, attributes = ?changes.keys().collect::<Vec<_>>(), "host modified");
            Ok(HostChange {
                changed: true,
                host: Some(refresh(directory, &fqdn, modified).await?),
            })
        }
    }
}

/// Re-read the entry, carrying over a freshly generated password.
async fn refresh(
    directory: &dyn HostDirectory,
    fqdn: &str,
    written: HostEntry,
) -> Result<HostEntry, HostError> {
    let mut entry = directory.show(fqdn).await?;
    entry.random_password = written.random_password;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryHostDirectory;

    fn target() -> HostTarget {
        HostTarget {
            realm: "EXAMPLE.COM".into(),
            server: "server1.example.com".into(),
            domain: "example.com".into(),
            basedn: "dc=example,dc=com".into(),
        }
    }

    fn attrs(pairs: &[(&str, &[&str])]) -> HostAttributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn diff_ignores_order_and_create_only_keys() {
        let current = attrs(&[("usercertificate", &["b", "a"])]);
        let desired = attrs(&[
            ("usercertificate", &["a", "b"]),
            ("ip_address", &["192.0.2.1"]),
        ]);
        assert!(host_diff(&current, &desired).is_empty());

        let desired = attrs(&[("ipasshpubkey", &["ssh-ed25519 AAAA"])]);
        assert_eq!(host_diff(&current, &desired), desired);
    }

    #[test]
    fn short_names_are_qualified() {
        assert_eq!(target().qualify("client1"), "client1.example.com");
        assert_eq!(target().qualify("Client1.Other.COM"), "client1.other.com");
    }

    #[tokio::test]
    async fn adds_missing_host() {
        let directory = MemoryHostDirectory::new();
        let mut spec = HostSpec::new("client1.example.com");
        spec.ip_address = Some("192.0.2.7".into());
        spec.random_password = true;

        let change = ensure_host(&directory, &target(), &spec, HostState::Present, false)
            .await
            .unwrap();
        assert!(change.changed);
        let host = change.host.unwrap();
        assert!(host.random_password.is_some());
        assert_eq!(host.attributes["ip_address"], vec!["192.0.2.7"]);
        assert_eq!(directory.operations(), vec!["add client1.example.com"]);
    }

    #[tokio::test]
    async fn unchanged_host_is_left_alone() {
        let directory = MemoryHostDirectory::new().with_host(
            "client1.example.com",
            attrs(&[("ipasshpubkey", &["ssh-ed25519 AAAA"])]),
        );
        let mut spec = HostSpec::new("client1");
        spec.ssh_public_key = Some("ssh-ed25519 AAAA".into());

        let change = ensure_host(&directory, &target(), &spec, HostState::Present, false)
            .await
            .unwrap();
        assert!(!change.changed);
        assert!(directory.operations().is_empty());
    }

    #[tokio::test]
    async fn modifies_only_the_difference() {
        let directory = MemoryHostDirectory::new().with_host(
            "client1.example.com",
            attrs(&[("ipasshpubkey", &["old"]), ("usercertificate", &["cert"])]),
        );
        let mut spec = HostSpec::new("client1.example.com");
        spec.ssh_public_key = Some("new".into());
        spec.certificates = vec!["cert".into()];

        let change = ensure_host(&directory, &target(), &spec, HostState::Present, false)
            .await
            .unwrap();
        assert!(change.changed);
        assert_eq!(change.host.unwrap().attributes["ipasshpubkey"], vec!["new"]);
        assert_eq!(directory.operations(), vec!["modify client1.example.com"]);
    }

    #[tokio::test]
    async fn check_mode_reports_without_writing() {
        let directory = MemoryHostDirectory::new()
            .with_host("client1.example.com", HostAttributes::new());

        let change = ensure_host(
            &directory,
            &target(),
            &HostSpec::new("client1.example.com"),
            HostState::Absent,
            true,
        )
        .await
        .unwrap();
        assert!(change.changed);
        assert!(directory.operations().is_empty());
        assert!(directory.get("client1.example.com").is_some());
    }

    #[tokio::test]
    async fn removes_present_host_and_ignores_missing_one() {
        let directory = MemoryHostDirectory::new()
            .with_host("client1.example.com", HostAttributes::new());
        let spec = HostSpec::new("client1.example.com");

        let first = ensure_host(&directory, &target(), &spec, HostState::Absent, false)
            .await
            .unwrap();
        assert!(first.changed);
        let second = ensure_host(&directory, &target(), &spec, HostState::Absent, false)
            .await
            .unwrap();
        assert!(!second.changed);
        assert_eq!(directory.operations(), vec!["delete client1.example.com"]);
    }
}
