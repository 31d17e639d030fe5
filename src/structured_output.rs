//! Structured output module for JSON and YAML serialization.
//!
//! [`DiscoveryReport`] is the single result of a successful discovery: the
//! values a client needs to join the realm, where each of them came from,
//! and the non-fatal conditions met on the way.

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::discovery::Provenance;

/// Root structure for all realmscout output in structured formats
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DiscoveryReport {
    /// Tool version and metadata
    pub metadata: OutputMetadata,

    /// Directory servers, primary first
    pub servers: Vec<String>,

    /// DNS domain of the realm
    pub domain: String,

    /// Kerberos realm
    pub realm: String,

    /// KDCs advertised through DNS (may be empty)
    pub kdc: Vec<String>,

    /// Directory base DN
    pub basedn: String,

    /// Client hostname used for discovery
    pub hostname: String,

    /// DNS domain of the client itself
    pub client_domain: String,

    /// DNS alone is enough to rediscover this realm
    pub dnsok: bool,

    /// Certificate subject base, `O=<REALM>`
    pub subject_base: String,

    /// Time servers advertised through DNS
    pub ntp_servers: Vec<String>,

    /// Provenance of each discovered field
    pub sources: FieldSources,

    /// Non-fatal conditions encountered during discovery
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Tool metadata and versioning information
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct OutputMetadata {
    /// Tool name
    pub tool_name: String,

    /// Tool version
    pub version: String,

    /// Timestamp when discovery finished
    pub generated_at: chrono::DateTime<chrono::Utc>,

    /// JSON schema version for this output format
    pub schema_version: String,
}

/// Where each reported value came from.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct FieldSources {
    pub hostname: HostnameSource,
    pub domain: Provenance,
    pub realm: Provenance,
    pub servers: Provenance,
    pub basedn: Provenance,
}

/// How the client hostname was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum HostnameSource {
    /// Supplied by the caller
    ExplicitOption,
    /// The machine's fully qualified name
    MachineFqdn,
}

impl OutputMetadata {
    pub fn new() -> Self {
        Self {
            tool_name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: chrono::Utc::now(),
            schema_version: "1.0.0".to_string(),
        }
    }
}

impl Default for OutputMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryReport {
    /// Generate JSON schema for this output format
    pub fn generate_json_schema() -> Result<String> {
        let schema = schemars::schema_for!(DiscoveryReport);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn primary_server(&self) -> Option<&str> {
        self.servers.first().map(String::as_str)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_report() -> DiscoveryReport {
        DiscoveryReport {
            metadata: OutputMetadata::new(),
            servers: vec!["server1.example.com".into()],
            domain: "example.com".into(),
            realm: "EXAMPLE.COM".into(),
            kdc: vec!["server1.example.com".into()],
            basedn: "dc=example,dc=com".into(),
            hostname: "client1.example.com".into(),
            client_domain: "example.com".into(),
            dnsok: true,
            subject_base: "O=EXAMPLE.COM".into(),
            ntp_servers: vec![],
            sources: FieldSources {
                hostname: HostnameSource::ExplicitOption,
                domain: Provenance::DnsSrvRecord,
                realm: Provenance::DerivedFromDomain,
                servers: Provenance::DnsSrvRecord,
                basedn: Provenance::DirectoryRootEntry,
            },
            warnings: vec![],
        }
    }

    #[test]
    fn json_uses_snake_case_fields_and_kebab_case_sources() {
        let json = sample_report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["subject_base"], "O=EXAMPLE.COM");
        assert_eq!(value["client_domain"], "example.com");
        assert_eq!(value["sources"]["domain"], "dns-srv-record");
        assert_eq!(value["sources"]["hostname"], "explicit-option");
        assert!(value.get("warnings").is_none());
    }

    #[test]
    fn yaml_round_trips() {
        let yaml = sample_report().to_yaml().unwrap();
        let back: DiscoveryReport = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.realm, "EXAMPLE.COM");
        assert_eq!(back.sources.basedn, Provenance::DirectoryRootEntry);
    }

    #[test]
    fn schema_names_report_fields() {
        let schema = DiscoveryReport::generate_json_schema().unwrap();
        for field in ["servers", "basedn", "dnsok", "ntp_servers", "sources"] {
            assert!(schema.contains(field), "schema lacks {field}");
        }
    }
}
