//! Configuration management for realmscout.
//!
//! Structured settings with defaults, environment overrides
//! (`REALMSCOUT_*`) and CLI precedence. Centralizes network timeouts, the
//! service names used during discovery and the well-known file locations of
//! an enrolled client.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Timeouts and retry policy for DNS and LDAP
    pub network: NetworkConfig,

    /// Service names and markers used by the discovery ladder
    pub discovery: DiscoveryConfig,

    /// Well-known files of an enrolled client
    pub paths: PathsConfig,
}

/// Network-related configuration options
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Timeout for a single DNS query
    pub dns_timeout: Duration,

    /// Timeout for establishing an LDAP connection
    pub ldap_connect_timeout: Duration,

    /// Timeout for each LDAP operation (bind, search)
    pub ldap_op_timeout: Duration,

    /// Retry attempts for DNS transport failures
    pub retry_attempts: u32,

    /// Initial delay between retry attempts
    pub retry_delay: Duration,
}

/// Discovery ladder settings
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Directory protocol port
    pub ldap_port: u16,

    /// SRV service/protocol pair for directory servers
    pub ldap_srv: (String, String),

    /// SRV service/protocol pair for KDCs
    pub kerberos_srv: (String, String),

    /// SRV service/protocol pair for time servers
    pub ntp_srv: (String, String),

    /// Leftmost label of the last-resort server name (`<label>.<domain>`)
    pub fallback_label: String,

    /// Value of the `info` attribute marking a compatible base entry
    pub compat_marker: String,
}

/// Files describing an existing enrollment
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// INI file recording the enrolled domain / realm / server
    pub default_conf: PathBuf,

    /// State file written when the client was enrolled
    pub sysrestore_state: PathBuf,

    /// CA certificate used when none is given explicitly
    pub ca_cert: PathBuf,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            dns_timeout: Duration::from_secs(5),
            ldap_connect_timeout: Duration::from_secs(5),
            ldap_op_timeout: Duration::from_secs(10),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ldap_port: 389,
            ldap_srv: ("_ldap".to_string(), "_tcp".to_string()),
            kerberos_srv: ("_kerberos".to_string(), "_udp".to_string()),
            ntp_srv: ("_ntp".to_string(), "_udp".to_string()),
            fallback_label: "ldap".to_string(),
            compat_marker: "IPA V2.0".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            default_conf: PathBuf::from("/etc/ipa/default.conf"),
            sysrestore_state: PathBuf::from("/var/lib/ipa-client/sysrestore/sysrestore.state"),
            ca_cert: PathBuf::from("/etc/ipa/ca.crt"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(timeout) = std::env::var("REALMSCOUT_DNS_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse::<u64>()
        {
            config.network.dns_timeout = Duration::from_secs(secs);
        }

        if let Ok(timeout) = std::env::var("REALMSCOUT_LDAP_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse::<u64>()
        {
            config.network.ldap_connect_timeout = Duration::from_secs(secs);
            config.network.ldap_op_timeout = Duration::from_secs(secs.saturating_mul(2));
        }

        if let Ok(attempts) = std::env::var("REALMSCOUT_RETRY_ATTEMPTS")
            && let Ok(n) = attempts.parse::<u32>()
        {
            config.network.retry_attempts = n;
        }

        if let Ok(label) = std::env::var("REALMSCOUT_FALLBACK_LABEL") {
            config.discovery.fallback_label = label.trim().to_ascii_lowercase();
        }

        if let Ok(path) = std::env::var("REALMSCOUT_DEFAULT_CONF") {
            config.paths.default_conf = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("REALMSCOUT_CA_CERT") {
            config.paths.ca_cert = PathBuf::from(path);
        }

        config
    }

    /// Merge with CLI arguments, giving CLI precedence
    pub fn merge_with_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(secs) = cli.dns_timeout {
            self.network.dns_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = cli.ldap_timeout {
            self.network.ldap_connect_timeout = Duration::from_secs(secs);
            self.network.ldap_op_timeout = Duration::from_secs(secs.saturating_mul(2));
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.dns_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "network.dns_timeout".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if self.network.ldap_connect_timeout.is_zero() || self.network.ldap_op_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "network.ldap_timeout".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if !crate::netutil::is_valid_hostname(&self.discovery.fallback_label)
            || self.discovery.fallback_label.contains('.')
        {
            return Err(ConfigError::InvalidValue {
                field: "discovery.fallback_label".to_string(),
                value: self.discovery.fallback_label.clone(),
                reason: "Must be a single DNS label".to_string(),
            });
        }

        if self.discovery.ldap_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "discovery.ldap_port".to_string(),
                value: "0".to_string(),
                reason: "Port must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// CA certificate to use: the explicit one, else the default file when it
    /// exists, else none.
    pub fn ca_cert_path(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        self.paths
            .ca_cert
            .is_file()
            .then(|| self.paths.ca_cert.clone())
    }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => {
                write!(f, "Invalid value '{}' for '{}': {}", value, field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::errors::DiscoveryError {
    fn from(e: ConfigError) -> Self {
        crate::errors::DiscoveryError::configuration(e.to_string())
    }
}
