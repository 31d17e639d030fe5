//! Unified error handling for realmscout.
//!
//! Every fatal condition of a discovery run is a typed `DiscoveryError`
//! variant. Variants are grouped into coarse categories so the binary can map
//! them onto exit codes and the structured output can classify them:
//!   - Input: bad hostnames, conflicting or missing user-supplied values
//!   - Network: DNS transport problems
//!   - Discovery: the realm / servers could not be found or validated
//!   - Auth: Kerberos credential acquisition
//!   - Internal: I/O and unexpected states
//!
//! Non-fatal probe results (anonymous access refused, TLS required without a
//! CA) are not errors; they surface as warnings on the report.

use std::io;

use thiserror::Error;

use crate::dns::DnsError;

/// High-level classification for exit codes / structured reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Network,
    Discovery,
    Auth,
    Internal,
}

impl ErrorCategory {
    /// Process exit code used by the binary for this category.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCategory::Internal => 1,
            ErrorCategory::Input => 2,
            ErrorCategory::Network => 3,
            ErrorCategory::Discovery => 4,
            ErrorCategory::Auth => 5,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Network => "network",
            ErrorCategory::Discovery => "discovery",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Primary error type.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    // ------------------------ Input / Validation ----------------------------
    #[error("Invalid hostname '{hostname}': {reason}")]
    InvalidHostname { hostname: String, reason: String },

    #[error("Can't get the fully qualified name of this host: {reason}")]
    BadHostConfig { reason: String },

    #[error("{hostname} is not a fully-qualified hostname")]
    NotFqdn { hostname: String },

    #[error("The provided realm name [{provided}] does not match discovered one [{discovered}]")]
    RealmConflict {
        provided: String,
        discovered: String,
    },

    #[error("Client already enrolled with a conflicting {field} (configured '{configured}', discovered '{discovered}')")]
    AlreadyEnrolled {
        field: String,
        configured: String,
        discovered: String,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ---------------------------- Discovery ---------------------------------
    #[error("Unable to discover domain, not provided on command line")]
    DomainNotFound,

    #[error("{message}")]
    ServerNotFound { message: String },

    #[error("{server} is not an IPA v2 server")]
    IncompatibleServer { server: String },

    #[error("DNS domain '{domain}' is not configured for automatic KDC address lookup")]
    KdcNotConfigured { domain: String },

    // ----------------------------- Network ----------------------------------
    #[error(transparent)]
    Dns(#[from] DnsError),

    // ------------------------------ Auth ------------------------------------
    #[error("Failed to obtain a ticket for {principal}: {reason}")]
    CredentialAcquisition { principal: String, reason: String },

    // ----------------------------- I/O / FS ---------------------------------
    #[error("I/O error during {operation} on {path}: {source}")]
    Io {
        path: String,
        operation: String,
        #[source]
        source: io::Error,
    },

    // ---------------------------- Internal ----------------------------------
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DiscoveryError {
    /// Categorize the error for exit codes / structured output.
    pub fn category(&self) -> ErrorCategory {
        use DiscoveryError::*;
        match self {
            InvalidHostname { .. }
            | BadHostConfig { .. }
            | NotFqdn { .. }
            | RealmConflict { .. }
            | AlreadyEnrolled { .. }
            | Configuration { .. } => ErrorCategory::Input,

            DomainNotFound
            | ServerNotFound { .. }
            | IncompatibleServer { .. }
            | KdcNotConfigured { .. } => ErrorCategory::Discovery,

            Dns(_) => ErrorCategory::Network,

            CredentialAcquisition { .. } => ErrorCategory::Auth,

            Io { .. } | Internal { .. } => ErrorCategory::Internal,
        }
    }

    // ---------------------------- Constructors -----------------------------

    pub fn invalid_hostname(hostname: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHostname {
            hostname: hostname.into(),
            reason: reason.into(),
        }
    }

    pub fn server_not_found(message: impl Into<String>) -> Self {
        Self::ServerNotFound {
            message: message.into(),
        }
    }

    /// "Failed to verify" message naming every server that was tried.
    pub fn unverified_servers(servers: &[String]) -> Self {
        Self::server_not_found(format!(
            "Failed to verify that {} is an IPA server",
            servers.join(", ")
        ))
    }

    pub fn realm_conflict(provided: impl Into<String>, discovered: impl Into<String>) -> Self {
        Self::RealmConflict {
            provided: provided.into(),
            discovered: discovered.into(),
        }
    }

    pub fn already_enrolled(
        field: impl Into<String>,
        configured: impl Into<String>,
        discovered: impl Into<String>,
    ) -> Self {
        Self::AlreadyEnrolled {
            field: field.into(),
            configured: configured.into(),
            discovered: discovered.into(),
        }
    }

    pub fn credential(principal: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CredentialAcquisition {
            principal: principal.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<String>, operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Public result alias.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

impl From<io::Error> for DiscoveryError {
    fn from(e: io::Error) -> Self {
        DiscoveryError::Io {
            path: "<unknown>".into(),
            operation: "unspecified".into(),
            source: e,
        }
    }
}

/// Extension trait for enriching IO results with path + operation context.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<String>, operation: impl Into<String>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, io::Error> {
    fn with_path(self, path: impl Into<String>, operation: impl Into<String>) -> Result<T> {
        self.map_err(|e| DiscoveryError::io(path.into(), operation.into(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping() {
        assert_eq!(
            DiscoveryError::invalid_hostname("Host.Example.com", "upper-case").category(),
            ErrorCategory::Input
        );
        assert_eq!(
            DiscoveryError::Dns(DnsError::Timeout {
                query: "_ldap._tcp.example.com".into(),
                seconds: 5
            })
            .category(),
            ErrorCategory::Network
        );
        assert_eq!(
            DiscoveryError::DomainNotFound.category(),
            ErrorCategory::Discovery
        );
        assert_eq!(
            DiscoveryError::credential("admin", "bad password").category(),
            ErrorCategory::Auth
        );
    }

    #[test]
    fn unverified_servers_names_every_host() {
        let e = DiscoveryError::unverified_servers(&[
            "bogus.example.com".to_string(),
            "other.example.com".to_string(),
        ]);
        assert_eq!(
            e.to_string(),
            "Failed to verify that bogus.example.com, other.example.com is an IPA server"
        );
    }

    #[test]
    fn display_snippets() {
        let e = DiscoveryError::realm_conflict("OTHER.COM", "EXAMPLE.COM");
        let s = e.to_string();
        assert!(s.contains("OTHER.COM"));
        assert!(s.contains("EXAMPLE.COM"));
        let k = DiscoveryError::KdcNotConfigured {
            domain: "example.com".into(),
        };
        assert!(k.to_string().contains("automatic KDC address lookup"));
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            ErrorCategory::Input,
            ErrorCategory::Network,
            ErrorCategory::Discovery,
            ErrorCategory::Auth,
            ErrorCategory::Internal,
        ]
        .map(ErrorCategory::exit_code);
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn io_context() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let mapped = res.with_path("/etc/ipa/default.conf", "read");
        match mapped.err().unwrap() {
            DiscoveryError::Io {
                path, operation, ..
            } => {
                assert_eq!(path, "/etc/ipa/default.conf");
                assert_eq!(operation, "read");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
