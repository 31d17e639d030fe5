//! Existing-enrollment detection.
//!
//! A client counts as enrolled when both the default configuration file and
//! the sysrestore state file exist. Only the `[global]` section of the
//! configuration is read, and only to compare domain and realm.

use std::fs;

use tracing::debug;

use crate::config::PathsConfig;
use crate::errors::{DiscoveryError, IoResultExt, Result};

/// `[global]` keys recorded at enrollment time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentState {
    pub basedn: Option<String>,
    pub realm: Option<String>,
    pub domain: Option<String>,
    pub server: Option<String>,
    pub host: Option<String>,
    pub xmlrpc_uri: Option<String>,
}

impl EnrollmentState {
    /// Parse the `[global]` section of an INI document.
    ///
    /// Keys are case-insensitive, `#` and `;` start comment lines, both `=`
    /// and `:` separate key and value, and empty values count as absent.
    pub fn parse(content: &str) -> Self {
        let mut state = Self::default();
        let mut in_global = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_global = section.trim().eq_ignore_ascii_case("global");
                continue;
            }
            if !in_global {
                continue;
            }
            let Some((key, value)) = line.split_once(['=', ':']) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let value = Some(value.to_string());
            match key.trim().to_ascii_lowercase().as_str() {
                "basedn" => state.basedn = value,
                "realm" => state.realm = value,
                "domain" => state.domain = value,
                "server" => state.server = value,
                "host" => state.host = value,
                "xmlrpc_uri" => state.xmlrpc_uri = value,
                _ => {}
            }
        }
        state
    }

    /// The recorded enrollment, or `None` when this client is not enrolled.
    pub fn load(paths: &PathsConfig) -> Result<Option<Self>> {
        if !is_enrolled(paths) {
            debug!(conf = %paths.default_conf.display(), "no existing enrollment");
            return Ok(None);
        }
        let content = fs::read_to_string(&paths.default_conf)
            .with_path(paths.default_conf.display().to_string(), "read")?;
        Ok(Some(Self::parse(&content)))
    }

    /// Fail when the recorded domain or realm differs from the discovered one.
    pub fn check_conflict(&self, domain: &str, realm: &str) -> Result<()> {
        if self.domain.as_deref() != Some(domain) {
            return Err(DiscoveryError::already_enrolled(
                "domain",
                self.domain.clone().unwrap_or_default(),
                domain,
            ));
        }
        if self.realm.as_deref() != Some(realm) {
            return Err(DiscoveryError::already_enrolled(
                "realm",
                self.realm.clone().unwrap_or_default(),
                realm,
            ));
        }
        Ok(())
    }
}

pub fn is_enrolled(paths: &PathsConfig) -> bool {
    paths.default_conf.is_file() && paths.sysrestore_state.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const DEFAULT_CONF: &str = "\
#File modified by ipa-client-install

[global]
basedn = dc=example,dc=com
realm = EXAMPLE.COM
domain = example.com
server = server1.example.com
host = client1.example.com
xmlrpc_uri = https://server1.example.com/ipa/xml
enable_ra = True

[other]
domain = ignored.com
";

    #[test]
    fn parses_global_section_only() {
        let state = EnrollmentState::parse(DEFAULT_CONF);
        assert_eq!(state.domain.as_deref(), Some("example.com"));
        assert_eq!(state.realm.as_deref(), Some("EXAMPLE.COM"));
        assert_eq!(state.basedn.as_deref(), Some("dc=example,dc=com"));
        assert_eq!(
            state.xmlrpc_uri.as_deref(),
            Some("https://server1.example.com/ipa/xml")
        );
    }

    #[test]
    fn detects_conflicts() {
        let state = EnrollmentState::parse(DEFAULT_CONF);
        assert!(state.check_conflict("example.com", "EXAMPLE.COM").is_ok());

        let err = state.check_conflict("other.com", "EXAMPLE.COM").unwrap_err();
        assert!(err.to_string().contains("domain"));
        let err = state.check_conflict("example.com", "OTHER.COM").unwrap_err();
        assert!(err.to_string().contains("realm"));
    }

    #[test]
    fn requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("default.conf");
        let state_file = dir.path().join("sysrestore.state");
        fs::write(&conf, DEFAULT_CONF).unwrap();

        let paths = PathsConfig {
            default_conf: conf.clone(),
            sysrestore_state: state_file.clone(),
            ca_cert: PathBuf::from("/nonexistent/ca.crt"),
        };
        assert_eq!(EnrollmentState::load(&paths).unwrap(), None);

        fs::write(&state_file, "[network]\n").unwrap();
        let loaded = EnrollmentState::load(&paths).unwrap().unwrap();
        assert_eq!(loaded.server.as_deref(), Some("server1.example.com"));
    }
}
