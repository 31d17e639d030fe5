use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::facade::DiscoveryRequest;

/// Command-line interface definition.
/// Provides command-line options for realm discovery.
///
/// Verbosity levels:
/// 0 - silent (only final output)
/// 1 - errors (default)
/// 2 - warnings + errors
/// 3 - informational progress
/// 5 - trace/debug
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Discover the identity realm, directory servers and KDCs this host can join"
)]
pub struct Cli {
    /// Directory servers to use instead of DNS discovery (comma separated or repeated)
    #[arg(long = "server", value_name = "FQDN", value_delimiter = ',')]
    pub servers: Vec<String>,

    /// DNS domain of the realm
    #[arg(long)]
    pub domain: Option<String>,

    /// Expected Kerberos realm; discovery fails if a different one is found
    #[arg(long)]
    pub realm: Option<String>,

    /// Client hostname (defaults to this machine's FQDN)
    #[arg(long)]
    pub hostname: Option<String>,

    /// CA certificate used for StartTLS to the directory servers
    #[arg(long = "ca-cert-file", value_name = "FILE")]
    pub ca_cert_file: Option<PathBuf>,

    /// Discover and validate only; make no changes to the identity domain
    #[arg(long)]
    pub check: bool,

    /// Verbosity level (0,1,2,3,5)
    #[arg(long, default_value_t = 1)]
    pub verbose: u8,

    /// Timeout in seconds for each DNS query
    #[arg(long = "dns-timeout", value_name = "SECS")]
    pub dns_timeout: Option<u64>,

    /// Timeout in seconds for LDAP connections
    #[arg(long = "ldap-timeout", value_name = "SECS")]
    pub ldap_timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Disable colored text output
    #[arg(long)]
    pub no_color: bool,

    /// Print the JSON schema of the structured output and exit
    #[arg(long)]
    pub generate_schema: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl Cli {
    /// Parse CLI arguments from process args.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Are trace-level messages enabled?
    pub fn is_trace(&self) -> bool {
        self.verbose >= 5
    }

    /// Are error-level messages enabled?
    pub fn error_enabled(&self) -> bool {
        self.verbose >= 1
    }

    /// Filter directive for the log subscriber.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "off",
            1 => "error",
            2 => "warn",
            3 | 4 => "info",
            _ => "trace",
        }
    }

    pub fn discovery_request(&self) -> DiscoveryRequest {
        DiscoveryRequest {
            servers: self
                .servers
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            domain: self.domain.clone(),
            realm: self.realm.clone(),
            hostname: self.hostname.clone(),
            ca_cert: self.ca_cert_file.clone(),
            check: self.check,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servers_accept_commas_and_repeats() {
        let cli = Cli::parse_from([
            "realmscout",
            "--server",
            "a.example.com,b.example.com",
            "--server",
            "c.example.com",
        ]);
        assert_eq!(
            cli.discovery_request().servers,
            vec!["a.example.com", "b.example.com", "c.example.com"]
        );
    }

    #[test]
    fn verbosity_maps_to_filter() {
        let cli = Cli::parse_from(["realmscout", "--verbose", "0"]);
        assert_eq!(cli.log_directive(), "off");
        let cli = Cli::parse_from(["realmscout", "--verbose", "5"]);
        assert!(cli.is_trace());
        assert_eq!(cli.log_directive(), "trace");
    }

    #[test]
    fn output_format_parses() {
        let cli = Cli::parse_from(["realmscout", "--output", "yaml", "--check"]);
        assert_eq!(cli.output, OutputFormat::Yaml);
        assert!(cli.discovery_request().check);
    }
}
