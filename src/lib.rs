//! realmscout Library
//!
//! Locates the identity realm a host can join: its DNS domain, Kerberos
//! realm, directory base DN, directory servers and KDCs. This library
//! provides functionality to:
//!
//! - Query DNS SRV, address and PTR records through a swappable resolver
//! - Probe candidate LDAP servers and recognise compatible ones
//! - Walk a fallback ladder from explicit hints down to guessed domains,
//!   recording where every discovered value came from
//! - Hold Kerberos tickets in a scoped, self-destroying cache
//! - Reconcile host entries in the realm against a desired state
//!
//! # Example
//!
//! ```rust,no_run
//! use realmscout::config::Config;
//! use realmscout::facade::{Discoverer, DiscoveryRequest};
//!
//! # async fn run() -> realmscout::Result<()> {
//! let discoverer = Discoverer::from_config(Config::from_env())?;
//! let report = discoverer
//!     .discover(&DiscoveryRequest {
//!         hostname: Some("client1.example.com".into()),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{} via {}", report.realm, report.servers.join(", "));
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod dns;
pub mod enrollment;
pub mod errors;
pub mod facade;
pub mod host;
pub mod netutil;
pub mod probe;
pub mod retry;
pub mod structured_output;
pub mod styled_output;
pub mod testing;

// Re-export commonly used types and functions for convenience
pub use discovery::{DiscoveryEngine, DiscoveryResult, Provenance, SearchOutcome, SearchRequest};
pub use errors::{DiscoveryError, ErrorCategory, Result};
pub use facade::{Discoverer, DiscoveryRequest};
pub use structured_output::DiscoveryReport;
pub use styled_output::StyledFormatter;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
