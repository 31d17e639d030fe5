//! Scoped Kerberos ticket caches.
//!
//! A [`CredentialCache`] owns a private temporary directory holding one
//! ticket cache. Commands that need the tickets are built with
//! [`CredentialCache::command`], which points `KRB5CCNAME` at the cache
//! for that child only. Dropping the cache runs `kdestroy` against it and
//! removes the directory, on success and error paths alike.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::{DiscoveryError, IoResultExt, Result};

const CCACHE_ENV: &str = "KRB5CCNAME";

/// How to authenticate the principal.
#[derive(Clone)]
pub enum Secret {
    Password(String),
    Keytab(PathBuf),
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Password(_) => f.write_str("Password(<redacted>)"),
            Secret::Keytab(path) => f.debug_tuple("Keytab").field(path).finish(),
        }
    }
}

/// Obtains initial tickets into a given cache.
#[async_trait]
pub trait CredentialAcquirer: Send + Sync {
    async fn acquire(&self, principal: &str, secret: &Secret, cache_path: &Path) -> Result<()>;
}

/// Runs the system `kinit`.
#[derive(Debug, Clone)]
pub struct KinitAcquirer {
    program: PathBuf,
    timeout: Duration,
}

impl Default for KinitAcquirer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("kinit"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl KinitAcquirer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, principal: &str, secret: &Secret, cache_path: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.env(CCACHE_ENV, cache_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match secret {
            Secret::Password(_) => {
                cmd.arg(principal).stdin(Stdio::piped());
            }
            Secret::Keytab(keytab) => {
                cmd.arg("-k").arg("-t").arg(keytab).arg(principal).stdin(Stdio::null());
            }
        }

        let program = self.program.display().to_string();
        let mut child = cmd.spawn().with_path(&program, "spawn")?;
        if let Secret::Password(password) = secret
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(format!("{password}\n").as_bytes())
                .await
                .with_path(&program, "write password")?;
        }

        let output = child
            .wait_with_output()
            .await
            .with_path(&program, "wait")?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            format!("kinit exited with {}", output.status)
        } else {
            stderr
        };
        Err(DiscoveryError::credential(principal, reason))
    }
}

#[async_trait]
impl CredentialAcquirer for KinitAcquirer {
    async fn acquire(&self, principal: &str, secret: &Secret, cache_path: &Path) -> Result<()> {
        debug!(%principal, ?secret, cache = %cache_path.display(), "running kinit");
        match timeout(self.timeout, self.run(principal, secret, cache_path)).await {
            Ok(res) => res,
            Err(_) => Err(DiscoveryError::credential(
                principal,
                format!("kinit did not finish within {}s", self.timeout.as_secs()),
            )),
        }
    }
}

/// A ticket cache that lives exactly as long as this value.
#[derive(Debug)]
pub struct CredentialCache {
    dir: TempDir,
    path: PathBuf,
    destroy_program: Option<PathBuf>,
}

impl CredentialCache {
    /// Create an empty cache location in a fresh private directory.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("krbcc")
            .tempdir()
            .with_path(std::env::temp_dir().display().to_string(), "create cache directory")?;
        let path = dir.path().join("ccache");
        Ok(Self {
            dir,
            path,
            destroy_program: Some(PathBuf::from("kdestroy")),
        })
    }

    /// Create a cache and fill it with tickets for `principal`.
    ///
    /// On failure the half-initialized cache is destroyed before returning.
    pub async fn obtain(
        acquirer: &dyn CredentialAcquirer,
        principal: &str,
        secret: &Secret,
    ) -> Result<Self> {
        let cache = Self::new()?;
        acquirer.acquire(principal, secret, &cache.path).await?;
        debug!(%principal, cache = %cache.path.display(), "tickets acquired");
        Ok(cache)
    }

    /// Use another program (or none) to destroy the cache on drop.
    pub fn destroy_with(mut self, program: Option<PathBuf>) -> Self {
        self.destroy_program = program;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        self.dir.path()
    }

    /// A command whose process sees this cache as its default.
    pub fn command(&self, program: impl AsRef<std::ffi::OsStr>) -> Command {
        let mut cmd = Command::new(program);
        cmd.env(CCACHE_ENV, &self.path);
        cmd
    }
}

impl Drop for CredentialCache {
    fn drop(&mut self) {
        if let Some(program) = &self.destroy_program {
            let status = std::process::Command::new(program)
                .env(CCACHE_ENV, &self.path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match status {
                Ok(s) if s.success() => debug!(cache = %self.path.display(), "ticket cache destroyed"),
                Ok(s) => debug!(cache = %self.path.display(), %s, "kdestroy reported failure"),
                Err(e) => warn!(%e, "could not run kdestroy"),
            }
        }
        // TempDir removes the directory after this returns.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WritingAcquirer;

    #[async_trait]
    impl CredentialAcquirer for WritingAcquirer {
        async fn acquire(&self, _principal: &str, _secret: &Secret, cache_path: &Path) -> Result<()> {
            std::fs::write(cache_path, b"tickets").with_path("ccache", "write")
        }
    }

    struct RejectingAcquirer;

    #[async_trait]
    impl CredentialAcquirer for RejectingAcquirer {
        async fn acquire(&self, principal: &str, _secret: &Secret, cache_path: &Path) -> Result<()> {
            std::fs::write(cache_path, b"partial").with_path("ccache", "write")?;
            Err(DiscoveryError::credential(principal, "Password incorrect"))
        }
    }

    #[tokio::test]
    async fn cache_directory_is_removed_on_drop() {
        let cache = CredentialCache::obtain(
            &WritingAcquirer,
            "admin",
            &Secret::Password("Secret123".into()),
        )
        .await
        .unwrap()
        .destroy_with(None);
        let dir = cache.directory().to_path_buf();
        assert!(cache.path().is_file());
        assert!(cache.path().starts_with(&dir));

        drop(cache);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn failed_acquisition_is_an_auth_error() {
        let err = CredentialCache::obtain(
            &RejectingAcquirer,
            "admin",
            &Secret::Password("wrong".into()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.category(), crate::errors::ErrorCategory::Auth);
        assert!(err.to_string().contains("Password incorrect"));
    }

    #[tokio::test]
    async fn missing_kinit_is_reported() {
        let acquirer = KinitAcquirer::new("/nonexistent/realmscout/kinit", Duration::from_secs(1));
        let cache = CredentialCache::new().unwrap().destroy_with(None);
        let res = acquirer
            .acquire("admin", &Secret::Keytab("/etc/krb5.keytab".into()), cache.path())
            .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn commands_see_the_cache() {
        let cache = CredentialCache::new().unwrap().destroy_with(None);
        let output = cache
            .command("sh")
            .arg("-c")
            .arg("printf %s \"$KRB5CCNAME\"")
            .output()
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), cache.path().display().to_string());
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let rendered = format!("{:?}", Secret::Password("hunter2".into()));
        assert!(!rendered.contains("hunter2"));
    }
}
