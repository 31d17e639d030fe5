//! Retry utilities for DNS lookups with exponential backoff.
//!
//! Only transport-level resolver failures are retried. "Not found" never
//! reaches this layer as an error, so an NXDOMAIN answer costs exactly one
//! query.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::config::NetworkConfig;
use crate::dns::DnsError;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Whether to add +/-10% jitter to each delay
    pub jitter: bool,

    /// Maximum total time to spend retrying
    pub max_total_duration: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
            max_total_duration: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryConfig {
    /// Attempts and first delay from the network settings; a DNS query never
    /// waits longer than its own timeout between attempts.
    pub fn for_network(network: &NetworkConfig) -> Self {
        Self {
            max_attempts: network.retry_attempts,
            initial_delay: network.retry_delay,
            max_delay: network.dns_timeout.max(network.retry_delay),
            ..Self::default()
        }
    }
}

/// Policy for determining if an operation should be retried
pub trait RetryPolicy<E> {
    /// Returns true if the operation should be retried for this error
    fn should_retry(&self, error: &E, attempt: u32) -> bool;
}

/// Retry timeouts and transport failures; a resolver without nameservers
/// will not get better on a second try.
pub struct DnsRetryPolicy;

impl RetryPolicy<DnsError> for DnsRetryPolicy {
    fn should_retry(&self, error: &DnsError, _attempt: u32) -> bool {
        match error {
            DnsError::Timeout { .. } | DnsError::Transport { .. } => true,
            DnsError::NoNameservers { .. } => false,
        }
    }
}

/// Retry executor that handles the retry logic
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an async operation with retry logic.
    ///
    /// Returns the first `Ok`, or the last error once attempts, policy or the
    /// total time budget are exhausted.
    pub async fn execute<F, Fut, T, E, P>(&self, operation: F, policy: P) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: RetryPolicy<E>,
        E: std::error::Error,
    {
        let start_time = Instant::now();
        let mut delay = self.config.initial_delay;
        let mut attempt = 0;

        loop {
            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            let out_of_time = self
                .config
                .max_total_duration
                .is_some_and(|max| start_time.elapsed() >= max);
            if attempt >= self.config.max_attempts
                || out_of_time
                || !policy.should_retry(&error, attempt)
            {
                return Err(error);
            }

            let actual_delay = if self.config.jitter {
                add_jitter(delay)
            } else {
                delay
            };
            debug!(attempt, ?actual_delay, %error, "retrying after transient failure");
            sleep(actual_delay).await;

            delay = std::cmp::min(
                Duration::from_millis(
                    (delay.as_millis() as f64 * self.config.backoff_multiplier) as u64,
                ),
                self.config.max_delay,
            );
            attempt += 1;
        }
    }
}

/// Add random jitter so repeated clients do not retry in lockstep.
fn add_jitter(delay: Duration) -> Duration {
    use rand::Rng;

    let jitter_range = delay.as_millis() as f64 * 0.1;
    if jitter_range <= 0.0 {
        return delay;
    }
    let mut rng = rand::rng();
    let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);

    let jittered_ms = (delay.as_millis() as f64 + jitter).max(0.0) as u64;
    Duration::from_millis(jittered_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn network_settings_bound_the_policy() {
        let network = NetworkConfig {
            retry_attempts: 4,
            retry_delay: Duration::from_millis(50),
            dns_timeout: Duration::from_secs(2),
            ..NetworkConfig::default()
        };
        let config = RetryConfig::for_network(&network);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_delay, Duration::from_millis(50));
        assert_eq!(config.max_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retries_transport_errors_until_success() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast_config(3));
        let result = executor
            .execute(
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(DnsError::Transport {
                            query: "example.com".into(),
                            reason: "connection reset".into(),
                        })
                    } else {
                        Ok(n)
                    }
                },
                DnsRetryPolicy,
            )
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast_config(1));
        let result: Result<(), DnsError> = executor
            .execute(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DnsError::Timeout {
                        query: "example.com".into(),
                        seconds: 1,
                    })
                },
                DnsRetryPolicy,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_missing_nameservers() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast_config(5));
        let result: Result<(), DnsError> = executor
            .execute(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DnsError::NoNameservers {
                        reason: "no nameservers configured".into(),
                    })
                },
                DnsRetryPolicy,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        for _ in 0..50 {
            let d = add_jitter(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(900) && d <= Duration::from_millis(1100));
        }
    }
}
