//! Connection attempts with exponential backoff.
//!
//! [`Backoff`] yields the jittered delay before each retry and stops after
//! the configured number of retries. [`connect_with_backoff`] drives TCP
//! connection attempts with it until one succeeds, the retries run out, or
//! the caller cancels.

use std::time::Duration;

use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Retry timing for connection attempts.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1 s.
    pub initial_delay: Duration,
    /// Growth factor per retry. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Ceiling for any single delay. Default: 30 s.
    pub max_delay: Duration,
    /// Retries after the first attempt. Default: 5.
    pub max_attempts: u32,
    /// Relative jitter, applied as ±jitter. Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: 0.25,
        }
    }
}

/// Iterator over retry delays.
pub struct Backoff {
    config: ReconnectConfig,
    retries: u32,
    base: Duration,
}

impl Backoff {
    /// Start a fresh sequence.
    pub fn new(config: ReconnectConfig) -> Self {
        let base = config.initial_delay;
        Self {
            config,
            retries: 0,
            base,
        }
    }

    /// Retries handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }
        delay.mul_f64(rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter)))
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retries >= self.config.max_attempts {
            return None;
        }
        self.retries += 1;

        let delay = self.jittered(self.base).min(self.config.max_delay);
        self.base = self
            .base
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);
        Some(delay)
    }
}

/// Errors produced while establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// Every allowed retry failed.
    #[error("gave up after {0} retries")]
    MaxAttemptsExhausted(u32),
    /// The caller asked to stop before a connection was made.
    #[error("connection attempt cancelled")]
    Cancelled,
}

/// Connect to `addr`, retrying with exponential backoff.
///
/// Gives up early with [`ReconnectError::Cancelled`] when `cancel` flips to
/// `true` or its sender goes away.
pub async fn connect_with_backoff(
    addr: &str,
    config: ReconnectConfig,
    cancel: &mut watch::Receiver<bool>,
) -> Result<TcpStream, ReconnectError> {
    let mut backoff = Backoff::new(config);

    loop {
        let attempt = tokio::select! {
            attempt = TcpStream::connect(addr) => attempt,
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return Err(ReconnectError::Cancelled);
                }
                continue;
            }
        };
        match attempt {
            Ok(stream) => {
                if backoff.retries() > 0 {
                    tracing::info!("Connected to {addr} after {} retries", backoff.retries());
                }
                return Ok(stream);
            }
            Err(e) => tracing::warn!("Connection attempt to {addr} failed: {e}"),
        }

        let Some(delay) = backoff.next() else {
            return Err(ReconnectError::MaxAttemptsExhausted(backoff.retries()));
        };
        tracing::info!("Retry {} in {delay:?}", backoff.retries());

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return Err(ReconnectError::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            jitter: 0.0,
            max_attempts,
            ..Default::default()
        }
    }

    /// A port nothing listens on.
    fn dead_addr() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    }

    #[test]
    fn test_delays_double_then_cap() {
        let delays: Vec<_> = Backoff::new(steady(8)).map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_stops_after_max_attempts() {
        let mut backoff = Backoff::new(steady(3));
        assert_eq!(backoff.by_ref().count(), 3);
        assert_eq!(backoff.retries(), 3);
        assert!(backoff.next().is_none());
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        for _ in 0..50 {
            let first = Backoff::new(ReconnectConfig::default()).next().unwrap();
            assert!(first >= Duration::from_millis(750) && first <= Duration::from_millis(1250));
        }
    }

    #[tokio::test]
    async fn test_refused_connection_exhausts_attempts() {
        let addr = dead_addr();
        let (_tx, mut rx) = watch::channel(false);
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(1),
            ..steady(2)
        };
        let result = connect_with_backoff(&addr, config, &mut rx).await;
        assert!(matches!(result, Err(ReconnectError::MaxAttemptsExhausted(2))));
    }

    #[tokio::test]
    async fn test_cancel_stops_retrying() {
        let addr = dead_addr();
        let (tx, mut rx) = watch::channel(false);
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            ..steady(5)
        };
        let attempt = tokio::spawn(async move { connect_with_backoff(&addr, config, &mut rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = attempt.await.unwrap();
        assert!(matches!(result, Err(ReconnectError::Cancelled)));
    }
}
