use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::error::UpstreamError;

/// Política de reintentos para llamadas upstream.
///
/// Worst-case wall clock for one logical call is
/// `max_attempts * timeout + sum(base^(n-1) + max_jitter)` over the retried
/// attempts: 98s with the defaults.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff base in seconds; attempt `n` waits `base^(n-1)` seconds.
    pub base_secs: u64,
    /// Upper bound (exclusive) of the uniform jitter added to each delay.
    pub max_jitter: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_secs: 2,
            max_jitter: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        Duration::from_secs(self.base_secs.saturating_pow(attempt - 1))
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::thread_rng().gen_range(Duration::ZERO..self.max_jitter)
        };
        self.base_delay(attempt).saturating_add(jitter)
    }
}

/// Wraps a single upstream call with bounded retries and backoff.
///
/// Every failure is retried the same way. Dropping the future returned by
/// [`RetryExecutor::execute`] aborts the in-flight call and any pending sleep.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.config.delay_with_jitter(attempt);
                warn!("⚠️ Reintentando {} (intento {}/{}) en {:?}", label, attempt, attempts, delay);
                tokio::time::sleep(delay).await;
            }

            let result = match timeout(self.config.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout(self.config.timeout)),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("✅ {} exitoso en intento {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!("❌ Intento {} falló para {}: {}", attempt, label, e);
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| UpstreamError::Transient(format!("{label}: no attempts made")));
        error!("❌ Todos los intentos fallaron para {}: {}", label, error);
        Err(error)
    }
}
