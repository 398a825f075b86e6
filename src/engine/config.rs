use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub retry: RetryPolicy,
}

/// Bounded retry with exponential backoff: the wait before attempt `n + 1` is
/// `backoff_base * 2^(n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Wait after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("AREA_POLL_INTERVAL_MS")
            && let Ok(parsed) = value.parse::<u64>()
            && parsed > 0
        {
            config.poll_interval = Duration::from_millis(parsed);
        }
        if let Ok(value) = std::env::var("AREA_BATCH_SIZE")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.batch_size = parsed.max(1);
        }
        if let Ok(value) = std::env::var("AREA_MAX_ATTEMPTS")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.retry.max_attempts = parsed.max(1);
        }
        if let Ok(value) = std::env::var("AREA_RETRY_BACKOFF_BASE_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.retry.backoff_base = Duration::from_millis(parsed);
        }

        config
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            retry: RetryPolicy::default(),
        }
    }
}
