//! Request throttling for remote sources

use governor::{DefaultDirectRateLimiter, Quota};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Token bucket settings for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Sustained request rate
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Requests admitted back to back; defaults to the per-second rate
    #[serde(default)]
    pub burst: Option<u32>,
}

fn default_requests_per_second() -> u32 {
    10
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::per_second(default_requests_per_second())
    }
}

impl RateLimiterConfig {
    /// Limit to `requests_per_second`, bursting up to the same number
    pub fn per_second(requests_per_second: u32) -> Self {
        Self {
            requests_per_second,
            burst: None,
        }
    }

    #[must_use]
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Zero rates are raised to one
    fn quota(&self) -> Quota {
        let rate = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = self
            .burst
            .and_then(NonZeroU32::new)
            .unwrap_or(rate);
        Quota::per_second(rate).allow_burst(burst)
    }
}

/// Shared token bucket; clones draw from the same bucket
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<DefaultDirectRateLimiter>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: Arc::new(DefaultDirectRateLimiter::direct(config.quota())),
            config,
        }
    }

    /// Wait for a token
    pub async fn acquire(&self) {
        self.bucket.until_ready().await;
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.bucket.check().is_ok()
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.config.requests_per_second)
            .field("burst", &self.config.burst)
            .finish()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;

    #[test]
    fn test_config_burst_defaults_to_rate() {
        let config: RateLimiterConfig = serde_yaml::from_str("requests_per_second: 4").unwrap();
        assert_eq!(config, RateLimiterConfig::per_second(4));

        let limiter = RateLimiter::new(config);
        for _ in 0..4 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_explicit_burst() {
        let limiter = RateLimiter::new(RateLimiterConfig::per_second(1).with_burst(3));
        let clone = limiter.clone();

        assert!(limiter.try_acquire());
        assert!(clone.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!clone.try_acquire());
    }

    #[tokio::test]
    async fn test_zero_rate_still_admits() {
        let limiter = RateLimiter::new(RateLimiterConfig::per_second(0).with_burst(0));
        limiter.acquire().await;
        assert_eq!(limiter.config().requests_per_second, 0);
    }
}
