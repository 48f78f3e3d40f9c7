//! Per-client attempt limiting for verification endpoints.
//!
//! Route-level IP limiters in service-core throttle raw request volume;
//! this limiter is consulted inside the service before any code, password,
//! or assertion check runs, so verification attempts are bounded even when
//! requests arrive through different routes. Fails closed: if the limiter
//! cannot decide, the attempt is denied.

use crate::services::error::ServiceError;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;

#[async_trait]
pub trait AttemptLimiter: Send + Sync {
    async fn check(&self, client_id: &str) -> Result<(), ServiceError>;
}

pub struct KeyedAttemptLimiter {
    limiter: RateLimiter<String, DashMapStateStore<String>, DefaultClock>,
}

impl KeyedAttemptLimiter {
    pub fn new(max_attempts: u32, window_seconds: u64) -> Self {
        let burst = NonZeroU32::new(max_attempts.max(1)).unwrap_or(NonZeroU32::MIN);
        let window = std::time::Duration::from_secs(window_seconds.max(1));
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_minute(burst))
            .allow_burst(burst);
        Self {
            limiter: RateLimiter::dashmap(quota),
        }
    }
}

#[async_trait]
impl AttemptLimiter for KeyedAttemptLimiter {
    async fn check(&self, client_id: &str) -> Result<(), ServiceError> {
        match self.limiter.check_key(&client_id.to_string()) {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until
                    .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                    .as_secs();
                Err(ServiceError::RateLimited {
                    retry_after: Some(retry_after.max(1)),
                })
            }
        }
    }
}

/// Disabled limiter for development and most tests.
pub struct UnlimitedAttempts;

#[async_trait]
impl AttemptLimiter for UnlimitedAttempts {
    async fn check(&self, _client_id: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limiter_blocks_after_budget() {
        let limiter = KeyedAttemptLimiter::new(3, 60);

        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4").await.is_ok());
        }
        let err = limiter.check("1.2.3.4").await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited { .. }));

        // Other clients are unaffected
        assert!(limiter.check("5.6.7.8").await.is_ok());
    }
}
