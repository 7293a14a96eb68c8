//! Rate limiting for connect attempts.
//!
//! A token bucket shared by every host of a scan caps how many attempts
//! are dispatched per second, independent of the concurrency limits.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// A cloneable handle to one shared token bucket.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<GovLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` attempts per second.
    ///
    /// Returns `None` for a rate of 0, which means unlimited.
    pub fn per_second(rate: u32) -> Option<Self> {
        let rate = NonZeroU32::new(rate)?;
        Some(Self {
            limiter: Arc::new(GovLimiter::direct(Quota::per_second(rate))),
        })
    }

    /// Wait until a token is available.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_zero_rate_is_unlimited() {
        assert!(RateLimiter::per_second(0).is_none());
    }

    #[tokio::test]
    async fn test_first_token_is_immediate() {
        let limiter = RateLimiter::per_second(100).unwrap();
        let waited = timeout(Duration::from_millis(50), limiter.wait()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_the_bucket() {
        let limiter = RateLimiter::per_second(1).unwrap();
        let shared = limiter.clone();
        limiter.wait().await;

        let blocked = timeout(Duration::from_millis(200), shared.wait()).await;
        assert!(blocked.is_err());
    }
}
