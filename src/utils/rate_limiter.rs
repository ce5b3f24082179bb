// src/utils/rate_limiter.rs
// Token-bucket limiter for the webhook endpoint, grounded directly on the
// teacher's `utils/rate_limiter.rs`: a `governor` quota wrapped behind a
// small acquire/try_acquire API rather than exposed raw.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovRateLimiter};
use governor::Jitter;

pub struct RateLimiter {
    limiter: GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    jitter: Jitter,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute.max(1)).unwrap());
        Self {
            limiter: GovRateLimiter::direct(quota),
            jitter: Jitter::new(Duration::from_millis(10), Duration::from_millis(100)),
        }
    }

    /// Blocks the caller until a slot is free, jittered to avoid thundering
    /// herds of retries.
    pub async fn acquire(&self) {
        self.limiter.until_ready_with_jitter(self.jitter).await;
    }

    /// Non-blocking check: `false` means the caller should be rejected
    /// immediately (used at the webhook edge, where the HTTP layer would
    /// rather return 429 than hold a vendor connection open).
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausting_the_quota_rejects_further_calls() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
