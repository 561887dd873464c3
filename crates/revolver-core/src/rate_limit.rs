//! Bounds how many rotations may *start* per second.
//!
//! This is independent of the scheduler's slot pool, which bounds how many
//! run at the same time.

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

/// Blocking token source consulted before each rotation starts.
pub trait RateLimit: Send + Sync {
    /// Block until a token is available, then consume it.
    fn take(&self);
}

/// GCRA limiter backed by `governor`.
pub struct GovernorRateLimit {
    limiter: DefaultDirectRateLimiter,
    clock: DefaultClock,
    per_second: NonZeroU32,
}

impl GovernorRateLimit {
    pub fn per_second(per_second: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            clock: DefaultClock::default(),
            per_second,
        }
    }

    pub fn rate(&self) -> NonZeroU32 {
        self.per_second
    }
}

impl RateLimit for GovernorRateLimit {
    fn take(&self) {
        while let Err(not_until) = self.limiter.check() {
            let wait = not_until.wait_time_from(self.clock.now());
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limited");
            std::thread::sleep(wait);
        }
    }
}

impl std::fmt::Debug for GovernorRateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorRateLimit")
            .field("per_second", &self.per_second)
            .finish()
    }
}

/// Never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl RateLimit for Unlimited {
    fn take(&self) {}
}
