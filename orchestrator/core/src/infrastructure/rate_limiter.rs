// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Per-client Rate Limiter
//
// GCRA limiter keyed by client id: `requests` per `window`, with a burst of
// the full allowance. Rejections report how long the client should wait.

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::domain::mesh_config::RateLimitConfig;

pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl ClientRateLimiter {
    pub fn new(requests: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let period = window / burst.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Admits one request from `client`, or returns the time until the next
    /// request would be admitted.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        self.limiter
            .check_key(&client.to_string())
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Drops state for clients whose allowance has fully replenished.
    pub fn prune(&self) {
        self.limiter.retain_recent();
    }
}

impl From<&RateLimitConfig> for ClientRateLimiter {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(config.requests, config.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_each_client_separately() {
        let limiter = ClientRateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("alice").is_ok());
        }
        let wait = limiter.check("alice").unwrap_err();
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(20));

        assert!(limiter.check("bob").is_ok());
    }
}
