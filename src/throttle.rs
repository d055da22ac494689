//! Pacing for generation service calls

use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// One-token bucket refilled every `cooldown`: consecutive calls are spaced at least
/// `cooldown` apart. A zero cooldown disables pacing.
pub struct Throttle {
    limiter: Option<DefaultDirectRateLimiter>,
    cooldown: Duration,
}

impl Throttle {
    pub fn from_cooldown(cooldown: Duration) -> Self {
        Self {
            limiter: Quota::with_period(cooldown).map(RateLimiter::direct),
            cooldown,
        }
    }

    pub fn from_cooldown_ms(ms: u64) -> Self {
        Self::from_cooldown(Duration::from_millis(ms))
    }

    pub fn disabled() -> Self {
        Self::from_cooldown(Duration::ZERO)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Wait until the next call is allowed
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("cooldown", &self.cooldown)
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}
