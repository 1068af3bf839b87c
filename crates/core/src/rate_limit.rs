//! Fixed-floor request throttle for external APIs.
//!
//! One [`RateLimiter`] instance per remote API per process. There is no
//! backoff and no jitter: callers are simply delayed until at least
//! `1 / requests_per_second` has elapsed since the previous call started.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Async minimum-interval limiter.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing at most `requests_per_second` call starts
    /// per second. Non-positive rates disable throttling.
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait, if necessary, so this call starts no sooner than
    /// `min_interval` after the previous one.
    ///
    /// The lock is held while sleeping so concurrent callers queue up and
    /// are released one interval apart.
    pub async fn wait_if_needed(&self) {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let earliest = previous + self.min_interval;
            if Instant::now() < earliest {
                tokio::time::sleep_until(earliest).await;
            }
        }
        *last_start = Some(Instant::now());
    }
}
