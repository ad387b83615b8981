//! Sliding-window login rate limiting, keyed by client address.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Window over which login attempts are counted (15 minutes).
pub const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Attempts allowed per key within one window.
pub const LOGIN_MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

/// Counts attempts per key over a sliding window. Denied attempts are not
/// recorded, so a blocked client regains access once its oldest counted
/// attempt leaves the window.
pub struct LoginRateLimiter {
    window: Duration,
    max_attempts: usize,
    attempts: DashMap<String, VecDeque<Instant>>,
}

impl LoginRateLimiter {
    pub fn new(window: Duration, max_attempts: usize) -> Self {
        Self {
            window,
            max_attempts,
            attempts: DashMap::new(),
        }
    }

    /// Record an attempt for `key` now.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Record an attempt for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut entry = self.attempts.entry(key.to_owned()).or_default();
        let hits = entry.value_mut();
        while let Some(&oldest) = hits.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }
        if hits.len() >= self.max_attempts {
            let retry_after = hits
                .front()
                .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or(self.window);
            debug!(key, "login attempt rate limited");
            return RateLimitDecision::Limited { retry_after };
        }
        hits.push_back(now);
        RateLimitDecision::Allowed
    }

    /// Drop keys with no attempts inside the window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.attempts.retain(|_, hits| {
            hits.back()
                .is_some_and(|&latest| now.saturating_duration_since(latest) < window)
        });
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        })
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(LOGIN_WINDOW, LOGIN_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eleventh_attempt_in_window_is_limited() {
        let limiter = LoginRateLimiter::default();
        let start = Instant::now();
        for i in 0..LOGIN_MAX_ATTEMPTS {
            let at = start + Duration::from_secs(i as u64);
            assert!(limiter.check_at("10.0.0.1", at).is_allowed());
        }
        let decision = limiter.check_at("10.0.0.1", start + Duration::from_secs(20));
        assert!(matches!(decision, RateLimitDecision::Limited { .. }));
    }

    #[test]
    fn keys_are_counted_separately() {
        let limiter = LoginRateLimiter::new(LOGIN_WINDOW, 1);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_allowed());
        assert!(!limiter.check_at("a", now).is_allowed());
        assert!(limiter.check_at("b", now).is_allowed());
    }

    #[test]
    fn window_slides() {
        let limiter = LoginRateLimiter::new(Duration::from_secs(60), 2);
        let start = Instant::now();
        assert!(limiter.check_at("ip", start).is_allowed());
        assert!(
            limiter
                .check_at("ip", start + Duration::from_secs(30))
                .is_allowed()
        );
        let limited = limiter.check_at("ip", start + Duration::from_secs(40));
        assert_eq!(
            limited,
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(20)
            }
        );
        // first attempt has left the window
        assert!(
            limiter
                .check_at("ip", start + Duration::from_secs(61))
                .is_allowed()
        );
    }

    #[test]
    fn cleanup_drops_idle_keys() {
        let limiter = LoginRateLimiter::new(Duration::from_millis(1), 5);
        limiter.check("ip");
        std::thread::sleep(Duration::from_millis(5));
        limiter.cleanup();
        assert!(limiter.attempts.is_empty());
    }

    #[tokio::test]
    async fn spawn_cleanup_task_runs() {
        let limiter = Arc::new(LoginRateLimiter::default());
        let handle = limiter.spawn_cleanup_task();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
    }
}
