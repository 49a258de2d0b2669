//! Per-signal minimum-interval limiter.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Remembers when each signal was last accepted.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_accepted: HashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `name` at `now` unless it was accepted less than `min_interval` ago.
    ///
    /// Only accepted samples move the window; a rejected sample never
    /// delays the next acceptance.
    pub fn check(&mut self, name: &str, min_interval: Duration, now: Instant) -> bool {
        match self.last_accepted.get_mut(name) {
            Some(last) => {
                if now.saturating_duration_since(*last) < min_interval {
                    return false;
                }
                *last = now;
                true
            }
            None => {
                self.last_accepted.insert(name.to_string(), now);
                true
            }
        }
    }

    pub fn last_accepted(&self, name: &str) -> Option<Instant> {
        self.last_accepted.get(name).copied()
    }

    pub fn clear(&mut self) {
        self.last_accepted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_sample_accepted() {
        let mut limiter = RateLimiter::new();
        assert!(limiter.check("rpm", Duration::from_secs(1), Instant::now()));
    }

    #[test]
    fn test_window() {
        let mut limiter = RateLimiter::new();
        let t0 = Instant::now();
        let k = Duration::from_millis(100);

        assert!(limiter.check("rpm", k, t0));
        assert!(!limiter.check("rpm", k, t0 + Duration::from_millis(50)));
        assert!(!limiter.check("rpm", k, t0 + Duration::from_millis(99)));
        assert!(limiter.check("rpm", k, t0 + k));
        assert_eq!(limiter.last_accepted("rpm"), Some(t0 + k));
    }

    #[test]
    fn test_signals_are_independent() {
        let mut limiter = RateLimiter::new();
        let t0 = Instant::now();
        let k = Duration::from_secs(1);

        assert!(limiter.check("rpm", k, t0));
        assert!(limiter.check("speed", k, t0));
        assert!(!limiter.check("rpm", k, t0 + Duration::from_millis(10)));
    }

    proptest! {
        #[test]
        fn accepted_samples_are_spaced(
            k_ms in 1u64..500,
            offsets in proptest::collection::vec(0u64..50, 1..200),
        ) {
            let mut limiter = RateLimiter::new();
            let k = Duration::from_millis(k_ms);
            let t0 = Instant::now();
            let mut now = t0;
            let mut accepted: Vec<Instant> = Vec::new();

            for step in offsets {
                now += Duration::from_millis(step);
                if limiter.check("s", k, now) {
                    accepted.push(now);
                }
            }

            for pair in accepted.windows(2) {
                prop_assert!(pair[1] - pair[0] >= k);
            }

            // After an idle period of at least K the next sample always passes.
            prop_assert!(limiter.check("s", k, now + k));
        }
    }
}
