//! Signal filter: allow/deny lists, per-signal rate limiting, per-envelope cap.
//!
//! Checks run in a fixed order and stop at the first rejection:
//! whitelist, blacklist, rate limit. The envelope cap applies before any
//! of them. Rejections are normal outcomes, not errors.

mod config;
mod rate;

pub use config::{FilterConfig, FilterConfigBuilder};
pub use rate::RateLimiter;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::model::{signal_value, DecodedEnvelope, SignalSample};

/// Why a signal was or was not let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    NotWhitelisted,
    Blacklisted,
    RateLimited,
}

impl Verdict {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::NotWhitelisted => "not_whitelisted",
            Self::Blacklisted => "blacklisted",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// Result of filtering one decoded envelope.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// Accepted samples in the envelope's declared order.
    pub accepted: Vec<SignalSample>,
    pub rejected: u64,
    /// Entries whose value could not be read as a number.
    pub value_errors: u64,
    /// Entries beyond the per-envelope cap.
    pub truncated: u64,
}

pub struct SignalFilter {
    config: FilterConfig,
    intervals: HashMap<String, Duration>,
    limiter: RateLimiter,
}

impl SignalFilter {
    pub fn new(config: FilterConfig) -> Self {
        let config = config.normalized();
        let intervals = config
            .min_interval_by_name
            .iter()
            .map(|(name, secs)| {
                let interval = Duration::try_from_secs_f64(*secs).unwrap_or(Duration::ZERO);
                (name.clone(), interval)
            })
            .collect();

        Self {
            config,
            intervals,
            limiter: RateLimiter::new(),
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Decide on one signal using the current time.
    pub fn accept(&mut self, name: &str, value: f64) -> bool {
        self.check(name, value, Instant::now()).is_accepted()
    }

    /// Decide on one signal at `now`. Accepting moves its rate window.
    pub fn check(&mut self, name: &str, _value: f64, now: Instant) -> Verdict {
        let key = name.to_lowercase();

        if !self.config.whitelist.is_empty() && !self.config.whitelist.contains(&key) {
            return Verdict::NotWhitelisted;
        }
        if self.config.blacklist.contains(&key) {
            return Verdict::Blacklisted;
        }
        if let Some(interval) = self.intervals.get(&key) {
            if !self.limiter.check(&key, *interval, now) {
                return Verdict::RateLimited;
            }
        }
        Verdict::Accepted
    }

    /// Filter every signal of a decoded envelope received at `now`.
    ///
    /// A non-numeric entry only drops itself; its siblings still go through.
    pub fn filter_envelope(&mut self, envelope: &DecodedEnvelope, now: Instant) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        let cap = match self.config.max_signals_per_envelope {
            0 => usize::MAX,
            n => n as usize,
        };

        for (index, (name, raw)) in envelope.data.iter().enumerate() {
            if index >= cap {
                outcome.truncated = (envelope.data.len() - cap) as u64;
                break;
            }

            // Converted before the checks, so an unreadable value never
            // takes a rate window and always counts as a value error.
            let Some(value) = signal_value(raw) else {
                trace!("Dropping non-numeric value for '{}': {}", name, raw);
                outcome.value_errors += 1;
                continue;
            };

            match self.check(name, value, now) {
                Verdict::Accepted => {
                    outcome
                        .accepted
                        .push(SignalSample::new(name.clone(), value, now));
                }
                verdict => {
                    trace!("Signal '{}' {}", name, verdict.as_str());
                    outcome.rejected += 1;
                }
            }
        }

        outcome
    }

    /// Forget all rate-limit history.
    pub fn reset(&mut self) {
        self.limiter.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(entries: &[(&str, serde_json::Value)]) -> DecodedEnvelope {
        entries
            .iter()
            .fold(DecodedEnvelope::new(1.0, "0x100", None), |env, (k, v)| {
                env.with_signal(*k, v.clone())
            })
    }

    #[test]
    fn test_empty_config_accepts_everything() {
        let mut filter = SignalFilter::new(FilterConfig::default());
        assert!(filter.accept("rpm", 1.0));
        assert!(filter.accept("anything", 2.0));
    }

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let config = FilterConfig::builder()
            .whitelist(["rpm", "speed"])
            .blacklist(["RPM"])
            .build();
        let mut filter = SignalFilter::new(config);

        assert_eq!(filter.check("rpm", 1.0, Instant::now()), Verdict::Blacklisted);
        assert_eq!(filter.check("Rpm", 1.0, Instant::now()), Verdict::Blacklisted);
        assert!(filter.accept("speed", 1.0));
    }

    #[test]
    fn test_whitelist_drops_unlisted() {
        let config = FilterConfig::builder().whitelist(["rpm"]).build();
        let mut filter = SignalFilter::new(config);

        assert_eq!(
            filter.check("fuel_level", 1.0, Instant::now()),
            Verdict::NotWhitelisted
        );
        assert!(filter.accept("RPM", 1.0));
    }

    #[test]
    fn test_rate_limit_is_case_insensitive() {
        let config = FilterConfig::builder().rate_limit("rpm", 10.0).build();
        let mut filter = SignalFilter::new(config);
        let now = Instant::now();

        assert!(filter.check("RPM", 1.0, now).is_accepted());
        assert_eq!(filter.check("rpm", 2.0, now), Verdict::RateLimited);
        assert!(filter.check("speed", 2.0, now).is_accepted());
    }

    #[test]
    fn test_rejected_sample_does_not_consume_rate_window() {
        let config = FilterConfig::builder()
            .blacklist(["rpm"])
            .rate_limit("rpm", 10.0)
            .build();
        let mut filter = SignalFilter::new(config);
        let _ = filter.check("rpm", 1.0, Instant::now());
        assert!(filter.limiter.last_accepted("rpm").is_none());
    }

    #[test]
    fn test_envelope_cap_uses_declared_order() {
        let config = FilterConfig::builder().max_signals_per_envelope(2).build();
        let mut filter = SignalFilter::new(config);
        let env = envelope(&[("c", json!(3)), ("a", json!(1)), ("b", json!(2))]);

        let outcome = filter.filter_envelope(&env, Instant::now());
        let names: Vec<_> = outcome.accepted.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
        assert_eq!(outcome.truncated, 1);
    }

    #[test]
    fn test_cap_applies_before_filters() {
        let config = FilterConfig::builder()
            .blacklist(["a"])
            .max_signals_per_envelope(1)
            .build();
        let mut filter = SignalFilter::new(config);
        let env = envelope(&[("a", json!(1)), ("b", json!(2))]);

        let outcome = filter.filter_envelope(&env, Instant::now());
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.truncated, 1);
    }

    #[test]
    fn test_non_numeric_entry_drops_only_itself() {
        let mut filter = SignalFilter::new(FilterConfig::default());
        let env = envelope(&[
            ("rpm", json!(2500)),
            ("gear", json!("PARK")),
            ("speed", json!("42.5")),
        ]);

        let outcome = filter.filter_envelope(&env, Instant::now());
        assert_eq!(outcome.value_errors, 1);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.accepted[1].value, 42.5);
    }

    #[test]
    fn test_unreadable_value_is_a_value_error_before_filters() {
        let config = FilterConfig::builder()
            .blacklist(["gear"])
            .rate_limit("rpm", 10.0)
            .build();
        let mut filter = SignalFilter::new(config);
        let now = Instant::now();
        let env = envelope(&[("rpm", json!("n/a")), ("gear", json!("PARK"))]);

        let outcome = filter.filter_envelope(&env, now);
        assert_eq!(outcome.value_errors, 2);
        assert_eq!(outcome.rejected, 0);
        assert!(filter.limiter.last_accepted("rpm").is_none());

        let outcome = filter.filter_envelope(&envelope(&[("rpm", json!(900))]), now);
        assert_eq!(outcome.accepted.len(), 1);
    }
}
