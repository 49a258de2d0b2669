//! Backlog drain policy.

use serde::Deserialize;

use crate::error::ConfigError;

/// How much of the feed backlog one poll tick consumes, and in what shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Receive up to `max_per_tick` envelopes and dispatch each one.
    ///
    /// Anything beyond the cap stays queued for the next tick, so a
    /// producer that is faster than the consumer for long enough grows the
    /// backlog without bound. Use `CollapseLatest` when that matters.
    Bounded { max_per_tick: u32 },

    /// Drain up to `max_drain` envelopes and turn the decoded ones into a
    /// single unit of work: merged per signal (`merge = true`) or only the
    /// last one (`merge = false`).
    CollapseLatest { max_drain: u32, merge: bool },
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self::CollapseLatest {
            max_drain: 1000,
            merge: true,
        }
    }
}

impl BackpressurePolicy {
    /// Upper bound on receive calls in one tick.
    pub fn drain_limit(&self) -> u32 {
        match self {
            Self::Bounded { max_per_tick } => *max_per_tick,
            Self::CollapseLatest { max_drain, .. } => *max_drain,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bounded { .. } => "bounded",
            Self::CollapseLatest { .. } => "collapse_latest",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drain_limit() == 0 {
            return Err(ConfigError::invalid(
                "backpressure",
                format!("{} policy needs a drain limit above zero", self.as_str()),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bounded { max_per_tick } => write!(f, "bounded({})", max_per_tick),
            Self::CollapseLatest { max_drain, merge } => {
                write!(f, "collapse_latest({}, merge={})", max_drain, merge)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collapses_and_merges() {
        assert_eq!(
            BackpressurePolicy::default(),
            BackpressurePolicy::CollapseLatest {
                max_drain: 1000,
                merge: true
            }
        );
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(BackpressurePolicy::Bounded { max_per_tick: 0 }.validate().is_err());
        assert!(BackpressurePolicy::CollapseLatest {
            max_drain: 0,
            merge: false
        }
        .validate()
        .is_err());
        assert!(BackpressurePolicy::Bounded { max_per_tick: 20 }.validate().is_ok());
    }

    #[test]
    fn test_deserialize_tagged() {
        let policy: BackpressurePolicy =
            toml::from_str("strategy = \"bounded\"\nmax_per_tick = 20").unwrap();
        assert_eq!(policy, BackpressurePolicy::Bounded { max_per_tick: 20 });

        let policy: BackpressurePolicy =
            toml::from_str("strategy = \"collapse_latest\"\nmax_drain = 50\nmerge = false")
                .unwrap();
        assert_eq!(
            policy,
            BackpressurePolicy::CollapseLatest {
                max_drain: 50,
                merge: false
            }
        );
    }
}
