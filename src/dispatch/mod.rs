//! Immediate-vs-buffered routing of accepted samples.

mod mode;

pub use mode::DeliveryMode;

use std::collections::{HashMap, HashSet};

/// Route one signal.
///
/// `Immediate` iff `realtime_mode` is on or the lower-cased name is in
/// `critical`. `critical` must already be lower-cased.
pub fn classify(name: &str, critical: &HashSet<String>, realtime_mode: bool) -> DeliveryMode {
    if realtime_mode || critical.contains(&name.to_lowercase()) {
        DeliveryMode::Immediate
    } else {
        DeliveryMode::Buffered
    }
}

/// Per-signal delivery modes, resolved once from configuration.
///
/// Precedence: realtime mode forces every signal to `Immediate`; otherwise
/// critical signals are `Immediate` and everything else falls back to
/// `Buffered`.
#[derive(Debug, Clone, Default)]
pub struct DeliveryPolicy {
    fallback: DeliveryMode,
    overrides: HashMap<String, DeliveryMode>,
}

impl DeliveryPolicy {
    pub fn new<I, S>(critical: I, realtime_mode: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fallback = if realtime_mode {
            DeliveryMode::Immediate
        } else {
            DeliveryMode::Buffered
        };
        let overrides = critical
            .into_iter()
            .map(|name| (name.as_ref().to_lowercase(), DeliveryMode::Immediate))
            .collect();

        Self {
            fallback,
            overrides,
        }
    }

    pub fn mode_for(&self, name: &str) -> DeliveryMode {
        self.overrides
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(self.fallback)
    }

    pub fn is_realtime(&self) -> bool {
        self.fallback.is_immediate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn critical() -> HashSet<String> {
        ["rpm", "engine_rpm", "engine_speed", "speed", "vehicle_speed"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_classify_critical() {
        let critical = critical();
        assert_eq!(classify("rpm", &critical, false), DeliveryMode::Immediate);
        assert_eq!(classify("Vehicle_Speed", &critical, false), DeliveryMode::Immediate);
        assert_eq!(classify("temperature", &critical, false), DeliveryMode::Buffered);
        assert_eq!(classify("other_signal", &critical, false), DeliveryMode::Buffered);
    }

    #[test]
    fn test_realtime_forces_all_signals_immediate() {
        let critical = critical();
        assert_eq!(classify("temperature", &critical, true), DeliveryMode::Immediate);
        assert_eq!(classify("voltage", &HashSet::new(), true), DeliveryMode::Immediate);
    }

    #[test]
    fn test_policy_matches_classify() {
        let critical = critical();
        for realtime in [false, true] {
            let policy = DeliveryPolicy::new(&critical, realtime);
            for name in ["rpm", "SPEED", "temperature", "voltage"] {
                assert_eq!(
                    policy.mode_for(name),
                    classify(name, &critical, realtime),
                    "{} realtime={}",
                    name,
                    realtime
                );
            }
        }
    }

    #[test]
    fn test_policy_normalizes_names() {
        let policy = DeliveryPolicy::new(["Engine_RPM"], false);
        assert_eq!(policy.mode_for("engine_rpm"), DeliveryMode::Immediate);
        assert!(!policy.is_realtime());
    }
}
