//! Signal filter configuration.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::error::ConfigError;

/// Allow/deny lists, per-signal rate limits and the per-envelope cap.
///
/// All names are matched case-insensitively; [`normalized`](Self::normalized)
/// lower-cases them once at load time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Signals allowed through. Empty allows all.
    pub whitelist: HashSet<String>,
    /// Signals never allowed through, regardless of the whitelist.
    pub blacklist: HashSet<String>,
    /// Minimum seconds between two accepted samples of a signal.
    pub min_interval_by_name: HashMap<String, f64>,
    /// Only the first N entries of an envelope are considered. 0 = unbounded.
    pub max_signals_per_envelope: u32,
}

impl FilterConfig {
    /// Create a new config builder.
    pub fn builder() -> FilterConfigBuilder {
        FilterConfigBuilder::default()
    }

    /// Lower-case every configured name.
    pub fn normalized(self) -> Self {
        Self {
            whitelist: self.whitelist.into_iter().map(|s| s.to_lowercase()).collect(),
            blacklist: self.blacklist.into_iter().map(|s| s.to_lowercase()).collect(),
            min_interval_by_name: self
                .min_interval_by_name
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            max_signals_per_envelope: self.max_signals_per_envelope,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, interval) in &self.min_interval_by_name {
            if !interval.is_finite() || *interval < 0.0 {
                return Err(ConfigError::invalid(
                    "filter.min_interval_by_name",
                    format!("interval for '{}' must be a non-negative number, got {}", name, interval),
                ));
            }
        }
        Ok(())
    }
}

/// Builder pattern for FilterConfig.
#[derive(Default)]
pub struct FilterConfigBuilder {
    config: FilterConfig,
}

impl FilterConfigBuilder {
    /// Allow only the given signals.
    pub fn whitelist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.whitelist.extend(names.into_iter().map(Into::into));
        self
    }

    /// Never allow the given signals.
    pub fn blacklist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.blacklist.extend(names.into_iter().map(Into::into));
        self
    }

    /// Accept at most one sample of `name` every `seconds`.
    pub fn rate_limit(mut self, name: impl Into<String>, seconds: f64) -> Self {
        self.config.min_interval_by_name.insert(name.into(), seconds);
        self
    }

    /// Consider only the first `cap` entries of each envelope.
    pub fn max_signals_per_envelope(mut self, cap: u32) -> Self {
        self.config.max_signals_per_envelope = cap;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> FilterConfig {
        self.config.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_all() {
        let config = FilterConfig::default();
        assert!(config.whitelist.is_empty());
        assert!(config.blacklist.is_empty());
        assert_eq!(config.max_signals_per_envelope, 0);
    }

    #[test]
    fn test_builder_normalizes_names() {
        let config = FilterConfig::builder()
            .whitelist(["RPM", "Speed"])
            .blacklist(["Debug_Counter"])
            .rate_limit("Coolant_Temp", 0.5)
            .build();

        assert!(config.whitelist.contains("rpm"));
        assert!(config.whitelist.contains("speed"));
        assert!(config.blacklist.contains("debug_counter"));
        assert_eq!(config.min_interval_by_name.get("coolant_temp"), Some(&0.5));
    }

    #[test]
    fn test_negative_interval_rejected() {
        let config = FilterConfig::builder().rate_limit("rpm", -1.0).build();
        assert!(config.validate().is_err());

        let config = FilterConfig::builder().rate_limit("rpm", f64::NAN).build();
        assert!(config.validate().is_err());
    }
}
