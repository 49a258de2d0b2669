//! Pipeline configuration.
//!
//! One [`PipelineConfig`] is built once (from TOML or the builder),
//! validated once and then only read.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::conflation::BackpressurePolicy;
use crate::dispatch::DeliveryPolicy;
use crate::error::ConfigError;
use crate::filter::FilterConfig;
use crate::sink::{GateThresholds, SinkConfig};

/// Signals delivered immediately unless configured otherwise.
pub const DEFAULT_CRITICAL_SIGNALS: [&str; 5] =
    ["rpm", "engine_rpm", "engine_speed", "speed", "vehicle_speed"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Publish/subscribe feed endpoint.
    pub feed_url: String,
    /// Command/response endpoint.
    pub command_url: String,
    pub poll_interval_ms: u64,
    pub flush_interval_ms: u64,
    pub backpressure: BackpressurePolicy,
    pub filter: FilterConfig,
    pub critical_signals: HashSet<String>,
    /// Deliver every signal immediately.
    pub realtime_mode: bool,
    pub immediate_threshold: f64,
    pub skip_threshold: f64,
    pub command_timeout_ms: u64,
    /// Bound on the feed TCP connect plus WebSocket handshake.
    pub connect_timeout_ms: u64,
    /// Frames buffered between the socket task and the subscriber.
    pub feed_capacity: usize,
    pub sinks: Vec<SinkConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let thresholds = GateThresholds::default();
        Self {
            feed_url: "ws://127.0.0.1:5556".to_string(),
            command_url: "ws://127.0.0.1:5557".to_string(),
            poll_interval_ms: 5,
            flush_interval_ms: 8,
            backpressure: BackpressurePolicy::default(),
            filter: FilterConfig::default(),
            critical_signals: DEFAULT_CRITICAL_SIGNALS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            realtime_mode: false,
            immediate_threshold: thresholds.immediate,
            skip_threshold: thresholds.skip,
            command_timeout_ms: 1000,
            connect_timeout_ms: 2000,
            feed_capacity: 4096,
            sinks: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Create a new config builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Parse, normalize and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Lower-case every signal name the pipeline matches against.
    pub fn normalized(mut self) -> Self {
        self.filter = self.filter.normalized();
        self.critical_signals = self
            .critical_signals
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        for sink in &mut self.sinks {
            for signal in &mut sink.signals {
                *signal = signal.to_lowercase();
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be above zero"));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::invalid("flush_interval_ms", "must be above zero"));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::invalid("command_timeout_ms", "must be above zero"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("connect_timeout_ms", "must be above zero"));
        }
        if self.feed_capacity == 0 {
            return Err(ConfigError::invalid("feed_capacity", "must be above zero"));
        }
        self.backpressure.validate()?;
        self.filter.validate()?;

        let thresholds = self.thresholds();
        thresholds.validate()?;
        if thresholds.is_inverted() {
            warn!(
                "immediate_threshold {} <= skip_threshold {}: no update will be deferred",
                thresholds.immediate, thresholds.skip
            );
        }

        for sink in &self.sinks {
            sink.validate()?;
        }
        Ok(())
    }

    /// Global gate thresholds, used by sinks without their own.
    pub fn thresholds(&self) -> GateThresholds {
        GateThresholds::new(self.immediate_threshold, self.skip_threshold)
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy::new(&self.critical_signals, self.realtime_mode)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Builder pattern for PipelineConfig.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn feed_url(mut self, url: impl Into<String>) -> Self {
        self.config.feed_url = url.into();
        self
    }

    pub fn command_url(mut self, url: impl Into<String>) -> Self {
        self.config.command_url = url.into();
        self
    }

    pub fn poll_interval_ms(mut self, interval: u64) -> Self {
        self.config.poll_interval_ms = interval;
        self
    }

    pub fn flush_interval_ms(mut self, interval: u64) -> Self {
        self.config.flush_interval_ms = interval;
        self
    }

    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.config.backpressure = policy;
        self
    }

    /// Switch to `Bounded` with `max_per_tick` envelopes per tick.
    pub fn bounded(mut self, max_per_tick: u32) -> Self {
        self.config.backpressure = BackpressurePolicy::Bounded { max_per_tick };
        self
    }

    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    /// Replace the critical-signal set.
    pub fn critical_signals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.critical_signals = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn realtime_mode(mut self, enable: bool) -> Self {
        self.config.realtime_mode = enable;
        self
    }

    pub fn thresholds(mut self, immediate: f64, skip: f64) -> Self {
        self.config.immediate_threshold = immediate;
        self.config.skip_threshold = skip;
        self
    }

    pub fn command_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.command_timeout_ms = timeout;
        self
    }

    pub fn connect_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.connect_timeout_ms = timeout;
        self
    }

    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.config.feed_capacity = capacity;
        self
    }

    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.config.sinks.push(sink);
        self
    }

    /// Build the configuration without validating it.
    pub fn build(self) -> PipelineConfig {
        self.config.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkKind;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(5));
        assert_eq!(config.flush_interval(), Duration::from_millis(8));
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.backpressure, BackpressurePolicy::default());
        assert!(config.critical_signals.contains("engine_rpm"));
        assert!(!config.realtime_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::builder()
            .bounded(50)
            .critical_signals(["RPM"])
            .thresholds(0.5, 0.0001)
            .build();

        assert_eq!(
            config.backpressure,
            BackpressurePolicy::Bounded { max_per_tick: 50 }
        );
        assert!(config.critical_signals.contains("rpm"));
        assert_eq!(config.thresholds(), GateThresholds::new(0.5, 0.0001));
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let config = PipelineConfig::builder().poll_interval_ms(0).build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                ..
            })
        ));
        assert!(PipelineConfig::builder()
            .flush_interval_ms(0)
            .build()
            .validate()
            .is_err());
        assert!(PipelineConfig::builder().bounded(0).build().validate().is_err());
        assert!(PipelineConfig::builder()
            .connect_timeout_ms(0)
            .build()
            .validate()
            .is_err());
    }

    #[test]
    fn test_threshold_validation() {
        assert!(PipelineConfig::builder()
            .thresholds(f64::NAN, 0.0)
            .build()
            .validate()
            .is_err());
        assert!(PipelineConfig::builder()
            .thresholds(0.1, -1.0)
            .build()
            .validate()
            .is_err());
        // Inverted thresholds only warn.
        assert!(PipelineConfig::builder()
            .thresholds(0.0001, 0.01)
            .build()
            .validate()
            .is_ok());
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            feed_url = "ws://10.0.0.2:6000"
            flush_interval_ms = 16
            realtime_mode = true
            critical_signals = ["Engine_RPM"]

            [backpressure]
            strategy = "collapse_latest"
            max_drain = 200
            merge = false

            [filter]
            blacklist = ["Debug_Counter"]
            max_signals_per_envelope = 8

            [filter.min_interval_by_name]
            Coolant_Temp = 0.5

            [[sinks]]
            title = "Engine RPM"
            unit = "RPM"
            min = 0.0
            max = 8000.0
            signals = ["RPM", "engine_rpm"]

            [[sinks]]
            title = "Check Engine"
            min = 0.0
            max = 1.0
            signals = ["mil"]
            display = { kind = "indicator", threshold = 0.5 }
            thresholds = { immediate = 0.5, skip = 0.0 }
        "#;

        let config = PipelineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.feed_url, "ws://10.0.0.2:6000");
        assert_eq!(config.flush_interval_ms, 16);
        assert_eq!(config.poll_interval_ms, 5);
        assert!(config.realtime_mode);
        assert!(config.critical_signals.contains("engine_rpm"));
        assert_eq!(
            config.backpressure,
            BackpressurePolicy::CollapseLatest {
                max_drain: 200,
                merge: false
            }
        );
        assert!(config.filter.blacklist.contains("debug_counter"));
        assert_eq!(config.filter.min_interval_by_name.get("coolant_temp"), Some(&0.5));
        assert_eq!(config.sinks.len(), 2);
        assert_eq!(config.sinks[0].signals, vec!["rpm", "engine_rpm"]);
        assert_eq!(config.sinks[0].display, SinkKind::Gauge);
        assert_eq!(config.sinks[1].display, SinkKind::Indicator { threshold: 0.5 });
        assert_eq!(
            config.sinks[1].thresholds,
            Some(GateThresholds::new(0.5, 0.0))
        );
    }

    #[test]
    fn test_from_toml_rejects_bad_sink() {
        let text = r#"
            [[sinks]]
            title = "Backwards"
            min = 100.0
            max = 0.0
            signals = ["x"]
        "#;
        assert!(matches!(
            PipelineConfig::from_toml_str(text),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("poll_interval_ms = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "poll_interval_ms = 10\n[backpressure]\nstrategy = \"bounded\"\nmax_per_tick = 40"
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(
            config.backpressure,
            BackpressurePolicy::Bounded { max_per_tick: 40 }
        );

        assert!(matches!(
            PipelineConfig::load("/nonexistent/gauge-feed.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
