//! Display sinks and the name-to-sink registry.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::gate::{GateDecision, GateThresholds, ThresholdGate};
use super::kind::SinkKind;
use crate::error::ConfigError;

/// Index of a sink inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(pub usize);

/// Static description of one display element.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SinkConfig {
    pub title: String,
    #[serde(default)]
    pub unit: String,
    pub min: f64,
    pub max: f64,
    /// Signal names feeding this sink, matched case-insensitively.
    pub signals: Vec<String>,
    #[serde(default)]
    pub display: SinkKind,
    /// Overrides the global thresholds for this sink.
    #[serde(default)]
    pub thresholds: Option<GateThresholds>,
}

impl SinkConfig {
    pub fn gauge<I, S>(title: impl Into<String>, min: f64, max: f64, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            unit: String::new(),
            min,
            max,
            signals: signals.into_iter().map(Into::into).collect(),
            display: SinkKind::Gauge,
            thresholds: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_display(mut self, display: SinkKind) -> Self {
        self.display = display;
        self
    }

    pub fn with_thresholds(mut self, thresholds: GateThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Title with the unit appended, if there is one.
    pub fn display_title(&self) -> String {
        if self.unit.is_empty() {
            self.title.clone()
        } else {
            format!("{} ({})", self.title, self.unit)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ConfigError::invalid(
                "sinks.min/max",
                format!("'{}' needs finite min <= max, got [{}, {}]", self.title, self.min, self.max),
            ));
        }
        if self.signals.is_empty() {
            return Err(ConfigError::invalid(
                "sinks.signals",
                format!("'{}' has no signal names", self.title),
            ));
        }
        if let Some(thresholds) = &self.thresholds {
            thresholds.validate()?;
        }
        Ok(())
    }
}

/// One live display element: its configuration, gate and dirty flag.
#[derive(Debug, Clone)]
pub struct DisplaySink {
    id: SinkId,
    config: SinkConfig,
    gate: ThresholdGate,
    dirty: bool,
}

impl DisplaySink {
    pub fn id(&self) -> SinkId {
        self.id
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn value(&self) -> f64 {
        self.gate.current()
    }

    pub fn gate(&self) -> &ThresholdGate {
        &self.gate
    }

    /// Waiting for the next render pass.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn display_text(&self) -> String {
        self.config
            .display
            .display_text(self.gate.current(), self.gate.min(), self.gate.max())
    }
}

/// The external render consumer.
pub trait Renderer: Send {
    fn redraw(&mut self, sink: &DisplaySink);
}

impl<F> Renderer for F
where
    F: FnMut(&DisplaySink) + Send,
{
    fn redraw(&mut self, sink: &DisplaySink) {
        self(sink)
    }
}

/// Renderer that only traces what would be drawn.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn redraw(&mut self, sink: &DisplaySink) {
        debug!(
            "redraw {} = {}",
            sink.config().display_title(),
            sink.display_text()
        );
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderStats {
    pub immediate_redraws: u64,
    pub deferred_marks: u64,
    pub deferred_redraws: u64,
    pub skipped: u64,
    pub render_passes: u64,
}

/// All sinks of a dashboard, addressable by any of their signal names.
pub struct SinkRegistry {
    sinks: Vec<DisplaySink>,
    by_signal: HashMap<String, SinkId>,
    renderer: Box<dyn Renderer>,
    stats: RenderStats,
}

impl SinkRegistry {
    pub fn new(renderer: impl Renderer + 'static) -> Self {
        Self {
            sinks: Vec::new(),
            by_signal: HashMap::new(),
            renderer: Box::new(renderer),
            stats: RenderStats::default(),
        }
    }

    /// Build a registry from configuration, validating every sink.
    pub fn from_configs(
        configs: &[SinkConfig],
        defaults: GateThresholds,
        renderer: impl Renderer + 'static,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new(renderer);
        for config in configs {
            registry.register(config.clone(), defaults)?;
        }
        Ok(registry)
    }

    /// Add a sink. A signal name already claimed by another sink moves to
    /// the new one.
    pub fn register(
        &mut self,
        config: SinkConfig,
        defaults: GateThresholds,
    ) -> Result<SinkId, ConfigError> {
        config.validate()?;
        let id = SinkId(self.sinks.len());
        let thresholds = config.thresholds.unwrap_or(defaults);
        let gate = ThresholdGate::new(config.min, config.max, thresholds)?;

        for signal in &config.signals {
            let key = signal.to_lowercase();
            if let Some(previous) = self.by_signal.insert(key, id) {
                warn!(
                    "Signal '{}' moved from sink {} to '{}'",
                    signal, previous.0, config.title
                );
            }
        }

        self.sinks.push(DisplaySink {
            id,
            config,
            gate,
            dirty: false,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplaySink> {
        self.sinks.iter()
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    pub fn lookup(&self, name: &str) -> Option<SinkId> {
        self.by_signal.get(&name.to_lowercase()).copied()
    }

    pub fn sink(&self, id: SinkId) -> Option<&DisplaySink> {
        self.sinks.get(id.0)
    }

    pub fn sink_for(&self, name: &str) -> Option<&DisplaySink> {
        self.lookup(name).and_then(|id| self.sink(id))
    }

    /// Feed `value` to the sink registered for `name`.
    ///
    /// Returns `None` when no sink listens to `name`.
    pub fn apply(&mut self, name: &str, value: f64) -> Option<GateDecision> {
        let id = self.lookup(name)?;
        let sink = &mut self.sinks[id.0];
        let decision = sink.gate.set_value(value);

        match decision {
            GateDecision::Immediate => {
                sink.dirty = false;
                self.stats.immediate_redraws += 1;
                self.renderer.redraw(sink);
            }
            GateDecision::Deferred => {
                sink.dirty = true;
                self.stats.deferred_marks += 1;
            }
            GateDecision::Skipped => {
                self.stats.skipped += 1;
            }
        }
        trace!("{} <- {} ({})", sink.config.title, value, decision);
        Some(decision)
    }

    /// Change a sink's range. Always redraws synchronously.
    ///
    /// Returns false for an unknown sink or a non-finite bound; the sink is
    /// left untouched in both cases.
    pub fn set_range(&mut self, id: SinkId, min: f64, max: f64) -> bool {
        let Some(sink) = self.sinks.get_mut(id.0) else {
            return false;
        };
        if !sink.gate.set_range(min, max) {
            warn!("Rejected range [{}, {}] for '{}'", min, max, sink.config.title);
            return false;
        }
        sink.config.min = sink.gate.min();
        sink.config.max = sink.gate.max();
        sink.dirty = false;
        self.stats.immediate_redraws += 1;
        self.renderer.redraw(sink);
        true
    }

    /// Redraw every dirty sink once. Returns the number redrawn.
    pub fn render_pass(&mut self) -> usize {
        let mut redrawn = 0;
        for sink in self.sinks.iter_mut().filter(|s| s.dirty) {
            sink.dirty = false;
            self.renderer.redraw(sink);
            redrawn += 1;
        }
        if redrawn > 0 {
            self.stats.render_passes += 1;
            self.stats.deferred_redraws += redrawn as u64;
        }
        redrawn
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("sinks", &self.sinks)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
