//! Update-responsiveness gate.
//!
//! Every sink decides per update whether the change is worth a redraw now,
//! a redraw on the next render pass, or no redraw at all. The decision is
//! driven by the change ratio `|new - current| / (max - min)`.

use serde::Deserialize;

use crate::error::ConfigError;

/// What a sink does with one value update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Value stored and redrawn synchronously.
    Immediate,
    /// Value stored, redraw coalesced into the next render pass.
    Deferred,
    /// Change too small to matter; value not stored.
    Skipped,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Deferred => "deferred",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Change-ratio thresholds of a gate.
///
/// The two are independent. Nothing requires `immediate > skip`: the
/// immediate check runs first, so an inverted pair only narrows or removes
/// the deferred band.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GateThresholds {
    pub immediate: f64,
    pub skip: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            immediate: 0.01,
            skip: 0.0001,
        }
    }
}

impl GateThresholds {
    pub fn new(immediate: f64, skip: f64) -> Self {
        Self { immediate, skip }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.immediate.is_finite() || self.immediate < 0.0 {
            return Err(ConfigError::invalid(
                "immediate_threshold",
                format!("must be a non-negative number, got {}", self.immediate),
            ));
        }
        if !self.skip.is_finite() || self.skip < 0.0 {
            return Err(ConfigError::invalid(
                "skip_threshold",
                format!("must be a non-negative number, got {}", self.skip),
            ));
        }
        Ok(())
    }

    /// True when no ratio can land in the deferred band.
    pub fn is_inverted(&self) -> bool {
        self.immediate <= self.skip
    }
}

/// `{min, max, current}` of one sink plus its thresholds.
///
/// `min <= current <= max` holds after every call.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdGate {
    min: f64,
    max: f64,
    current: f64,
    thresholds: GateThresholds,
}

impl ThresholdGate {
    /// A gate resting at `min`. A reversed range is swapped; non-finite
    /// bounds are rejected.
    pub fn new(min: f64, max: f64, thresholds: GateThresholds) -> Result<Self, ConfigError> {
        let (min, max) = ordered_range(min, max).ok_or_else(|| {
            ConfigError::invalid("min/max", format!("bounds must be finite, got [{}, {}]", min, max))
        })?;
        Ok(Self {
            min,
            max,
            current: min,
            thresholds,
        })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn thresholds(&self) -> GateThresholds {
        self.thresholds
    }

    /// Change ratio of moving to `value` (after clamping).
    pub fn change_ratio(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return f64::INFINITY;
        }
        (self.clamp(value) - self.current).abs() / range
    }

    pub fn set_value(&mut self, value: f64) -> GateDecision {
        if value.is_nan() {
            return GateDecision::Skipped;
        }
        let new = self.clamp(value);
        let range = self.max - self.min;
        if range <= 0.0 {
            self.current = new;
            return GateDecision::Immediate;
        }

        let ratio = (new - self.current).abs() / range;
        if ratio > self.thresholds.immediate {
            self.current = new;
            GateDecision::Immediate
        } else if ratio < self.thresholds.skip {
            GateDecision::Skipped
        } else {
            self.current = new;
            GateDecision::Deferred
        }
    }

    /// Change the range and re-clamp the current value.
    ///
    /// Returns false and keeps the old range if a bound is not finite.
    pub fn set_range(&mut self, min: f64, max: f64) -> bool {
        let Some((min, max)) = ordered_range(min, max) else {
            return false;
        };
        self.min = min;
        self.max = max;
        self.current = self.clamp(self.current);
        true
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

fn ordered_range(a: f64, b: f64) -> Option<(f64, f64)> {
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some(if a <= b { (a, b) } else { (b, a) })
}
