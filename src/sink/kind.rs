//! Display element kinds and their textual rendering.

use serde::Deserialize;

/// The kind of display element behind a sink.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkKind {
    /// Needle gauge over `[min, max]`.
    #[default]
    Gauge,
    /// On/off lamp, lit while the value is above `threshold`.
    Indicator {
        #[serde(default = "default_indicator_threshold")]
        threshold: f64,
    },
    /// Fixed-width seven-segment style numeric readout.
    Readout {
        #[serde(default = "default_digits")]
        digits: usize,
        #[serde(default)]
        decimals: usize,
    },
}

fn default_indicator_threshold() -> f64 {
    0.5
}

fn default_digits() -> usize {
    4
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Indicator { .. } => "indicator",
            Self::Readout { .. } => "readout",
        }
    }

    /// Text shown for `value` on a sink spanning `[min, max]`.
    pub fn display_text(&self, value: f64, min: f64, max: f64) -> String {
        match *self {
            Self::Gauge => format_gauge_value(value, max - min),
            Self::Indicator { threshold } => {
                if is_lit(value, threshold) {
                    "ON".to_string()
                } else {
                    "OFF".to_string()
                }
            }
            Self::Readout { digits, decimals } => format_readout(value, digits, decimals),
        }
    }
}

pub fn is_lit(value: f64, threshold: f64) -> bool {
    value > threshold
}

/// Precision follows the span: whole numbers for wide ranges, two
/// decimals for narrow ones.
pub fn format_gauge_value(value: f64, span: f64) -> String {
    if span >= 100.0 {
        format!("{}", value.trunc() as i64)
    } else if span >= 10.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Right-align `value` into `digits` cells; all dashes when it does not fit.
pub fn format_readout(value: f64, digits: usize, decimals: usize) -> String {
    let formatted = if decimals > 0 {
        format!("{:.*}", decimals, value)
    } else {
        format!("{}", value.trunc() as i64)
    };

    if formatted.len() > digits {
        "-".repeat(digits)
    } else {
        format!("{:>width$}", formatted, width = digits)
    }
}
