use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// One parsed unit received from the feed.
///
/// The backend tags every frame with `"type"`: decoded frames carry a
/// named signal map, raw frames only carry the payload bytes as hex.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Decoded(DecodedEnvelope),
    Raw(RawEnvelope),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DecodedEnvelope {
    /// Unix seconds, as stamped by the bus decoder.
    pub timestamp: f64,
    pub id_hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Signal values in the order the decoder declared them.
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawEnvelope {
    pub timestamp: f64,
    pub id_hex: String,
    pub data_hex: String,
}

impl Envelope {
    /// Decode one text frame from the wire.
    ///
    /// Well-formed JSON tagged with a frame type other than `decoded` or
    /// `raw` is reported as [`DecodeError::UnsupportedFrame`].
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        if let Some(kind) = value.get("type").and_then(Value::as_str) {
            if !matches!(kind, "decoded" | "raw") {
                return Err(DecodeError::UnsupportedFrame(kind.to_string()));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Self::Decoded(d) => d.timestamp,
            Self::Raw(r) => r.timestamp,
        }
    }

    pub fn id_hex(&self) -> &str {
        match self {
            Self::Decoded(d) => &d.id_hex,
            Self::Raw(r) => &r.id_hex,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, Self::Decoded(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decoded(_) => "decoded",
            Self::Raw(_) => "raw",
        }
    }
}

impl DecodedEnvelope {
    pub fn new(timestamp: f64, id_hex: impl Into<String>, name: Option<String>) -> Self {
        Self {
            timestamp,
            id_hex: id_hex.into(),
            name,
            data: Map::new(),
        }
    }

    /// Append a signal entry, replacing any earlier value for the same key.
    pub fn with_signal(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }
}

/// Convert a wire value into a signal reading.
///
/// Numbers, booleans and numeric strings convert; everything else
/// (objects, arrays, null, text, non-finite results) does not.
pub fn signal_value(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}
