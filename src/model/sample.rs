use std::time::Instant;

/// One accepted signal reading on its way to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSample {
    pub name: String,
    pub value: f64,
    pub received_at: Instant,
}

impl SignalSample {
    pub fn new(name: impl Into<String>, value: f64, received_at: Instant) -> Self {
        Self {
            name: name.into(),
            value,
            received_at,
        }
    }
}
