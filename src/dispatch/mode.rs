//! Delivery mode of an accepted sample.

/// How an accepted sample reaches its sink.
///
/// - **Immediate**: applied synchronously inside the ingestion call.
///   Latency is bounded only by ingestion cost.
/// - **Buffered**: parked in the update buffer, last value wins, applied on
///   the next flush. Latency is bounded by one flush interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryMode {
    Immediate,
    #[default]
    Buffered,
}

impl DeliveryMode {
    #[inline]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Buffered => "buffered",
        }
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
