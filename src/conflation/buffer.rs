//! Last-value-wins buffer between ingestion and the render/flush tick.

use std::collections::HashMap;

use crate::model::SignalSample;

/// Buffer statistics for monitoring and debugging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub samples_buffered: u64,
    /// Unflushed samples replaced by a newer one for the same signal.
    pub samples_overwritten: u64,
    pub samples_flushed: u64,
    pub flushes: u64,
}

/// Pending updates keyed by lower-cased signal name.
///
/// Holds at most one sample per signal: a write replaces whatever was
/// waiting, so intermediate values between two flushes are lost on purpose.
#[derive(Debug, Default)]
pub struct UpdateBuffer {
    pending: HashMap<String, SignalSample>,
    stats: BufferStats,
}

impl UpdateBuffer {
    pub fn new() -> Self {
        Self {
            pending: HashMap::with_capacity(64),
            stats: BufferStats::default(),
        }
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Park a sample until the next flush. Returns true if it replaced one.
    pub fn insert(&mut self, sample: SignalSample) -> bool {
        self.stats.samples_buffered += 1;
        let key = sample.name.to_lowercase();
        let replaced = self.pending.insert(key, sample).is_some();
        if replaced {
            self.stats.samples_overwritten += 1;
        }
        replaced
    }

    pub fn get(&self, name: &str) -> Option<&SignalSample> {
        self.pending.get(&name.to_lowercase())
    }

    /// Swap the pending map for an empty one and hand back its contents.
    pub fn take(&mut self) -> HashMap<String, SignalSample> {
        let taken = std::mem::take(&mut self.pending);
        if !taken.is_empty() {
            self.stats.flushes += 1;
            self.stats.samples_flushed += taken.len() as u64;
        }
        taken
    }

    /// Clear all buffered samples.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sample(name: &str, value: f64) -> SignalSample {
        SignalSample::new(name, value, Instant::now())
    }

    #[test]
    fn test_insert_and_take() {
        let mut buffer = UpdateBuffer::new();
        assert!(!buffer.insert(sample("rpm", 1000.0)));
        assert!(!buffer.insert(sample("temp", 80.0)));
        assert_eq!(buffer.len(), 2);

        let taken = buffer.take();
        assert_eq!(taken.len(), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.stats().samples_flushed, 2);
    }

    #[test]
    fn test_last_value_wins() {
        let mut buffer = UpdateBuffer::new();
        buffer.insert(sample("rpm", 1000.0));
        buffer.insert(sample("rpm", 2000.0));
        assert!(buffer.insert(sample("RPM", 3000.0)));

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.get("rpm").map(|s| s.value), Some(3000.0));
        assert_eq!(buffer.stats().samples_overwritten, 2);
    }

    #[test]
    fn test_take_on_empty_is_noop() {
        let mut buffer = UpdateBuffer::new();
        assert!(buffer.take().is_empty());
        assert_eq!(buffer.stats().flushes, 0);
    }
}
