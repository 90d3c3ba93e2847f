//! Per-property field-length statistics
//!
//! BM25 length normalization needs the mean field length of each scored
//! property. The tracker is fed on the write path; a property that never
//! saw a document reports no mean and the scorer degrades to the
//! `1 - b` normalization factor.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Supplies the mean field length per property at query time.
pub trait PropertyLengthTracker: Send + Sync {
    fn mean(&self, property: &str) -> Option<f32>;
}

#[derive(Debug, Default)]
struct LengthStats {
    sum: u64,
    count: u64,
}

/// Running means fed by the indexing path.
#[derive(Debug, Default)]
pub struct LengthTracker {
    stats: RwLock<HashMap<String, LengthStats>>,
}

impl LengthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, property: &str, field_len: u32) {
        let mut stats = self.stats.write();
        let entry = stats.entry(property.to_string()).or_default();
        entry.sum += field_len as u64;
        entry.count += 1;
    }
}

impl PropertyLengthTracker for LengthTracker {
    fn mean(&self, property: &str) -> Option<f32> {
        let stats = self.stats.read();
        let entry = stats.get(property)?;
        if entry.count == 0 {
            return None;
        }
        Some(entry.sum as f32 / entry.count as f32)
    }
}

/// Fixed means, for tests and for callers that track lengths elsewhere.
#[derive(Debug, Default)]
pub struct FixedLengthTracker {
    means: HashMap<String, f32>,
}

impl FixedLengthTracker {
    pub fn new(means: &[(&str, f32)]) -> Self {
        Self {
            means: means
                .iter()
                .map(|(name, mean)| (name.to_string(), *mean))
                .collect(),
        }
    }
}

impl PropertyLengthTracker for FixedLengthTracker {
    fn mean(&self, property: &str) -> Option<f32> {
        self.means.get(property).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let tracker = LengthTracker::new();
        assert_eq!(tracker.mean("body"), None);

        tracker.record("body", 4);
        tracker.record("body", 6);
        assert_eq!(tracker.mean("body"), Some(5.0));
        assert_eq!(tracker.mean("title"), None);
    }

    #[test]
    fn test_fixed_tracker() {
        let tracker = FixedLengthTracker::new(&[("body", 5.0)]);
        assert_eq!(tracker.mean("body"), Some(5.0));
        assert_eq!(tracker.mean("title"), None);
    }
}
