//! Block-pruning counters for the WAND scorer
//!
//! Counters are accumulated per query and handed to an injected observer.
//! The default observer logs running averages every 100 queries.

use std::sync::Mutex;

/// Per-query pruning counters, summed over all cursors of the query
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlockMetrics {
    pub block_count_total: u64,
    pub block_count_examined: u64,
    pub block_count_added: u64,
    pub doc_count_total: u64,
    pub doc_count_examined: u64,
    pub doc_count_added: u64,
}

impl BlockMetrics {
    pub fn merge(&mut self, other: &BlockMetrics) {
        self.block_count_total += other.block_count_total;
        self.block_count_examined += other.block_count_examined;
        self.block_count_added += other.block_count_added;
        self.doc_count_total += other.doc_count_total;
        self.doc_count_examined += other.doc_count_examined;
        self.doc_count_added += other.doc_count_added;
    }
}

/// Receives the accumulated counters once per finished query
pub trait MetricsObserver: Send + Sync {
    fn observe(&self, metrics: &BlockMetrics);
}

/// Discards all metrics; used in tests
#[derive(Default)]
pub struct NullObserver;

impl MetricsObserver for NullObserver {
    fn observe(&self, _metrics: &BlockMetrics) {}
}

/// Logs per-query averages every `interval` queries, then resets
pub struct LoggingObserver {
    interval: u64,
    state: Mutex<(u64, BlockMetrics)>,
}

impl LoggingObserver {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            state: Mutex::new((0, BlockMetrics::default())),
        }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MetricsObserver for LoggingObserver {
    fn observe(&self, metrics: &BlockMetrics) {
        let mut state = self.state.lock().unwrap();
        state.0 += 1;
        state.1.merge(metrics);

        if state.0 % self.interval == 0 {
            let n = state.0;
            let m = state.1;
            tracing::info!(
                queries = n,
                blocks_total = m.block_count_total / n,
                blocks_examined = m.block_count_examined / n,
                blocks_added = m.block_count_added / n,
                docs_total = m.doc_count_total / n,
                docs_examined = m.doc_count_examined / n,
                docs_added = m.doc_count_added / n,
                "block-max pruning averages"
            );
            *state = (0, BlockMetrics::default());
        }
    }
}
