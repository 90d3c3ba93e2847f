use serde::{Deserialize, Serialize};

/// Options for a single bucket (one per searchable property)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketOptions {
    /// Flush the memtable once its estimated size exceeds this (bytes)
    pub memtable_threshold: usize,
    /// Absorb tombstones when compacting from the first segment
    pub cleanup_tombstones: bool,
    /// Number of secondary indices carried by replace nodes
    pub secondary_indices: u16,
    /// Fsync the commit log after every append
    pub sync_writes: bool,
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            // 10MB
            memtable_threshold: 10 * 1024 * 1024,
            cleanup_tombstones: false,
            secondary_indices: 0,
            sync_writes: true,
        }
    }
}

/// BM25 parameters
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation parameter
    pub k1: f32,
    /// Length normalization parameter
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Search-side configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Worker pool size for per-property scoring tasks
    pub worker_threads: usize,
    /// Shard count for the segment-list lock
    pub lock_shards: u64,
    pub bm25: Bm25Params,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            lock_shards: 512,
            bm25: Bm25Params::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = BucketOptions::default();
        assert!(opts.memtable_threshold > 0);
        assert!(!opts.cleanup_tombstones);

        let cfg = SearchConfig::default();
        assert!(cfg.worker_threads >= 1);
        assert_eq!(cfg.lock_shards, 512);
        assert_eq!(cfg.bm25.k1, 1.2);
        assert_eq!(cfg.bm25.b, 0.75);
    }
}
