//! Sharded reader-writer locks
//!
//! Per-object locking keyed by `id % shard_count`. Lock-all acquires the
//! shards in order and releases them in reverse, which keeps two
//! concurrent lock-all calls from deadlocking each other.

use parking_lot::RwLock;

pub const DEFAULT_SHARD_COUNT: u64 = 512;

pub struct ShardedLocks {
    shards: Vec<RwLock<()>>,
    count: u64,
}

impl ShardedLocks {
    pub fn new(count: u64) -> Self {
        let count = count.max(2);
        Self {
            shards: (0..count).map(|_| RwLock::new(())).collect(),
            count,
        }
    }

    pub fn locked<R>(&self, id: u64, f: impl FnOnce() -> R) -> R {
        let _guard = self.shards[(id % self.count) as usize].write();
        f()
    }

    pub fn rlocked<R>(&self, id: u64, f: impl FnOnce() -> R) -> R {
        let _guard = self.shards[(id % self.count) as usize].read();
        f()
    }

    pub fn locked_all<R>(&self, f: impl FnOnce() -> R) -> R {
        let guards: Vec<_> = self.shards.iter().map(|s| s.write()).collect();
        let out = f();
        drop(guards);
        out
    }

    pub fn rlocked_all<R>(&self, f: impl FnOnce() -> R) -> R {
        let guards: Vec<_> = self.shards.iter().map(|s| s.read()).collect();
        let out = f();
        drop(guards);
        out
    }
}

impl Default for ShardedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_minimum_two_shards() {
        let locks = ShardedLocks::new(0);
        locks.locked(0, || {});
        locks.locked(1, || {});
    }

    #[test]
    fn test_concurrent_increments() {
        let locks = Arc::new(ShardedLocks::new(8));
        let counter = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let locks = locks.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        locks.locked(t * 100 + i, || {
                            counter.fetch_add(1, Ordering::Relaxed);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 400);
    }

    #[test]
    fn test_locked_all_excludes_readers() {
        let locks = ShardedLocks::new(4);
        locks.locked_all(|| {});
        locks.rlocked_all(|| {});
        locks.rlocked(3, || {});
    }
}
