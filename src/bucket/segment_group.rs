//! Live segment list
//!
//! The list is published through an `ArcSwap` so queries pin a consistent
//! snapshot at query start; mid-query compactions never invalidate
//! already-opened cursors. Mutations run under the sharded lock.
//! Vec order is creation order: older segments come first.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::compactor::{compact, CompactionOptions};
use crate::config::Bm25Params;
use crate::error::{HarpoonError, Result};
use crate::segment::Segment;

use super::sharded_lock::ShardedLocks;

const SEGMENT_PREFIX: &str = "segment_";
const SEGMENT_SUFFIX: &str = ".db";

pub struct SegmentGroup {
    dir: PathBuf,
    segments: ArcSwap<Vec<Arc<Segment>>>,
    locks: ShardedLocks,
    next_id: AtomicU64,
}

impl SegmentGroup {
    /// Scan `dir` for segment files and open them in id order.
    pub fn open(dir: impl AsRef<Path>, lock_shards: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut found: Vec<(u64, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = parse_segment_id(name) {
                found.push((id, entry.path()));
            }
        }
        found.sort_by_key(|(id, _)| *id);

        let mut segments = Vec::with_capacity(found.len());
        let mut max_id = 0u64;
        for (id, path) in found {
            segments.push(Arc::new(Segment::open(&path, id)?));
            max_id = max_id.max(id);
        }

        Ok(Self {
            dir,
            next_id: AtomicU64::new(if segments.is_empty() { 0 } else { max_id + 1 }),
            segments: ArcSwap::from_pointee(segments),
            locks: ShardedLocks::new(lock_shards),
        })
    }

    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{SEGMENT_PREFIX}{id}{SEGMENT_SUFFIX}"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot of the current list, oldest first.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Segment>>> {
        self.segments.load_full()
    }

    pub fn len(&self) -> usize {
        self.segments.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.load().is_empty()
    }

    /// Append a freshly flushed segment.
    pub fn add(&self, segment: Arc<Segment>) {
        self.locks.locked_all(|| {
            let mut next = (**self.segments.load()).clone();
            next.push(segment);
            self.segments.store(Arc::new(next));
        });
    }

    /// Merge the oldest adjacent same-level pair, if any. Returns whether
    /// a compaction ran. Tombstones are absorbed only when the older input
    /// is the first segment of the group and the bucket opted in.
    pub fn compact_once(&self, cleanup_tombstones: bool, bm25: &Bm25Params) -> Result<bool> {
        let snapshot = self.snapshot();
        let Some(pair_at) = (0..snapshot.len().saturating_sub(1))
            .find(|&i| snapshot[i].level() == snapshot[i + 1].level())
        else {
            return Ok(false);
        };

        let older = snapshot[pair_at].clone();
        let newer = snapshot[pair_at + 1].clone();

        let opts = CompactionOptions {
            level: older.level() + 1,
            secondary_indices: older.header().secondary_indices,
            cleanup_tombstones: cleanup_tombstones && pair_at == 0,
            bm25: *bm25,
        };

        let merged_id = self.allocate_id();
        let final_path = self.segment_path(merged_id);
        let tmp_path = final_path.with_extension("db.tmp");

        let mut out = std::fs::File::create(&tmp_path)?;
        compact(&older, &newer, &mut out, &opts)?;
        drop(out);

        std::fs::rename(&tmp_path, &final_path)?;
        sync_dir(&self.dir)?;

        let merged = Arc::new(Segment::open(&final_path, merged_id)?);

        let swapped = self.locks.locked_all(|| {
            let current = self.segments.load();
            let pos = current.iter().position(|s| s.id() == older.id());
            match pos {
                Some(pos)
                    if pos + 1 < current.len() && current[pos + 1].id() == newer.id() =>
                {
                    let mut next = (**current).clone();
                    next[pos] = merged.clone();
                    next.remove(pos + 1);
                    self.segments.store(Arc::new(next));
                    true
                }
                _ => false,
            }
        });
        if !swapped {
            merged.mark_obsolete();
            return Err(HarpoonError::Internal(
                "segment list changed underneath compaction".to_string(),
            ));
        }

        // files disappear once the last cursor lets go
        older.mark_obsolete();
        newer.mark_obsolete();

        tracing::info!(
            older = older.id(),
            newer = newer.id(),
            merged = merged_id,
            level = opts.level,
            "compacted segment pair"
        );

        Ok(true)
    }
}

fn parse_segment_id(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

pub(crate) fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::pack_value;
    use crate::segment::testutil::write_test_segment;
    use roaring::RoaringTreemap;
    use tempfile::TempDir;

    fn seed_segment(group: &SegmentGroup, terms: &[(&[u8], Vec<(u64, u64)>)]) {
        let id = group.allocate_id();
        let path = group.segment_path(id);
        write_test_segment(&path, terms, &RoaringTreemap::new());
        group.add(Arc::new(Segment::open(&path, id).unwrap()));
    }

    #[test]
    fn test_open_scans_existing_segments() {
        let tmp = TempDir::new().unwrap();
        write_test_segment(
            &tmp.path().join("segment_0.db"),
            &[(b"a", vec![(1, pack_value(1, 1))])],
            &RoaringTreemap::new(),
        );
        write_test_segment(
            &tmp.path().join("segment_3.db"),
            &[(b"b", vec![(2, pack_value(1, 1))])],
            &RoaringTreemap::new(),
        );

        let group = SegmentGroup::open(tmp.path(), 8).unwrap();
        assert_eq!(group.len(), 2);
        let snapshot = group.snapshot();
        assert_eq!(snapshot[0].id(), 0);
        assert_eq!(snapshot[1].id(), 3);
        // next id continues after the highest on disk
        assert_eq!(group.allocate_id(), 4);
    }

    #[test]
    fn test_compact_once_replaces_pair() {
        let tmp = TempDir::new().unwrap();
        let group = SegmentGroup::open(tmp.path(), 8).unwrap();
        seed_segment(&group, &[(b"fox", vec![(1, pack_value(1, 1))])]);
        seed_segment(&group, &[(b"fox", vec![(2, pack_value(1, 1))])]);

        let ran = group.compact_once(false, &Bm25Params::default()).unwrap();
        assert!(ran);
        assert_eq!(group.len(), 1);

        let snapshot = group.snapshot();
        assert_eq!(snapshot[0].level(), 1);
        assert_eq!(snapshot[0].count(b"fox").unwrap(), 2);
    }

    #[test]
    fn test_compact_skips_mismatched_levels() {
        let tmp = TempDir::new().unwrap();
        let group = SegmentGroup::open(tmp.path(), 8).unwrap();
        seed_segment(&group, &[(b"fox", vec![(1, pack_value(1, 1))])]);

        // single segment: nothing to merge
        assert!(!group.compact_once(false, &Bm25Params::default()).unwrap());
    }

    #[test]
    fn test_snapshot_survives_compaction() {
        let tmp = TempDir::new().unwrap();
        let group = SegmentGroup::open(tmp.path(), 8).unwrap();
        seed_segment(&group, &[(b"fox", vec![(1, pack_value(1, 1))])]);
        seed_segment(&group, &[(b"fox", vec![(2, pack_value(1, 1))])]);

        let pinned = group.snapshot();
        group.compact_once(false, &Bm25Params::default()).unwrap();

        // the pinned snapshot still reads the replaced segments
        assert_eq!(pinned.len(), 2);
        assert_eq!(pinned[0].count(b"fox").unwrap(), 1);
        drop(pinned);
    }
}
