//! Bucket: commit log + memtable + segment list for one property
//!
//! Writes flow through the commit log into the active memtable. Once the
//! memtable crosses the flush threshold it is detached and serialized to
//! a level-0 segment; the detached memtable stays visible to readers
//! until the segment is registered, so a flush never hides data. The
//! segment list itself is compacted pairwise in the background.

mod segment_group;
mod sharded_lock;

pub use segment_group::SegmentGroup;
pub use sharded_lock::{ShardedLocks, DEFAULT_SHARD_COUNT};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::commitlog::{CommitLogParser, CommitLogWriter, ReplaceNode};
use crate::config::{Bm25Params, BucketOptions};
use crate::error::Result;
use crate::memtable::{flush_memtable, Memtable};
use crate::segment::{DiskPosting, MemPosting, PostingEntry, PostingSource, Segment};

const WAL_NAME: &str = "memtable.wal";

struct WriterState {
    log: CommitLogWriter,
}

pub struct Bucket {
    dir: PathBuf,
    opts: BucketOptions,
    bm25: Bm25Params,
    /// Serializes writers and commit-log rotation
    writer: Mutex<WriterState>,
    /// Ensures a single flush runs at a time
    flush_lock: Mutex<()>,
    memtable: RwLock<Memtable>,
    /// Detached memtable currently being serialized, still readable
    flushing: RwLock<Option<Arc<Memtable>>>,
    segments: SegmentGroup,
}

impl Bucket {
    pub fn open(
        dir: impl AsRef<Path>,
        opts: BucketOptions,
        bm25: Bm25Params,
        lock_shards: u64,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let segments = SegmentGroup::open(&dir, lock_shards)?;
        let wal_path = dir.join(WAL_NAME);

        let mut memtable = Memtable::new();
        let log = CommitLogWriter::open(&wal_path, opts.sync_writes)?;

        // replay orphaned flush logs first (older data), then the active
        // log. Orphans stay on disk until the next successful flush makes
        // their contents durable in a segment.
        for (_, path) in orphan_wals(&dir)? {
            let parser = CommitLogParser::open(&path, opts.secondary_indices)?;
            parser.replay(&mut memtable)?;
        }

        let parser = CommitLogParser::open(&wal_path, opts.secondary_indices)?;
        parser.replay(&mut memtable)?;

        Ok(Self {
            dir,
            opts,
            bm25,
            writer: Mutex::new(WriterState { log }),
            flush_lock: Mutex::new(()),
            memtable: RwLock::new(memtable),
            flushing: RwLock::new(None),
            segments,
        })
    }

    /// Record one posting entry. Triggers a flush when the memtable
    /// crosses the configured threshold.
    pub fn put(&self, term: &[u8], doc_id: u64, tf: u32, field_len: u32) -> Result<()> {
        let size = {
            let state = self.writer.lock();
            state
                .log
                .append(&ReplaceNode::inverted_put(term, doc_id, tf, field_len))?;
            let mut memtable = self.memtable.write();
            memtable.put(term, doc_id, tf, field_len);
            memtable.size()
        };

        if size >= self.opts.memtable_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Record the deletion of a document.
    pub fn tombstone(&self, doc_id: u64) -> Result<()> {
        let state = self.writer.lock();
        state.log.append(&ReplaceNode::inverted_tombstone(doc_id))?;
        self.memtable.write().set_tombstone(doc_id);
        Ok(())
    }

    /// Serialize the active memtable into a new level-0 segment. Writers
    /// are paused only while the memtable is detached; serialization runs
    /// against the detached snapshot while new writes land in a fresh
    /// memtable.
    pub fn flush(&self) -> Result<()> {
        let _flushing = self.flush_lock.lock();

        let (detached, segment_id, old_wal) = {
            let mut state = self.writer.lock();
            let mut active = self.memtable.write();
            if active.is_empty() {
                return Ok(());
            }

            let detached = Arc::new(std::mem::take(&mut *active));
            *self.flushing.write() = Some(detached.clone());

            let segment_id = self.segments.allocate_id();
            let old_wal = self.dir.join(format!("{WAL_NAME}.{segment_id}"));
            std::fs::rename(self.dir.join(WAL_NAME), &old_wal)?;
            state.log = CommitLogWriter::open(self.dir.join(WAL_NAME), self.opts.sync_writes)?;

            (detached, segment_id, old_wal)
        };

        let final_path = self.segments.segment_path(segment_id);
        let tmp_path = final_path.with_extension("db.tmp");

        let mut file = std::fs::File::create(&tmp_path)?;
        flush_memtable(
            &detached,
            &mut file,
            self.opts.secondary_indices,
            &self.bm25,
        )?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, &final_path)?;
        segment_group::sync_dir(&self.dir)?;

        let segment = Arc::new(Segment::open(&final_path, segment_id)?);
        self.segments.add(segment);

        *self.flushing.write() = None;

        // the flushed segment covers this log and any older orphans
        std::fs::remove_file(&old_wal)?;
        for (id, path) in orphan_wals(&self.dir)? {
            if id < segment_id {
                std::fs::remove_file(path)?;
            }
        }

        tracing::info!(
            segment = segment_id,
            terms = detached.term_count(),
            "flushed memtable"
        );
        Ok(())
    }

    /// Run at most one pairwise compaction.
    pub fn compact_once(&self) -> Result<bool> {
        self.segments
            .compact_once(self.opts.cleanup_tombstones, &self.bm25)
    }

    /// Every posting source holding `term`, ordered oldest to newest,
    /// together with the summed document frequency. A term absent from
    /// every source yields no sources and no error.
    pub fn posting_sources(
        &self,
        term: &[u8],
    ) -> Result<(Vec<Box<dyn PostingSource>>, u64)> {
        let mut sources: Vec<Box<dyn PostingSource>> = Vec::new();
        let mut df = 0u64;

        for segment in self.segments.snapshot().iter() {
            if let Some(record) = segment.find(term)? {
                df += record.count;
                sources.push(Box::new(DiskPosting::new(
                    segment.clone(),
                    record,
                    self.bm25,
                )));
            }
        }

        if let Some(flushing) = self.flushing.read().as_ref() {
            if let Some(posting) = flushing.posting(term) {
                df += posting.len() as u64;
                sources.push(Box::new(MemPosting::new(
                    to_entries(&posting),
                    &self.bm25,
                )));
            }
        }

        if let Some(posting) = self.memtable.read().posting(term) {
            df += posting.len() as u64;
            sources.push(Box::new(MemPosting::new(to_entries(&posting), &self.bm25)));
        }

        Ok((sources, df))
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn memtable_size(&self) -> usize {
        self.memtable.read().size()
    }
}

fn to_entries(values: &[crate::memtable::MemValue]) -> Vec<PostingEntry> {
    values
        .iter()
        .map(|v| PostingEntry {
            doc_id: v.doc_id,
            tf: v.tf,
            field_len: v.field_len,
        })
        .collect()
}

/// Flush logs left behind by an interrupted flush, sorted oldest first.
fn orphan_wals(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut orphans: Vec<(u64, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(suffix) = name.strip_prefix("memtable.wal.") {
            if let Ok(id) = suffix.parse::<u64>() {
                orphans.push((id, entry.path()));
            }
        }
    }
    orphans.sort_by_key(|(id, _)| *id);
    Ok(orphans)
}
