//! Block-max posting cursors
//!
//! A cursor walks one term's posting in doc-id order while exposing the
//! per-block upper bounds the WAND scorer prunes with. Blocks are decoded
//! lazily: `seek` advances past whole blocks using only the entry table,
//! and the landing block is not materialized until an exact doc id is
//! required. A block the scorer never aligns inside is never decoded.

use std::sync::Arc;

use crate::config::Bm25Params;
use crate::error::{HarpoonError, Result};
use crate::metrics::BlockMetrics;
use crate::search::scoring;

use super::blocks::BlockData;
use super::node::{PostingPayload, TermRecord};
use super::segment::Segment;
use super::{unpack_u64s, unpack_value, BLOCK_SIZE};

/// One decoded posting entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostingEntry {
    pub doc_id: u64,
    pub tf: u32,
    pub field_len: u32,
}

/// Abstract posting storage a cursor can walk. The block metadata must be
/// readable without touching per-document data.
pub trait PostingSource: Send + Sync {
    fn count(&self) -> u64;
    fn n_blocks(&self) -> usize;
    /// `(max_id, raw_impact)` of block `i`; the impact is the write-time
    /// term-frequency bound, not yet scaled by idf or boosts.
    fn block_meta(&self, i: usize) -> (u64, f32);
    fn decode_block(&self, i: usize, out: &mut Vec<PostingEntry>) -> Result<()>;
}

/// Posting stored in a segment file
pub struct DiskPosting {
    segment: Arc<Segment>,
    record: TermRecord,
    /// Meta of the single flat block, computed once at construction
    flat_meta: Option<(u64, f32)>,
    bm25: Bm25Params,
}

impl DiskPosting {
    pub fn new(segment: Arc<Segment>, record: TermRecord, bm25: Bm25Params) -> Self {
        let flat_meta = match &record.payload {
            PostingPayload::Flat { start, len } => {
                let data = segment.data();
                let mut max_id = 0u64;
                let mut max_tf = 0u32;
                for chunk in data[*start..*start + *len].chunks_exact(16) {
                    max_id = u64::from_le_bytes(chunk[..8].try_into().unwrap());
                    let packed = u64::from_le_bytes(chunk[8..].try_into().unwrap());
                    max_tf = max_tf.max(unpack_value(packed).0);
                }
                Some((max_id, scoring::tf_score_bound(max_tf as f32, &bm25)))
            }
            PostingPayload::Blocked { .. } => None,
        };

        Self {
            segment,
            record,
            flat_meta,
            bm25,
        }
    }
}

impl PostingSource for DiskPosting {
    fn count(&self) -> u64 {
        self.record.count
    }

    fn n_blocks(&self) -> usize {
        match &self.record.payload {
            PostingPayload::Flat { .. } => usize::from(self.record.count > 0),
            PostingPayload::Blocked { entries, .. } => entries.len(),
        }
    }

    fn block_meta(&self, i: usize) -> (u64, f32) {
        match &self.record.payload {
            PostingPayload::Flat { .. } => self.flat_meta.expect("flat posting has meta"),
            PostingPayload::Blocked { entries, .. } => {
                (entries[i].max_id, entries[i].max_impact)
            }
        }
    }

    fn decode_block(&self, i: usize, out: &mut Vec<PostingEntry>) -> Result<()> {
        let data = self.segment.data();
        out.clear();

        match &self.record.payload {
            PostingPayload::Flat { start, len } => {
                for chunk in data[*start..*start + *len].chunks_exact(16) {
                    let doc_id = u64::from_le_bytes(chunk[..8].try_into().unwrap());
                    let packed = u64::from_le_bytes(chunk[8..].try_into().unwrap());
                    let (tf, field_len) = unpack_value(packed);
                    out.push(PostingEntry {
                        doc_id,
                        tf,
                        field_len,
                    });
                }
            }
            PostingPayload::Blocked {
                entries,
                data_start,
                data_end,
            } => {
                let section = &data[*data_start + entries[i].offset as usize..*data_end];
                let block = BlockData::decode(section)?;
                let mut ids = Vec::with_capacity(BLOCK_SIZE);
                let mut tfs = Vec::with_capacity(BLOCK_SIZE);
                unpack_u64s(&block.doc_ids, &mut ids)?;
                unpack_u64s(&block.tfs, &mut tfs)?;
                if ids.len() != tfs.len() {
                    return Err(HarpoonError::Corrupt(
                        "doc id and tf arrays disagree in length".to_string(),
                    ));
                }
                for (doc_id, packed) in ids.into_iter().zip(tfs) {
                    let (tf, field_len) = unpack_value(packed);
                    out.push(PostingEntry {
                        doc_id,
                        tf,
                        field_len,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Posting held in memory (memtable contents)
pub struct MemPosting {
    entries: Vec<PostingEntry>,
    metas: Vec<(u64, f32)>,
}

impl MemPosting {
    /// `entries` must be sorted by strictly increasing doc id.
    pub fn new(entries: Vec<PostingEntry>, bm25: &Bm25Params) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].doc_id < w[1].doc_id));

        let metas = entries
            .chunks(BLOCK_SIZE)
            .map(|chunk| {
                let max_tf = chunk.iter().map(|e| e.tf).max().unwrap_or(0);
                (
                    chunk.last().unwrap().doc_id,
                    scoring::tf_score_bound(max_tf as f32, bm25),
                )
            })
            .collect();

        Self { entries, metas }
    }
}

impl PostingSource for MemPosting {
    fn count(&self) -> u64 {
        self.entries.len() as u64
    }

    fn n_blocks(&self) -> usize {
        self.metas.len()
    }

    fn block_meta(&self, i: usize) -> (u64, f32) {
        self.metas[i]
    }

    fn decode_block(&self, i: usize, out: &mut Vec<PostingEntry>) -> Result<()> {
        out.clear();
        let start = i * BLOCK_SIZE;
        let end = (start + BLOCK_SIZE).min(self.entries.len());
        out.extend_from_slice(&self.entries[start..end]);
        Ok(())
    }
}

/// Scoring cursor over one posting source. The weight folds the property
/// boost, duplicate boost and idf, so block bounds and scores come out on
/// the final score scale.
pub struct BlockMaxCursor {
    source: Box<dyn PostingSource>,
    weight: f32,
    avg_len: f32,
    bm25: Bm25Params,

    block_idx: usize,
    decoded: Vec<PostingEntry>,
    is_decoded: bool,
    pos: usize,
    /// First interesting doc id of an undecoded block; materialization
    /// scans to the first entry at or beyond it.
    pending_target: u64,
    exhausted: bool,

    /// Highest raw impact over blocks `i..`, precomputed for pivot checks
    suffix_max_impact: Vec<f32>,

    pub metrics: BlockMetrics,
}

impl BlockMaxCursor {
    pub fn new(source: Box<dyn PostingSource>, weight: f32, avg_len: f32, bm25: Bm25Params) -> Self {
        let n_blocks = source.n_blocks();

        let mut suffix_max_impact = vec![0.0f32; n_blocks + 1];
        for i in (0..n_blocks).rev() {
            suffix_max_impact[i] = source.block_meta(i).1.max(suffix_max_impact[i + 1]);
        }

        let metrics = BlockMetrics {
            block_count_total: n_blocks as u64,
            doc_count_total: source.count(),
            ..Default::default()
        };

        Self {
            exhausted: n_blocks == 0,
            source,
            weight,
            avg_len,
            bm25,
            block_idx: 0,
            decoded: Vec::new(),
            is_decoded: false,
            pos: 0,
            pending_target: 0,
            suffix_max_impact,
            metrics,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn count(&self) -> u64 {
        self.source.count()
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Current doc id; materializes the current block if needed. An
    /// exhausted cursor reports `u64::MAX` so it sorts last.
    pub fn doc_id(&mut self) -> Result<u64> {
        if self.exhausted {
            return Ok(u64::MAX);
        }
        self.materialize()?;
        Ok(self.decoded[self.pos].doc_id)
    }

    /// Lower bound on the current doc id that never decodes: exact when
    /// the block is materialized, otherwise derived from the preceding
    /// block boundary and any pending seek target.
    pub fn doc_id_bound(&self) -> u64 {
        if self.exhausted {
            return u64::MAX;
        }
        if self.is_decoded {
            return self.decoded[self.pos].doc_id;
        }
        let block_floor = if self.block_idx > 0 {
            self.source.block_meta(self.block_idx - 1).0.saturating_add(1)
        } else {
            0
        };
        self.pending_target.max(block_floor)
    }

    /// Last doc id of the current block, from metadata alone.
    pub fn block_max_id(&self) -> u64 {
        if self.exhausted {
            return u64::MAX;
        }
        self.source.block_meta(self.block_idx).0
    }

    /// Score upper bound for the current block, on the final score scale.
    pub fn block_max_impact(&self) -> f32 {
        if self.exhausted {
            return 0.0;
        }
        self.weight * self.source.block_meta(self.block_idx).1
    }

    /// Score upper bound over everything not yet consumed.
    pub fn max_remaining_impact(&self) -> f32 {
        if self.exhausted {
            return 0.0;
        }
        self.weight * self.suffix_max_impact[self.block_idx]
    }

    /// BM25 contribution of the current document.
    pub fn score_current(&mut self) -> Result<f32> {
        if self.exhausted {
            return Ok(0.0);
        }
        self.materialize()?;
        let entry = self.decoded[self.pos];
        Ok(self.weight
            * scoring::tf_score(
                entry.tf as f32,
                entry.field_len as f32,
                self.avg_len,
                &self.bm25,
            ))
    }

    /// Advance to the next entry. Crossing a block boundary defers the
    /// decode of the new block until it is actually read.
    pub fn next(&mut self) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }
        self.materialize()?;

        self.pos += 1;
        if self.pos >= self.decoded.len() {
            self.advance_block();
        }
        Ok(())
    }

    /// Skip to the first entry with doc id >= `target`. Whole blocks whose
    /// `max_id` is below the target are passed over without decoding.
    pub fn seek(&mut self, target: u64) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }

        if self.is_decoded && target <= self.source.block_meta(self.block_idx).0 {
            // target lands in the block we already hold
            while self.pos < self.decoded.len() && self.decoded[self.pos].doc_id < target {
                self.pos += 1;
            }
            if self.pos < self.decoded.len() {
                return Ok(());
            }
            self.advance_block();
        }

        while !self.exhausted && self.source.block_meta(self.block_idx).0 < target {
            self.block_idx += 1;
            self.is_decoded = false;
            if self.block_idx >= self.source.n_blocks() {
                self.exhausted = true;
            }
        }

        if !self.exhausted && !self.is_decoded {
            self.pending_target = self.pending_target.max(target);
        }
        Ok(())
    }

    fn advance_block(&mut self) {
        self.block_idx += 1;
        self.is_decoded = false;
        self.pos = 0;
        self.pending_target = 0;
        if self.block_idx >= self.source.n_blocks() {
            self.exhausted = true;
        }
    }

    fn materialize(&mut self) -> Result<()> {
        if self.is_decoded {
            return Ok(());
        }

        self.source.decode_block(self.block_idx, &mut self.decoded)?;
        if self.decoded.is_empty() {
            return Err(HarpoonError::Corrupt("empty posting block".to_string()));
        }

        self.metrics.block_count_examined += 1;
        self.metrics.doc_count_examined += self.decoded.len() as u64;

        self.is_decoded = true;
        self.pos = 0;
        while self.pos < self.decoded.len() && self.decoded[self.pos].doc_id < self.pending_target {
            self.pos += 1;
        }
        if self.pos >= self.decoded.len() {
            // seek only stops at a block whose max id covers the target
            return Err(HarpoonError::Corrupt(
                "block max id below contained doc ids".to_string(),
            ));
        }
        self.pending_target = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_source(ids: &[u64]) -> Box<MemPosting> {
        let entries: Vec<PostingEntry> = ids
            .iter()
            .map(|&doc_id| PostingEntry {
                doc_id,
                tf: 1 + (doc_id % 3) as u32,
                field_len: 10,
            })
            .collect();
        Box::new(MemPosting::new(entries, &Bm25Params::default()))
    }

    #[test]
    fn test_iterate_all() {
        let ids: Vec<u64> = (0..300).map(|i| i * 2).collect();
        let mut cursor = BlockMaxCursor::new(mem_source(&ids), 1.0, 10.0, Bm25Params::default());

        let mut seen = Vec::new();
        while !cursor.exhausted() {
            seen.push(cursor.doc_id().unwrap());
            cursor.next().unwrap();
        }
        assert_eq!(seen, ids);
    }

    #[test]
    fn test_seek_lands_on_or_after_target() {
        let ids: Vec<u64> = (0..300).map(|i| i * 2).collect();
        let mut cursor = BlockMaxCursor::new(mem_source(&ids), 1.0, 10.0, Bm25Params::default());

        cursor.seek(401).unwrap();
        assert_eq!(cursor.doc_id().unwrap(), 402);

        // seeking backwards is a no-op
        cursor.seek(10).unwrap();
        assert_eq!(cursor.doc_id().unwrap(), 402);

        cursor.seek(597).unwrap();
        assert_eq!(cursor.doc_id().unwrap(), 598);
    }

    #[test]
    fn test_seek_past_end_exhausts() {
        let mut cursor =
            BlockMaxCursor::new(mem_source(&[1, 2, 3]), 1.0, 10.0, Bm25Params::default());
        cursor.seek(100).unwrap();
        assert!(cursor.exhausted());
        assert_eq!(cursor.block_max_id(), u64::MAX);
        assert_eq!(cursor.block_max_impact(), 0.0);
    }

    #[test]
    fn test_block_skip_does_not_decode() {
        // three blocks; jump straight into the last one
        let ids: Vec<u64> = (0..384).collect();
        let mut cursor = BlockMaxCursor::new(mem_source(&ids), 1.0, 10.0, Bm25Params::default());

        cursor.seek(300).unwrap();
        assert_eq!(cursor.doc_id().unwrap(), 300);
        // only the landing block was materialized
        assert_eq!(cursor.metrics.block_count_examined, 1);
        assert_eq!(cursor.metrics.block_count_total, 3);
    }

    #[test]
    fn test_suffix_impact_covers_later_blocks() {
        // low tfs early, high tf late: remaining impact must see the spike
        let mut entries: Vec<PostingEntry> = (0..200)
            .map(|i| PostingEntry {
                doc_id: i,
                tf: 1,
                field_len: 10,
            })
            .collect();
        entries.push(PostingEntry {
            doc_id: 500,
            tf: 40,
            field_len: 10,
        });

        let source = Box::new(MemPosting::new(entries, &Bm25Params::default()));
        let cursor = BlockMaxCursor::new(source, 1.0, 10.0, Bm25Params::default());

        assert!(cursor.max_remaining_impact() > cursor.block_max_impact());
    }

    #[test]
    fn test_score_uses_field_length() {
        let entries = vec![
            PostingEntry {
                doc_id: 1,
                tf: 2,
                field_len: 2,
            },
            PostingEntry {
                doc_id: 2,
                tf: 2,
                field_len: 20,
            },
        ];
        let source = Box::new(MemPosting::new(entries, &Bm25Params::default()));
        let mut cursor = BlockMaxCursor::new(source, 1.0, 5.0, Bm25Params::default());

        let short = cursor.score_current().unwrap();
        cursor.next().unwrap();
        let long = cursor.score_current().unwrap();
        assert!(short > long);
    }
}
