//! Query-term cursors
//!
//! The scorer works against the [`TermCursor`] capability set rather than
//! a concrete cursor type; segment cursors, memtable cursors and the
//! multi-source union all satisfy it, and future cursor kinds can slot in
//! without touching the scorer.

use std::mem;

use crate::error::Result;
use crate::metrics::BlockMetrics;
use crate::segment::BlockMaxCursor;

/// Everything the WAND loop needs from one query term.
pub trait TermCursor: Send {
    /// Exact current doc id; may decode the current block. `u64::MAX`
    /// once exhausted.
    fn doc_id(&mut self) -> Result<u64>;
    /// Lower bound on the current doc id; never decodes.
    fn doc_id_bound(&self) -> u64;
    fn block_max_id(&self) -> u64;
    fn block_max_impact(&self) -> f32;
    fn max_remaining_impact(&self) -> f32;
    fn next(&mut self) -> Result<()>;
    fn seek(&mut self, target: u64) -> Result<()>;
    fn count(&self) -> u64;
    fn score_current(&mut self) -> Result<f32>;
    fn exhausted(&self) -> bool;
    fn take_metrics(&mut self) -> BlockMetrics;
}

impl TermCursor for BlockMaxCursor {
    fn doc_id(&mut self) -> Result<u64> {
        BlockMaxCursor::doc_id(self)
    }

    fn doc_id_bound(&self) -> u64 {
        BlockMaxCursor::doc_id_bound(self)
    }

    fn block_max_id(&self) -> u64 {
        BlockMaxCursor::block_max_id(self)
    }

    fn block_max_impact(&self) -> f32 {
        BlockMaxCursor::block_max_impact(self)
    }

    fn max_remaining_impact(&self) -> f32 {
        BlockMaxCursor::max_remaining_impact(self)
    }

    fn next(&mut self) -> Result<()> {
        BlockMaxCursor::next(self)
    }

    fn seek(&mut self, target: u64) -> Result<()> {
        BlockMaxCursor::seek(self, target)
    }

    fn count(&self) -> u64 {
        BlockMaxCursor::count(self)
    }

    fn score_current(&mut self) -> Result<f32> {
        BlockMaxCursor::score_current(self)
    }

    fn exhausted(&self) -> bool {
        BlockMaxCursor::exhausted(self)
    }

    fn take_metrics(&mut self) -> BlockMetrics {
        mem::take(&mut self.metrics)
    }
}

/// One query term unified across every active segment plus the memtable.
/// Children are ordered oldest to newest; when the same doc id appears in
/// several sources the newest one wins, which is how updated documents
/// shadow their stale copies.
pub struct UnifiedTerm {
    cursors: Vec<BlockMaxCursor>,
}

impl UnifiedTerm {
    pub fn new(cursors: Vec<BlockMaxCursor>) -> Self {
        Self { cursors }
    }

    fn min_doc_id(&mut self) -> Result<u64> {
        let mut min = u64::MAX;
        for cursor in &mut self.cursors {
            min = min.min(cursor.doc_id()?);
        }
        Ok(min)
    }
}

impl TermCursor for UnifiedTerm {
    fn doc_id(&mut self) -> Result<u64> {
        self.min_doc_id()
    }

    fn doc_id_bound(&self) -> u64 {
        self.cursors
            .iter()
            .map(|c| c.doc_id_bound())
            .min()
            .unwrap_or(u64::MAX)
    }

    fn block_max_id(&self) -> u64 {
        self.cursors
            .iter()
            .filter(|c| !c.exhausted())
            .map(|c| c.block_max_id())
            .min()
            .unwrap_or(u64::MAX)
    }

    fn block_max_impact(&self) -> f32 {
        self.cursors
            .iter()
            .filter(|c| !c.exhausted())
            .map(|c| c.block_max_impact())
            .fold(0.0, f32::max)
    }

    fn max_remaining_impact(&self) -> f32 {
        self.cursors
            .iter()
            .map(|c| c.max_remaining_impact())
            .fold(0.0, f32::max)
    }

    fn next(&mut self) -> Result<()> {
        let current = self.min_doc_id()?;
        if current == u64::MAX {
            return Ok(());
        }
        for cursor in &mut self.cursors {
            if cursor.doc_id()? == current {
                cursor.next()?;
            }
        }
        Ok(())
    }

    fn seek(&mut self, target: u64) -> Result<()> {
        for cursor in &mut self.cursors {
            cursor.seek(target)?;
        }
        Ok(())
    }

    fn count(&self) -> u64 {
        self.cursors.iter().map(|c| c.count()).sum()
    }

    fn score_current(&mut self) -> Result<f32> {
        let current = self.min_doc_id()?;
        // newest source wins for a doc that lives in several
        for cursor in self.cursors.iter_mut().rev() {
            if cursor.doc_id()? == current {
                return cursor.score_current();
            }
        }
        Ok(0.0)
    }

    fn exhausted(&self) -> bool {
        self.cursors.iter().all(|c| c.exhausted())
    }

    fn take_metrics(&mut self) -> BlockMetrics {
        let mut out = BlockMetrics::default();
        for cursor in &mut self.cursors {
            out.merge(&mem::take(&mut cursor.metrics));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bm25Params;
    use crate::segment::{MemPosting, PostingEntry};

    fn cursor_over(entries: Vec<(u64, u32)>, weight: f32) -> BlockMaxCursor {
        let entries: Vec<PostingEntry> = entries
            .into_iter()
            .map(|(doc_id, tf)| PostingEntry {
                doc_id,
                tf,
                field_len: 10,
            })
            .collect();
        BlockMaxCursor::new(
            Box::new(MemPosting::new(entries, &Bm25Params::default())),
            weight,
            10.0,
            Bm25Params::default(),
        )
    }

    #[test]
    fn test_union_merges_doc_streams() {
        let mut term = UnifiedTerm::new(vec![
            cursor_over(vec![(1, 1), (5, 1)], 1.0),
            cursor_over(vec![(3, 1), (7, 1)], 1.0),
        ]);

        let mut seen = Vec::new();
        while !term.exhausted() {
            seen.push(term.doc_id().unwrap());
            term.next().unwrap();
        }
        assert_eq!(seen, vec![1, 3, 5, 7]);
    }

    #[test]
    fn test_union_newest_source_wins_duplicates() {
        // doc 5 exists in the old segment with tf=1 and in the newer one
        // with tf=9; the newer value must be the one scored
        let mut term = UnifiedTerm::new(vec![
            cursor_over(vec![(5, 1)], 1.0),
            cursor_over(vec![(5, 9)], 1.0),
        ]);

        let only_new = cursor_over(vec![(5, 9)], 1.0);
        let mut only_new = UnifiedTerm::new(vec![only_new]);

        assert_eq!(term.doc_id().unwrap(), 5);
        let merged_score = term.score_current().unwrap();
        let new_score = only_new.score_current().unwrap();
        assert_eq!(merged_score, new_score);

        // advancing consumes the doc from both sources
        term.next().unwrap();
        assert!(term.exhausted());
    }

    #[test]
    fn test_union_count_sums_sources() {
        let term = UnifiedTerm::new(vec![
            cursor_over(vec![(1, 1), (2, 1)], 1.0),
            cursor_over(vec![(2, 1)], 1.0),
        ]);
        assert_eq!(term.count(), 3);
    }

    #[test]
    fn test_union_seek_moves_all_children() {
        let mut term = UnifiedTerm::new(vec![
            cursor_over(vec![(1, 1), (10, 1)], 1.0),
            cursor_over(vec![(2, 1), (20, 1)], 1.0),
        ]);

        term.seek(5).unwrap();
        assert_eq!(term.doc_id().unwrap(), 10);
        term.seek(11).unwrap();
        assert_eq!(term.doc_id().unwrap(), 20);
        term.seek(21).unwrap();
        assert!(term.exhausted());
    }
}
