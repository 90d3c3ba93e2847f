//! Block-max WAND
//!
//! Two-level pruning: term-level upper bounds select the pivot, block
//! metadata short-circuits whole block runs before any doc id is
//! materialized. A block whose bound cannot reach the threshold is
//! jumped over without decoding.

use crate::error::Result;
use crate::metrics::BlockMetrics;

use super::allow::AllowList;
use super::cancel::CancelToken;
use super::queue::{ScoredDoc, TopKHeap};
use super::terms::TermCursor;

/// Run block-max WAND over one property's term cursors, returning the
/// ranked top-k and the merged pruning counters.
pub fn block_max_wand(
    mut terms: Vec<Box<dyn TermCursor>>,
    limit: usize,
    allow: Option<&AllowList>,
    cancel: &CancelToken,
) -> Result<(Vec<ScoredDoc>, BlockMetrics)> {
    let mut heap = TopKHeap::new(limit);
    let mut metrics = BlockMetrics::default();

    'outer: loop {
        cancel.check()?;

        terms.retain_mut(|term| {
            if term.exhausted() {
                metrics.merge(&term.take_metrics());
                false
            } else {
                true
            }
        });
        if terms.is_empty() {
            break;
        }

        terms.sort_by_key(|t| t.doc_id_bound());
        let threshold = heap.threshold();

        // pivot: the first prefix whose summed upper bounds can reach the
        // threshold; no such prefix means nothing left can qualify
        let mut acc = 0.0f32;
        let mut pivot = None;
        for (i, term) in terms.iter().enumerate() {
            acc += term.max_remaining_impact();
            if acc >= threshold && acc > 0.0 {
                pivot = Some(i);
                break;
            }
        }
        let Some(pivot) = pivot else { break };

        // widen over bound ties: a term whose lower bound equals the
        // pivot's could contribute to the same candidate documents
        let bound = terms[pivot].doc_id_bound();
        let mut group_end = pivot;
        while group_end + 1 < terms.len() && terms[group_end + 1].doc_id_bound() <= bound {
            group_end += 1;
        }

        // shallow alignment: candidates below the pivot bound are already
        // ruled out, so block tables can advance without decoding
        for term in &mut terms[..=group_end] {
            term.seek(bound)?;
            if term.exhausted() {
                continue 'outer;
            }
        }

        let block_sum: f32 = terms[..=group_end]
            .iter()
            .map(|t| t.block_max_impact())
            .sum();

        if block_sum < threshold {
            // the current blocks cannot produce a qualifying doc; jump
            // past the nearest block boundary, bounded by the next term's
            // position so uncounted terms stay out of the skipped range
            let boundary = terms[..=group_end]
                .iter()
                .map(|t| t.block_max_id())
                .min()
                .unwrap_or(u64::MAX)
                .saturating_add(1);
            let next_bound = terms
                .get(group_end + 1)
                .map(|t| t.doc_id_bound())
                .unwrap_or(u64::MAX);
            let target = boundary.min(next_bound).max(bound.saturating_add(1));

            for term in &mut terms[..=group_end] {
                term.seek(target)?;
            }
            continue;
        }

        let pivot_id = terms[pivot].doc_id()?;
        if pivot_id == u64::MAX {
            continue;
        }

        // align the leftmost lagging cursor onto the pivot document
        for term in &mut terms[..pivot] {
            if term.doc_id()? < pivot_id {
                term.seek(pivot_id)?;
                continue 'outer;
            }
        }

        // fully score the pivot document across every cursor sitting on
        // it; the bound check keeps far-away cursors undecoded
        let mut score = 0.0f32;
        for term in &mut terms {
            if term.doc_id_bound() <= pivot_id && term.doc_id()? == pivot_id {
                score += term.score_current()?;
            }
        }

        if allow.map_or(true, |a| a.contains(pivot_id)) {
            heap.insert(pivot_id, score);
            metrics.doc_count_added += 1;
        }

        for term in &mut terms {
            if term.doc_id_bound() <= pivot_id && term.doc_id()? == pivot_id {
                term.next()?;
            }
        }
    }

    for term in &mut terms {
        metrics.merge(&term.take_metrics());
    }

    Ok((heap.into_sorted(), metrics))
}
