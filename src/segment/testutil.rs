//! Shared helpers for segment-level tests

use std::path::Path;

use roaring::RoaringTreemap;

use crate::config::Bm25Params;

use super::header::{SegmentHeader, SegmentStrategy};
use super::index::{DiskIndex, IndexEntry};
use super::node::write_term_record;
use super::segment::KEYS_START;
use super::{DEFAULT_KEY_LENGTH, DEFAULT_VALUE_LENGTH};

/// Write a complete inverted segment following the documented layout.
/// Terms may be given in any order; postings are `(doc_id, packed)` pairs
/// sorted by doc id.
pub(crate) fn write_test_segment(
    path: &Path,
    terms: &[(&[u8], Vec<(u64, u64)>)],
    tombstones: &RoaringTreemap,
) {
    let bm25 = Bm25Params::default();

    let mut sorted: Vec<_> = terms.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut keys = Vec::new();
    let mut entries = Vec::new();
    for (term, posting) in &sorted {
        let offset = (KEYS_START + keys.len()) as u64;
        write_term_record(&mut keys, term, posting, &bm25);
        entries.push(IndexEntry {
            key: term.to_vec(),
            offset,
        });
    }

    let mut tombstone_buf = Vec::new();
    if !tombstones.is_empty() {
        tombstones.serialize_into(&mut tombstone_buf).unwrap();
    }

    let mut header = SegmentHeader::new(0, 0, SegmentStrategy::Inverted);
    header.index_start = (KEYS_START + keys.len() + 8 + tombstone_buf.len()) as u64;

    let mut out = Vec::new();
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&DEFAULT_KEY_LENGTH.to_le_bytes());
    out.extend_from_slice(&DEFAULT_VALUE_LENGTH.to_le_bytes());
    out.extend_from_slice(&(keys.len() as u64).to_le_bytes());
    out.extend_from_slice(&keys);
    out.extend_from_slice(&(tombstone_buf.len() as u64).to_le_bytes());
    out.extend_from_slice(&tombstone_buf);
    out.extend_from_slice(&DiskIndex::encode(&entries));

    std::fs::write(path, out).unwrap();
}
