//! Memtable-to-segment serialization
//!
//! Produces a level-0 segment in the documented layout:
//! `header | key len | value len | keys len | term records |
//!  tombstone len | tombstone bitmap | secondary index`.

use std::io::Write;

use crate::config::Bm25Params;
use crate::error::Result;
use crate::segment::{
    pack_value, write_term_record, DiskIndex, IndexEntry, SegmentHeader, SegmentStrategy,
    DEFAULT_KEY_LENGTH, DEFAULT_VALUE_LENGTH, HEADER_SIZE,
};

use super::{collapse, Memtable};

const KEYS_START: u64 = (HEADER_SIZE + 2 + 2 + 8) as u64;

/// Serialize a detached memtable into `out`. Terms whose entries are all
/// tombstoned are omitted; every tombstoned doc id, term-scoped or not,
/// lands in the segment's bitmap.
pub fn flush_memtable(
    memtable: &Memtable,
    out: &mut impl Write,
    secondary_indices: u16,
    bm25: &Bm25Params,
) -> Result<()> {
    let mut keys = Vec::new();
    let mut index_entries = Vec::new();

    for (term, values) in memtable.flatten_in_order() {
        let live = collapse(values);
        if live.is_empty() {
            continue;
        }

        let entries: Vec<(u64, u64)> = live
            .iter()
            .map(|v| (v.doc_id, pack_value(v.tf, v.field_len)))
            .collect();

        index_entries.push(IndexEntry {
            key: term.to_vec(),
            offset: KEYS_START + keys.len() as u64,
        });
        write_term_record(&mut keys, term, &entries, bm25);
    }

    let tombstones = memtable.tombstoned_docs();
    let mut tombstone_buf = Vec::new();
    if !tombstones.is_empty() {
        tombstones
            .serialize_into(&mut tombstone_buf)
            .map_err(std::io::Error::other)?;
    }

    // always level zero on a new segment
    let mut header = SegmentHeader::new(0, secondary_indices, SegmentStrategy::Inverted);
    header.index_start = KEYS_START + keys.len() as u64 + 8 + tombstone_buf.len() as u64;

    out.write_all(&header.encode())?;
    out.write_all(&DEFAULT_KEY_LENGTH.to_le_bytes())?;
    out.write_all(&DEFAULT_VALUE_LENGTH.to_le_bytes())?;
    out.write_all(&(keys.len() as u64).to_le_bytes())?;
    out.write_all(&keys)?;
    out.write_all(&(tombstone_buf.len() as u64).to_le_bytes())?;
    out.write_all(&tombstone_buf)?;
    out.write_all(&DiskIndex::encode(&index_entries))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use tempfile::TempDir;

    fn flush_to_file(memtable: &Memtable, dir: &TempDir, name: &str) -> Segment {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        flush_memtable(memtable, &mut file, 0, &Bm25Params::default()).unwrap();
        file.sync_all().unwrap();
        Segment::open(&path, 0).unwrap()
    }

    #[test]
    fn test_flush_and_reopen() {
        let mut memtable = Memtable::new();
        memtable.put(b"fox", 1, 2, 4);
        memtable.put(b"fox", 3, 1, 2);
        memtable.put(b"quick", 1, 1, 4);

        let tmp = TempDir::new().unwrap();
        let segment = flush_to_file(&memtable, &tmp, "segment_0.db");

        assert_eq!(segment.level(), 0);
        assert_eq!(segment.term_count(), 2);
        assert_eq!(segment.count(b"fox").unwrap(), 2);
        assert_eq!(segment.count(b"quick").unwrap(), 1);
        assert!(segment.tombstones().is_empty());
    }

    #[test]
    fn test_flush_collects_tombstones() {
        let mut memtable = Memtable::new();
        memtable.put(b"fox", 1, 1, 4);
        memtable.set_entry_tombstone(b"quick", 5);
        memtable.set_tombstone(9);

        let tmp = TempDir::new().unwrap();
        let segment = flush_to_file(&memtable, &tmp, "segment_0.db");

        // "quick" had only a tombstoned entry, so the term is gone
        assert_eq!(segment.term_count(), 1);
        assert!(segment.has_tombstone(5));
        assert!(segment.has_tombstone(9));
        assert!(!segment.has_tombstone(1));
    }

    #[test]
    fn test_flush_empty_memtable() {
        let memtable = Memtable::new();
        let tmp = TempDir::new().unwrap();
        let segment = flush_to_file(&memtable, &tmp, "segment_0.db");
        assert_eq!(segment.term_count(), 0);
    }

    #[test]
    fn test_flush_long_posting_roundtrips() {
        let mut memtable = Memtable::new();
        for i in 0..400u64 {
            memtable.put(b"common", i, 1 + (i % 3) as u32, 10);
        }

        let tmp = TempDir::new().unwrap();
        let segment = flush_to_file(&memtable, &tmp, "segment_0.db");
        assert_eq!(segment.count(b"common").unwrap(), 400);

        let record = segment.find(b"common").unwrap().unwrap();
        let mut decoded = Vec::new();
        crate::segment::decode_posting(segment.data(), &record, &mut decoded).unwrap();
        assert_eq!(decoded.len(), 400);
        assert_eq!(decoded[0].0, 0);
        assert_eq!(decoded[399].0, 399);
    }
}
