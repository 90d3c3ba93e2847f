//! Two-segment merge with replace semantics
//!
//! `c1` is always the older segment, so on key conflicts `c2` wins.
//! The output file starts with a dummy header and a keys-length
//! placeholder; once every region is written the real header and length
//! are patched in with two seeks.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};

use roaring::RoaringTreemap;

use crate::config::Bm25Params;
use crate::error::Result;
use crate::segment::{
    write_term_record, DiskIndex, IndexEntry, Segment, SegmentCursor, SegmentHeader,
    SegmentStrategy, DEFAULT_KEY_LENGTH, DEFAULT_VALUE_LENGTH, HEADER_SIZE,
};

#[derive(Clone, Debug)]
pub struct CompactionOptions {
    /// Level written into the merged segment's header
    pub level: u16,
    pub secondary_indices: u16,
    /// Absorb all tombstones instead of carrying them forward. Only safe
    /// when `c1` is the bucket's first segment and the bucket opts in.
    pub cleanup_tombstones: bool,
    pub bm25: Bm25Params,
}

/// Merge `c1` (older) and `c2` (newer) into `out`.
pub fn compact(c1: &Segment, c2: &Segment, out: &mut File, opts: &CompactionOptions) -> Result<()> {
    let tombstones_to_write = c1.tombstones().clone();
    // c1 entries are cleaned against the newer segment's tombstones. When
    // the bitmap is absorbed entirely, every tombstoned entry must go with
    // it or deleted docs would resurrect, so both inputs are cleaned
    // against the union.
    let tombstones_to_clean = if opts.cleanup_tombstones {
        c1.tombstones() | c2.tombstones()
    } else {
        c2.tombstones().clone()
    };

    let mut keys_len = 0u64;
    let mut index_entries: Vec<IndexEntry> = Vec::new();

    {
        let mut w = BufWriter::with_capacity(256 * 1024, &mut *out);

        // dummy header, patched once the index offset is known
        w.write_all(&[0u8; HEADER_SIZE])?;
        w.write_all(&DEFAULT_KEY_LENGTH.to_le_bytes())?;
        w.write_all(&DEFAULT_VALUE_LENGTH.to_le_bytes())?;
        // keys-length placeholder
        w.write_all(&0u64.to_le_bytes())?;

        let mut offset = (HEADER_SIZE + 2 + 2 + 8) as u64;

        let mut cur1 = SegmentCursor::new(c1);
        let mut cur2 = SegmentCursor::new(c2);
        let mut has1 = cur1.first()?;
        let mut has2 = cur2.first()?;

        // cursor buffers are reused between advances, so keys and values
        // are copied out before anything is written
        let mut record = Vec::new();
        let mut write_node = |key: &[u8], values: &[(u64, u64)]| -> std::io::Result<()> {
            record.clear();
            write_term_record(&mut record, key, values, &opts.bm25);
            index_entries.push(IndexEntry {
                key: key.to_vec(),
                offset,
            });
            offset += record.len() as u64;
            keys_len += record.len() as u64;
            w.write_all(&record)
        };

        while has1 || has2 {
            let take_both = has1 && has2 && cur1.key() == cur2.key();

            if take_both {
                let cleaned1 = cleanup_values(cur1.values(), &tombstones_to_clean);
                let cleaned2 = if opts.cleanup_tombstones {
                    cleanup_values(cur2.values(), &tombstones_to_clean)
                } else {
                    cur2.values().to_vec()
                };
                let merged = merge_postings(&cleaned1, &cleaned2);
                if !merged.is_empty() {
                    let key = cur2.key().to_vec();
                    write_node(&key, &merged)?;
                }
                has1 = cur1.next()?;
                has2 = cur2.next()?;
            } else if has1 && (!has2 || cur1.key() < cur2.key()) {
                let cleaned = cleanup_values(cur1.values(), &tombstones_to_clean);
                if !cleaned.is_empty() {
                    let key = cur1.key().to_vec();
                    write_node(&key, &cleaned)?;
                }
                has1 = cur1.next()?;
            } else {
                let values = if opts.cleanup_tombstones {
                    cleanup_values(cur2.values(), &tombstones_to_clean)
                } else {
                    cur2.values().to_vec()
                };
                if !values.is_empty() {
                    let key = cur2.key().to_vec();
                    write_node(&key, &values)?;
                }
                has2 = cur2.next()?;
            }
        }

        let tombstones = compute_tombstones(
            &tombstones_to_write,
            &tombstones_to_clean,
            opts.cleanup_tombstones,
        );
        let mut tombstone_buf = Vec::new();
        if !tombstones.is_empty() {
            tombstones
                .serialize_into(&mut tombstone_buf)
                .map_err(std::io::Error::other)?;
        }
        w.write_all(&(tombstone_buf.len() as u64).to_le_bytes())?;
        w.write_all(&tombstone_buf)?;

        w.write_all(&DiskIndex::encode(&index_entries))?;

        // flush buffered writes so seeking on the file is safe
        w.flush()?;

        let index_start =
            (HEADER_SIZE + 2 + 2 + 8) as u64 + keys_len + 8 + tombstone_buf.len() as u64;

        let mut header = SegmentHeader::new(opts.level, opts.secondary_indices, SegmentStrategy::Inverted);
        header.index_start = index_start;

        drop(w);
        out.seek(SeekFrom::Start(0))?;
        out.write_all(&header.encode())?;

        out.seek(SeekFrom::Start((HEADER_SIZE + 2 + 2) as u64))?;
        out.write_all(&keys_len.to_le_bytes())?;
    }

    out.sync_all()?;
    Ok(())
}

/// Drop c1 entries whose doc id the newer segment tombstoned.
fn cleanup_values(values: &[(u64, u64)], tombstones: &RoaringTreemap) -> Vec<(u64, u64)> {
    values
        .iter()
        .copied()
        .filter(|(doc_id, _)| !tombstones.contains(*doc_id))
        .collect()
}

/// Merge two doc-id-sorted postings; on duplicate doc ids the second
/// (newer) posting wins.
fn merge_postings(older: &[(u64, u64)], newer: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let mut out = Vec::with_capacity(older.len() + newer.len());
    let (mut i, mut j) = (0, 0);

    while i < older.len() && j < newer.len() {
        match older[i].0.cmp(&newer[j].0) {
            std::cmp::Ordering::Less => {
                out.push(older[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(newer[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(newer[j]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&older[i..]);
    out.extend_from_slice(&newer[j..]);
    out
}

fn compute_tombstones(
    to_write: &RoaringTreemap,
    to_clean: &RoaringTreemap,
    cleanup_tombstones: bool,
) -> RoaringTreemap {
    if cleanup_tombstones {
        return RoaringTreemap::new();
    }
    to_write | to_clean
}
