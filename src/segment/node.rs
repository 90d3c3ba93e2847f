//! Term record codec
//!
//! Each record in the keys region is
//! `u64 count | u32 key_len | key | values`. Postings of at most
//! `BLOCK_SIZE` entries store flat 16-byte values
//! (`u64 doc_id | u64 packed_tf`). Longer postings store the blocked form:
//! a table of 20-byte block entries followed by the per-block data
//! sections, so the scorer can skip whole blocks from the table alone.

use crate::config::Bm25Params;
use crate::error::{HarpoonError, Result};
use crate::search::scoring;

use super::blocks::{pack_u64s, BlockData, BlockEntry, BLOCK_ENTRY_SIZE};
use super::{unpack_value, BLOCK_SIZE};

/// Byte layout of a posting inside a parsed term record. All offsets are
/// absolute positions in the segment data.
#[derive(Clone, Debug, PartialEq)]
pub enum PostingPayload {
    Flat {
        start: usize,
        len: usize,
    },
    Blocked {
        entries: Vec<BlockEntry>,
        data_start: usize,
        data_end: usize,
    },
}

/// A parsed term record
#[derive(Clone, Debug)]
pub struct TermRecord {
    pub count: u64,
    pub key_start: usize,
    pub key_len: usize,
    pub payload: PostingPayload,
    /// Absolute offset of the first byte after this record
    pub end: usize,
}

impl TermRecord {
    pub fn key<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.key_start..self.key_start + self.key_len]
    }

    /// Number of entries in block `i`; every block is full except the last.
    pub fn block_len(&self, i: usize) -> usize {
        let count = self.count as usize;
        let n_blocks = count.div_ceil(BLOCK_SIZE);
        if i + 1 < n_blocks {
            BLOCK_SIZE
        } else {
            count - BLOCK_SIZE * (n_blocks - 1)
        }
    }
}

/// Serialize one term's posting into `out`, choosing the flat or blocked
/// form by entry count. `entries` are `(doc_id, packed_tf)` pairs sorted by
/// strictly increasing doc id. Returns the number of bytes written.
pub fn write_term_record(
    out: &mut Vec<u8>,
    key: &[u8],
    entries: &[(u64, u64)],
    bm25: &Bm25Params,
) -> usize {
    debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));

    let start = out.len();
    out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key);

    if entries.len() <= BLOCK_SIZE {
        for (doc_id, packed) in entries {
            out.extend_from_slice(&doc_id.to_le_bytes());
            out.extend_from_slice(&packed.to_le_bytes());
        }
        return out.len() - start;
    }

    // blocked form: entry table first, data sections after
    let mut table = Vec::with_capacity(entries.len().div_ceil(BLOCK_SIZE));
    let mut data = Vec::new();

    for chunk in entries.chunks(BLOCK_SIZE) {
        let doc_ids: Vec<u64> = chunk.iter().map(|(d, _)| *d).collect();
        let tfs: Vec<u64> = chunk.iter().map(|(_, p)| *p).collect();

        let max_tf = chunk
            .iter()
            .map(|(_, p)| unpack_value(*p).0)
            .max()
            .unwrap_or(0);

        table.push(BlockEntry {
            max_id: *doc_ids.last().unwrap(),
            offset: data.len() as u64,
            max_impact: scoring::tf_score_bound(max_tf as f32, bm25),
        });

        let block = BlockData {
            doc_ids: pack_u64s(&doc_ids),
            tfs: pack_u64s(&tfs),
        };
        data.extend_from_slice(&block.encode());
    }

    for entry in &table {
        out.extend_from_slice(&entry.encode());
    }
    out.extend_from_slice(&data);

    out.len() - start
}

/// Decode every `(doc_id, packed_tf)` pair of a parsed record into `out`.
/// Compaction re-merges whole postings, so it always decodes fully.
pub fn decode_posting(data: &[u8], record: &TermRecord, out: &mut Vec<(u64, u64)>) -> Result<()> {
    out.clear();
    out.reserve(record.count as usize);

    match &record.payload {
        PostingPayload::Flat { start, len } => {
            for chunk in data[*start..*start + *len].chunks_exact(16) {
                out.push((
                    u64::from_le_bytes(chunk[..8].try_into().unwrap()),
                    u64::from_le_bytes(chunk[8..].try_into().unwrap()),
                ));
            }
        }
        PostingPayload::Blocked {
            entries,
            data_start,
            data_end,
        } => {
            let mut block = BlockData::default();
            let mut ids = Vec::new();
            let mut tfs = Vec::new();
            for entry in entries {
                let section = &data[*data_start + entry.offset as usize..*data_end];
                BlockData::decode_reusable(section, &mut block)?;
                super::unpack_u64s(&block.doc_ids, &mut ids)?;
                super::unpack_u64s(&block.tfs, &mut tfs)?;
                if ids.len() != tfs.len() {
                    return Err(HarpoonError::Corrupt(
                        "doc id and tf arrays disagree in length".to_string(),
                    ));
                }
                out.extend(ids.iter().copied().zip(tfs.iter().copied()));
            }
        }
    }

    if out.len() != record.count as usize {
        return Err(HarpoonError::Corrupt(format!(
            "posting count mismatch: header says {}, decoded {}",
            record.count,
            out.len()
        )));
    }

    Ok(())
}

/// Parse the term record starting at `offset`.
pub fn parse_term_record(data: &[u8], offset: usize) -> Result<TermRecord> {
    let header_end = offset
        .checked_add(12)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| HarpoonError::Corrupt("term record header out of bounds".to_string()))?;

    let count = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
    let key_len = u32::from_le_bytes(data[offset + 8..header_end].try_into().unwrap()) as usize;

    let key_start = header_end;
    let values_start = key_start
        .checked_add(key_len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| HarpoonError::Corrupt("term record key out of bounds".to_string()))?;

    if count as usize <= BLOCK_SIZE {
        let len = count as usize * 16;
        let end = values_start
            .checked_add(len)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| HarpoonError::Corrupt("flat posting out of bounds".to_string()))?;

        return Ok(TermRecord {
            count,
            key_start,
            key_len,
            payload: PostingPayload::Flat {
                start: values_start,
                len,
            },
            end,
        });
    }

    let n_blocks = (count as usize).div_ceil(BLOCK_SIZE);
    let table_end = values_start
        .checked_add(n_blocks * BLOCK_ENTRY_SIZE)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| HarpoonError::Corrupt("block table out of bounds".to_string()))?;

    let mut entries = Vec::with_capacity(n_blocks);
    for i in 0..n_blocks {
        entries.push(BlockEntry::decode(
            &data[values_start + i * BLOCK_ENTRY_SIZE..],
        )?);
    }

    // the end of the record is the end of the last block's data section
    let last = entries
        .last()
        .expect("blocked posting has at least two blocks");
    let last_start = table_end + last.offset as usize;
    if last_start + 4 > data.len() {
        return Err(HarpoonError::Corrupt("block data out of bounds".to_string()));
    }
    let doc_ids_len = u16::from_le_bytes(data[last_start..last_start + 2].try_into().unwrap());
    let tfs_len = u16::from_le_bytes(data[last_start + 2..last_start + 4].try_into().unwrap());
    let data_end = last_start + 4 + doc_ids_len as usize + tfs_len as usize;
    if data_end > data.len() {
        return Err(HarpoonError::Corrupt("block data out of bounds".to_string()));
    }

    Ok(TermRecord {
        count,
        key_start,
        key_len,
        payload: PostingPayload::Blocked {
            entries,
            data_start: table_end,
            data_end,
        },
        end: data_end,
    })
}
