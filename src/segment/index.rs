//! Secondary index region: sorted `term -> record offset` table
//!
//! On disk: `u64 entry_count | { u32 key_len | key | u64 offset }*`,
//! entries sorted by key. Lookup is a binary search over the parsed table.

use crate::error::{HarpoonError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub offset: u64,
}

/// Parsed index over a segment's keys region
#[derive(Clone, Debug, Default)]
pub struct DiskIndex {
    entries: Vec<IndexEntry>,
}

impl DiskIndex {
    /// Serialize sorted `entries` into the on-disk table.
    pub fn encode(entries: &[IndexEntry]) -> Vec<u8> {
        debug_assert!(entries.windows(2).all(|w| w[0].key < w[1].key));

        let mut out = Vec::new();
        out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        for entry in entries {
            out.extend_from_slice(&(entry.key.len() as u32).to_le_bytes());
            out.extend_from_slice(&entry.key);
            out.extend_from_slice(&entry.offset.to_le_bytes());
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let count = read_u64(data, &mut pos)? as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key_len = read_u32(data, &mut pos)? as usize;
            let key = read_bytes(data, &mut pos, key_len)?.to_vec();
            let offset = read_u64(data, &mut pos)?;
            entries.push(IndexEntry { key, offset });
        }

        if !entries.windows(2).all(|w| w[0].key < w[1].key) {
            return Err(HarpoonError::Corrupt(
                "secondary index keys not strictly sorted".to_string(),
            ));
        }

        Ok(Self { entries })
    }

    /// Byte offset of the term's record, if the term exists.
    pub fn get(&self, key: &[u8]) -> Option<u64> {
        self.entries
            .binary_search_by(|e| e.key.as_slice().cmp(key))
            .ok()
            .map(|i| self.entries[i].offset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, i: usize) -> &IndexEntry {
        &self.entries[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
    Ok(u32::from_le_bytes(read_bytes(data, pos, 4)?.try_into().unwrap()))
}

fn read_u64(data: &[u8], pos: &mut usize) -> Result<u64> {
    Ok(u64::from_le_bytes(read_bytes(data, pos, 8)?.try_into().unwrap()))
}

fn read_bytes<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| HarpoonError::Corrupt("truncated secondary index".to_string()))?;
    let out = &data[*pos..end];
    *pos = end;
    Ok(out)
}
