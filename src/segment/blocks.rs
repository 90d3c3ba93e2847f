//! Block-level codecs
//!
//! A posting list longer than one block is carved into runs of
//! `BLOCK_SIZE` entries. Each block carries a 20-byte entry
//! (`u64 max_id | u64 offset | f32 max_impact`) so the scorer can skip the
//! whole run without decoding it, followed by the block data
//! (`u16 doc_ids_len | u16 tfs_len | doc_ids | tfs`). Doc ids and packed
//! term frequencies are stored as full 8-byte little-endian words.

use crate::error::{HarpoonError, Result};

pub const BLOCK_ENTRY_SIZE: usize = 20;

/// Skip metadata for one block
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockEntry {
    /// Last doc id in the block
    pub max_id: u64,
    /// Byte offset of the block data, relative to the block-data area
    pub offset: u64,
    /// Upper bound on the term-frequency component of the BM25 score for
    /// any document in the block
    pub max_impact: f32,
}

impl BlockEntry {
    pub fn encode(&self) -> [u8; BLOCK_ENTRY_SIZE] {
        let mut out = [0u8; BLOCK_ENTRY_SIZE];
        out[0..8].copy_from_slice(&self.max_id.to_le_bytes());
        out[8..16].copy_from_slice(&self.offset.to_le_bytes());
        out[16..20].copy_from_slice(&self.max_impact.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_ENTRY_SIZE {
            return Err(HarpoonError::Corrupt("block entry too short".to_string()));
        }
        Ok(Self {
            max_id: u64::from_le_bytes(data[0..8].try_into().unwrap()),
            offset: u64::from_le_bytes(data[8..16].try_into().unwrap()),
            max_impact: f32::from_le_bytes(data[16..20].try_into().unwrap()),
        })
    }
}

/// Encoded doc-id and term-frequency arrays of one block
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockData {
    pub doc_ids: Vec<u8>,
    pub tfs: Vec<u8>,
}

impl BlockData {
    pub fn size(&self) -> usize {
        2 + 2 + self.doc_ids.len() + self.tfs.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(&(self.doc_ids.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.tfs.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.doc_ids);
        out.extend_from_slice(&self.tfs);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = BlockData::default();
        Self::decode_reusable(data, &mut out)?;
        Ok(out)
    }

    /// Decode into an existing value, reusing its buffers.
    pub fn decode_reusable(data: &[u8], out: &mut BlockData) -> Result<()> {
        if data.len() < 4 {
            return Err(HarpoonError::Corrupt("block data too short".to_string()));
        }
        let doc_ids_len = u16::from_le_bytes(data[0..2].try_into().unwrap()) as usize;
        let tfs_len = u16::from_le_bytes(data[2..4].try_into().unwrap()) as usize;

        if data.len() < 4 + doc_ids_len + tfs_len {
            return Err(HarpoonError::Corrupt("block data truncated".to_string()));
        }

        out.doc_ids.clear();
        out.doc_ids.extend_from_slice(&data[4..4 + doc_ids_len]);
        out.tfs.clear();
        out.tfs
            .extend_from_slice(&data[4 + doc_ids_len..4 + doc_ids_len + tfs_len]);
        Ok(())
    }
}

/// Store each value as a full little-endian word.
pub fn pack_u64s(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn unpack_u64s(data: &[u8], out: &mut Vec<u64>) -> Result<()> {
    if data.len() % 8 != 0 {
        return Err(HarpoonError::Corrupt(
            "packed u64 array not word aligned".to_string(),
        ));
    }
    out.clear();
    out.reserve(data.len() / 8);
    for chunk in data.chunks_exact(8) {
        out.push(u64::from_le_bytes(chunk.try_into().unwrap()));
    }
    Ok(())
}
