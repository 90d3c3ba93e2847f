//! Memory-mapped immutable segment

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use memmap2::Mmap;
use roaring::RoaringTreemap;

use crate::error::{HarpoonError, Result};

use super::header::{SegmentHeader, SegmentStrategy, HEADER_SIZE};
use super::index::DiskIndex;
use super::node::{parse_term_record, TermRecord};
use super::{DEFAULT_KEY_LENGTH, DEFAULT_VALUE_LENGTH};

/// Offset of the keys region: header, default key/value lengths and the
/// keys-region length field.
pub(crate) const KEYS_START: usize = HEADER_SIZE + 2 + 2 + 8;

pub struct Segment {
    id: u64,
    path: PathBuf,
    mmap: Mmap,
    header: SegmentHeader,
    keys_len: u64,
    index: DiskIndex,
    tombstones: RoaringTreemap,
    /// Set once a compaction superseding this segment is durable; the
    /// file is removed when the last reference drops.
    obsolete: AtomicBool,
}

impl Segment {
    pub fn open(path: impl AsRef<Path>, id: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // Safety: segment files are immutable once published; writers only
        // ever produce them under a temporary name and rename.
        let mmap = unsafe { Mmap::map(&file)? };
        let data: &[u8] = &mmap;

        let header = SegmentHeader::decode(data)?;
        if header.strategy != SegmentStrategy::Inverted {
            return Err(HarpoonError::Corrupt(format!(
                "expected inverted segment, found strategy {:?}",
                header.strategy
            )));
        }

        if data.len() < KEYS_START {
            return Err(HarpoonError::Corrupt("segment preamble truncated".to_string()));
        }

        let key_len = u16::from_le_bytes(data[16..18].try_into().unwrap());
        let value_len = u16::from_le_bytes(data[18..20].try_into().unwrap());
        if key_len != DEFAULT_KEY_LENGTH || value_len != DEFAULT_VALUE_LENGTH {
            return Err(HarpoonError::Corrupt(format!(
                "unexpected key/value lengths {key_len}/{value_len}"
            )));
        }

        let keys_len = u64::from_le_bytes(data[20..28].try_into().unwrap());

        let tombstone_len_at = KEYS_START + keys_len as usize;
        if tombstone_len_at + 8 > data.len() {
            return Err(HarpoonError::Corrupt("tombstone region truncated".to_string()));
        }
        let tombstone_len =
            u64::from_le_bytes(data[tombstone_len_at..tombstone_len_at + 8].try_into().unwrap())
                as usize;
        let tombstone_end = tombstone_len_at + 8 + tombstone_len;
        if tombstone_end > data.len() {
            return Err(HarpoonError::Corrupt("tombstone bitmap truncated".to_string()));
        }

        let tombstones = if tombstone_len == 0 {
            RoaringTreemap::new()
        } else {
            RoaringTreemap::deserialize_from(&data[tombstone_len_at + 8..tombstone_end])
                .map_err(|e| HarpoonError::Corrupt(format!("tombstone bitmap: {e}")))?
        };

        let index_start = header.index_start as usize;
        if index_start != tombstone_end || index_start > data.len() {
            return Err(HarpoonError::Corrupt(format!(
                "index start {index_start} does not match data end {tombstone_end}"
            )));
        }
        let index = DiskIndex::decode(&data[index_start..])?;

        Ok(Self {
            id,
            path,
            mmap,
            header,
            keys_len,
            index,
            tombstones,
            obsolete: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> u16 {
        self.header.level
    }

    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    pub fn keys_len(&self) -> u64 {
        self.keys_len
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    pub fn index(&self) -> &DiskIndex {
        &self.index
    }

    pub fn tombstones(&self) -> &RoaringTreemap {
        &self.tombstones
    }

    pub fn has_tombstone(&self, doc_id: u64) -> bool {
        self.tombstones.contains(doc_id)
    }

    /// Locate a term via the secondary index and parse its record.
    pub fn find(&self, term: &[u8]) -> Result<Option<TermRecord>> {
        match self.index.get(term) {
            Some(offset) => Ok(Some(parse_term_record(self.data(), offset as usize)?)),
            None => Ok(None),
        }
    }

    /// Document frequency of the term within this segment.
    pub fn count(&self, term: &[u8]) -> Result<u64> {
        Ok(self.find(term)?.map(|r| r.count).unwrap_or(0))
    }

    pub fn term_count(&self) -> usize {
        self.index.len()
    }

    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if self.obsolete.load(Ordering::Acquire) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove obsolete segment");
            }
        }
    }
}
