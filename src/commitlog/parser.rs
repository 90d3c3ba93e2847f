//! Commit-log replay
//!
//! Parses all records into a deduplication cache first and only imports
//! unique entries into the replay target as a final step. Routing every
//! record through the memtable directly would be quadratic in re-sort
//! costs for logs with many updates to the same key.

use std::collections::HashMap;
use std::path::Path;

use crc32fast::Hasher;

use super::node::ReplaceNode;
use super::CommitType;
use crate::error::{HarpoonError, Result};

/// Consumer of the drained deduplication cache.
pub trait ReplayTarget {
    fn replay_put(&mut self, node: &ReplaceNode);
    fn replay_tombstone(&mut self, node: &ReplaceNode);
}

pub struct CommitLogParser {
    data: Vec<u8>,
    secondary_indices: u16,
}

impl CommitLogParser {
    pub fn open(path: impl AsRef<Path>, secondary_indices: u16) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self {
            data,
            secondary_indices,
        })
    }

    pub fn from_bytes(data: Vec<u8>, secondary_indices: u16) -> Self {
        Self {
            data,
            secondary_indices,
        }
    }

    /// Replay the whole log into `target`. Clean EOF terminates the scan;
    /// any other failure aborts with the error and the caller discards the
    /// partially-filled target.
    pub fn replay(&self, target: &mut impl ReplayTarget) -> Result<()> {
        let mut cache: HashMap<Vec<u8>, ReplaceNode> = HashMap::new();
        let mut pos = 0usize;

        while pos < self.data.len() {
            let version = self.data[pos];
            match version {
                0 => self.parse_record_v0(&mut pos, &mut cache)?,
                1 => self.parse_record_v1(&mut pos, &mut cache)?,
                other => return Err(HarpoonError::UnsupportedVersion(other)),
            }
        }

        for node in cache.values() {
            if node.tombstone {
                target.replay_tombstone(node);
            } else {
                target.replay_put(node);
            }
        }

        Ok(())
    }

    fn parse_record_v0(
        &self,
        pos: &mut usize,
        cache: &mut HashMap<Vec<u8>, ReplaceNode>,
    ) -> Result<()> {
        *pos += 1; // version byte

        let commit_type = self.read_commit_type(pos)?;
        if commit_type != CommitType::Replace {
            return Err(HarpoonError::WrongCommitType {
                found: commit_type.to_string(),
                expected: CommitType::Replace.to_string(),
            });
        }

        // v0 has no length prefix; the node codec tells us how far it read
        // by decoding from the remaining bytes.
        let node = ReplaceNode::decode(&self.data[*pos..], self.secondary_indices)?;
        *pos += node.encode().len();

        Self::cache_node(cache, node);
        Ok(())
    }

    fn parse_record_v1(
        &self,
        pos: &mut usize,
        cache: &mut HashMap<Vec<u8>, ReplaceNode>,
    ) -> Result<()> {
        let record_start = *pos;
        *pos += 1; // version byte

        let commit_type = self.read_commit_type(pos)?;
        if commit_type != CommitType::Replace {
            return Err(HarpoonError::WrongCommitType {
                found: commit_type.to_string(),
                expected: CommitType::Replace.to_string(),
            });
        }

        let node_len = self.read_u32(pos)? as usize;
        let node_bytes = self.read_bytes(pos, node_len)?;
        let node_end = *pos;

        let stored = u32::from_le_bytes(self.read_bytes(pos, 4)?.try_into().unwrap());

        let mut hasher = Hasher::new();
        hasher.update(&self.data[record_start..node_end]);
        if hasher.finalize() != stored {
            return Err(HarpoonError::InvalidChecksum);
        }

        let node = ReplaceNode::decode(node_bytes, self.secondary_indices)?;
        Self::cache_node(cache, node);
        Ok(())
    }

    /// A put replaces whatever the cache holds. A tombstone flips the flag
    /// on the cached entry, creating one if the key was never seen.
    fn cache_node(cache: &mut HashMap<Vec<u8>, ReplaceNode>, node: ReplaceNode) {
        if !node.tombstone {
            cache.insert(node.primary_key.clone(), node);
        } else if let Some(existing) = cache.get_mut(&node.primary_key) {
            existing.tombstone = true;
        } else {
            cache.insert(node.primary_key.clone(), node);
        }
    }

    fn read_commit_type(&self, pos: &mut usize) -> Result<CommitType> {
        let raw = *self
            .data
            .get(*pos)
            .ok_or_else(|| HarpoonError::Corrupt("truncated commit record".to_string()))?;
        *pos += 1;
        CommitType::from_u8(raw).ok_or_else(|| HarpoonError::WrongCommitType {
            found: format!("unknown({raw})"),
            expected: CommitType::Replace.to_string(),
        })
    }

    fn read_u32(&self, pos: &mut usize) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_bytes(pos, 4)?.try_into().unwrap()))
    }

    fn read_bytes(&self, pos: &mut usize, len: usize) -> Result<&[u8]> {
        let end = pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| HarpoonError::Corrupt("truncated commit record".to_string()))?;
        let out = &self.data[*pos..end];
        *pos = end;
        Ok(out)
    }
}
