//! Append-only commit log for replace-strategy buckets
//!
//! Every put and tombstone is durably recorded before it touches the
//! memtable. On bucket open the log is replayed through a deduplication
//! cache so that a long run of updates to one key costs O(N) instead of
//! repeated memtable re-sorts.

mod node;
mod parser;
mod writer;

pub use node::ReplaceNode;
pub use parser::{CommitLogParser, ReplayTarget};
pub use writer::CommitLogWriter;

/// Record version emitted by the writer. Version 0 records (no checksum)
/// are still accepted on replay.
pub const COMMIT_VERSION: u8 = 1;

/// Commit record kind. A replace bucket only ever accepts `Replace`;
/// anything else in its log is a hard error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CommitType {
    Replace = 0,
    Collection = 1,
}

impl CommitType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CommitType::Replace),
            1 => Some(CommitType::Collection),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitType::Replace => "replace",
            CommitType::Collection => "collection",
        }
    }
}

impl std::fmt::Display for CommitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_type_roundtrip() {
        assert_eq!(CommitType::from_u8(0), Some(CommitType::Replace));
        assert_eq!(CommitType::from_u8(1), Some(CommitType::Collection));
        assert_eq!(CommitType::from_u8(9), None);
        assert_eq!(CommitType::Replace.to_string(), "replace");
    }
}
