//! Commit-log writer
//!
//! Record format (version 1):
//! `u8 version | u8 commit_type | u32 node_len | node | u32 crc32`
//! where the checksum covers version, commit type, node length and node.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use parking_lot::Mutex;

use super::node::ReplaceNode;
use super::{CommitType, COMMIT_VERSION};
use crate::error::Result;

pub struct CommitLogWriter {
    path: PathBuf,
    file: Mutex<File>,
    sync_writes: bool,
}

impl CommitLogWriter {
    pub fn open(path: impl AsRef<Path>, sync_writes: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            sync_writes,
        })
    }

    /// Append one replace node as a v1 record.
    pub fn append(&self, node: &ReplaceNode) -> Result<()> {
        use std::io::Write;

        let payload = node.encode();

        let mut record = Vec::with_capacity(1 + 1 + 4 + payload.len() + 4);
        record.push(COMMIT_VERSION);
        record.push(CommitType::Replace as u8);
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);

        let mut hasher = Hasher::new();
        hasher.update(&record);
        record.extend_from_slice(&hasher.finalize().to_le_bytes());

        let mut file = self.file.lock();
        file.write_all(&record)?;
        if self.sync_writes {
            file.sync_data()?;
        }

        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the log on disk.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
