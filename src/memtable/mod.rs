//! In-memory mutable term map
//!
//! A key-ordered map of `term -> postings` plus a bitmap of tombstoned
//! doc ids. Writers append under the bucket's exclusive write lock; a
//! flush detaches the whole memtable and serializes it into a new
//! level-0 segment.

mod flush;

pub use flush::flush_memtable;

use std::collections::BTreeMap;

use roaring::RoaringTreemap;

use crate::commitlog::{ReplaceNode, ReplayTarget};
use crate::segment::unpack_value;

/// One posting entry as held in memory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemValue {
    pub doc_id: u64,
    pub tf: u32,
    pub field_len: u32,
    pub tombstone: bool,
}

#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, Vec<MemValue>>,
    tombstones: RoaringTreemap,
    size_bytes: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a posting entry for `term`.
    pub fn put(&mut self, term: &[u8], doc_id: u64, tf: u32, field_len: u32) {
        self.append(
            term,
            MemValue {
                doc_id,
                tf,
                field_len,
                tombstone: false,
            },
        );
    }

    /// Record the deletion of a document, independent of any term.
    pub fn set_tombstone(&mut self, doc_id: u64) {
        if self.tombstones.insert(doc_id) {
            self.size_bytes += 8;
        }
    }

    /// Record the deletion of a single `(term, doc)` posting.
    pub fn set_entry_tombstone(&mut self, term: &[u8], doc_id: u64) {
        self.append(
            term,
            MemValue {
                doc_id,
                tf: 0,
                field_len: 0,
                tombstone: true,
            },
        );
    }

    fn append(&mut self, term: &[u8], value: MemValue) {
        self.size_bytes += std::mem::size_of::<MemValue>();
        match self.map.get_mut(term) {
            Some(values) => values.push(value),
            None => {
                self.size_bytes += term.len();
                self.map.insert(term.to_vec(), vec![value]);
            }
        }
    }

    /// All terms with their raw value lists, in key order.
    pub fn flatten_in_order(&self) -> impl Iterator<Item = (&[u8], &[MemValue])> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Doc-id-sorted live posting for one term, duplicates collapsed with
    /// the latest write winning and tombstoned entries dropped. Entry
    /// tombstones surface through [`Memtable::tombstoned_docs`] instead.
    pub fn posting(&self, term: &[u8]) -> Option<Vec<MemValue>> {
        let values = self.map.get(term)?;
        let collapsed = collapse(values);
        if collapsed.is_empty() {
            None
        } else {
            Some(collapsed)
        }
    }

    /// Every tombstoned doc id: document-level tombstones plus the doc ids
    /// of tombstoned entries under any term.
    pub fn tombstoned_docs(&self) -> RoaringTreemap {
        let mut out = self.tombstones.clone();
        for values in self.map.values() {
            for value in values {
                if value.tombstone {
                    out.insert(value.doc_id);
                }
            }
        }
        out
    }

    pub fn term_count(&self) -> usize {
        self.map.len()
    }

    /// Estimated heap footprint, compared against the flush threshold.
    pub fn size(&self) -> usize {
        self.size_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty() && self.tombstones.is_empty()
    }
}

/// Collapse duplicate doc ids (latest write wins) and drop tombstoned
/// entries, returning the posting sorted by doc id.
pub(crate) fn collapse(values: &[MemValue]) -> Vec<MemValue> {
    let mut sorted: Vec<(usize, MemValue)> = values.iter().copied().enumerate().collect();
    // stable order by doc id, then insertion order: the last entry per
    // doc id is the authoritative one
    sorted.sort_by_key(|(i, v)| (v.doc_id, *i));

    let mut out: Vec<MemValue> = Vec::with_capacity(sorted.len());
    for (_, value) in sorted {
        match out.last_mut() {
            Some(last) if last.doc_id == value.doc_id => *last = value,
            _ => out.push(value),
        }
    }
    out.retain(|v| !v.tombstone);
    out
}

impl ReplayTarget for Memtable {
    fn replay_put(&mut self, node: &ReplaceNode) {
        let Some((term, doc_id)) = split_inverted_key(&node.primary_key) else {
            tracing::warn!("skipping replayed put with malformed key");
            return;
        };
        let Ok(packed) = <[u8; 8]>::try_from(node.value.as_slice()) else {
            tracing::warn!("skipping replayed put with malformed value");
            return;
        };
        let (tf, field_len) = unpack_value(u64::from_le_bytes(packed));
        self.put(term, doc_id, tf, field_len);
    }

    fn replay_tombstone(&mut self, node: &ReplaceNode) {
        if node.primary_key.len() == 8 {
            let doc_id = u64::from_be_bytes(node.primary_key.as_slice().try_into().unwrap());
            self.set_tombstone(doc_id);
        } else if let Some((term, doc_id)) = split_inverted_key(&node.primary_key) {
            self.set_entry_tombstone(term, doc_id);
        } else {
            tracing::warn!("skipping replayed tombstone with malformed key");
        }
    }
}

/// Split `term bytes ++ doc_id (8B BE)`.
fn split_inverted_key(key: &[u8]) -> Option<(&[u8], u64)> {
    if key.len() <= 8 {
        return None;
    }
    let (term, id_bytes) = key.split_at(key.len() - 8);
    Some((term, u64::from_be_bytes(id_bytes.try_into().unwrap())))
}
