//! Ordered key walk over a segment, used by the compactor
//!
//! The key and value buffers are reused between advances; any caller that
//! keeps bytes across a `next()` must copy them first.

use crate::error::Result;

use super::node::{decode_posting, parse_term_record};
use super::segment::Segment;

pub struct SegmentCursor<'a> {
    segment: &'a Segment,
    idx: usize,
    positioned: bool,
    key_buf: Vec<u8>,
    values_buf: Vec<(u64, u64)>,
}

impl<'a> SegmentCursor<'a> {
    pub fn new(segment: &'a Segment) -> Self {
        Self {
            segment,
            idx: 0,
            positioned: false,
            key_buf: Vec::new(),
            values_buf: Vec::new(),
        }
    }

    /// Position on the first key. Returns false for an empty segment.
    pub fn first(&mut self) -> Result<bool> {
        self.idx = 0;
        self.load()
    }

    /// Advance to the next key in order.
    pub fn next(&mut self) -> Result<bool> {
        if self.positioned {
            self.idx += 1;
        }
        self.load()
    }

    /// Current key. Only valid until the next advance.
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.positioned);
        &self.key_buf
    }

    /// Current posting as decoded `(doc_id, packed_tf)` pairs. Only valid
    /// until the next advance.
    pub fn values(&self) -> &[(u64, u64)] {
        debug_assert!(self.positioned);
        &self.values_buf
    }

    fn load(&mut self) -> Result<bool> {
        let index = self.segment.index();
        if self.idx >= index.len() {
            self.positioned = false;
            return Ok(false);
        }

        let entry = index.entry(self.idx);
        let record = parse_term_record(self.segment.data(), entry.offset as usize)?;

        self.key_buf.clear();
        self.key_buf.extend_from_slice(record.key(self.segment.data()));
        decode_posting(self.segment.data(), &record, &mut self.values_buf)?;

        self.positioned = true;
        Ok(true)
    }
}
