//! Replace-node payload codec
//!
//! Node layout (little endian):
//! `u8 tombstone | u32 key_len | key | u64 value_len | value |
//!  { u32 len | bytes } * secondary_indices`

use crate::error::{HarpoonError, Result};

/// A single replace-strategy entry: a key either carries a value or is
/// tombstoned. Inverted buckets compose their keys as
/// `term bytes ++ doc_id (8B big endian)` for puts and a bare 8-byte
/// doc id for document tombstones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplaceNode {
    pub tombstone: bool,
    pub primary_key: Vec<u8>,
    pub value: Vec<u8>,
    pub secondary_keys: Vec<Vec<u8>>,
}

impl ReplaceNode {
    pub fn put(primary_key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            tombstone: false,
            primary_key,
            value,
            secondary_keys: Vec::new(),
        }
    }

    pub fn tombstone(primary_key: Vec<u8>) -> Self {
        Self {
            tombstone: true,
            primary_key,
            value: Vec::new(),
            secondary_keys: Vec::new(),
        }
    }

    /// Posting insertion for an inverted bucket: key is the term plus the
    /// doc id, value packs `tf` and `field_len` into 8 bytes.
    pub fn inverted_put(term: &[u8], doc_id: u64, tf: u32, field_len: u32) -> Self {
        let mut key = Vec::with_capacity(term.len() + 8);
        key.extend_from_slice(term);
        key.extend_from_slice(&doc_id.to_be_bytes());

        let packed = (tf as u64) | ((field_len as u64) << 32);
        Self::put(key, packed.to_le_bytes().to_vec())
    }

    /// Document-level tombstone for an inverted bucket.
    pub fn inverted_tombstone(doc_id: u64) -> Self {
        Self::tombstone(doc_id.to_be_bytes().to_vec())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 + self.primary_key.len() + 8 + self.value.len());
        out.push(self.tombstone as u8);
        out.extend_from_slice(&(self.primary_key.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.primary_key);
        out.extend_from_slice(&(self.value.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.value);
        for sec in &self.secondary_keys {
            out.extend_from_slice(&(sec.len() as u32).to_le_bytes());
            out.extend_from_slice(sec);
        }
        out
    }

    pub fn decode(data: &[u8], secondary_indices: u16) -> Result<Self> {
        let mut pos = 0usize;

        let tombstone = match read_u8(data, &mut pos)? {
            0 => false,
            1 => true,
            other => {
                return Err(HarpoonError::Corrupt(format!(
                    "invalid tombstone flag {other}"
                )))
            }
        };

        let key_len = read_u32(data, &mut pos)? as usize;
        let primary_key = read_bytes(data, &mut pos, key_len)?.to_vec();

        let value_len = read_u64(data, &mut pos)? as usize;
        let value = read_bytes(data, &mut pos, value_len)?.to_vec();

        let mut secondary_keys = Vec::with_capacity(secondary_indices as usize);
        for _ in 0..secondary_indices {
            let len = read_u32(data, &mut pos)? as usize;
            secondary_keys.push(read_bytes(data, &mut pos, len)?.to_vec());
        }

        Ok(Self {
            tombstone,
            primary_key,
            value,
            secondary_keys,
        })
    }
}

fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8> {
    let b = *data
        .get(*pos)
        .ok_or_else(|| HarpoonError::Corrupt("truncated replace node".to_string()))?;
    *pos += 1;
    Ok(b)
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes = read_bytes(data, pos, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u64(data: &[u8], pos: &mut usize) -> Result<u64> {
    let bytes = read_bytes(data, pos, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_bytes<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| HarpoonError::Corrupt("truncated replace node".to_string()))?;
    let out = &data[*pos..end];
    *pos = end;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_put() {
        let node = ReplaceNode::put(b"apple".to_vec(), vec![1, 2, 3, 4]);
        let decoded = ReplaceNode::decode(&node.encode(), 0).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_roundtrip_tombstone() {
        let node = ReplaceNode::tombstone(b"apple".to_vec());
        let decoded = ReplaceNode::decode(&node.encode(), 0).unwrap();
        assert!(decoded.tombstone);
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn test_roundtrip_secondary_keys() {
        let mut node = ReplaceNode::put(b"k".to_vec(), b"v".to_vec());
        node.secondary_keys = vec![b"sec0".to_vec(), b"sec1".to_vec()];
        let decoded = ReplaceNode::decode(&node.encode(), 2).unwrap();
        assert_eq!(decoded.secondary_keys, node.secondary_keys);
    }

    #[test]
    fn test_inverted_put_packing() {
        let node = ReplaceNode::inverted_put(b"fox", 42, 3, 17);
        assert_eq!(&node.primary_key[..3], b"fox");
        assert_eq!(node.primary_key[3..], 42u64.to_be_bytes());

        let packed = u64::from_le_bytes(node.value.as_slice().try_into().unwrap());
        assert_eq!(packed as u32, 3);
        assert_eq!((packed >> 32) as u32, 17);
    }

    #[test]
    fn test_truncated_node() {
        let node = ReplaceNode::put(b"apple".to_vec(), vec![9; 16]);
        let encoded = node.encode();
        let err = ReplaceNode::decode(&encoded[..encoded.len() - 1], 0).unwrap_err();
        assert!(err.is_corruption());
    }
}
