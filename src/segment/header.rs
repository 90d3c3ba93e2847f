//! Segment file header
//!
//! `u16 level | u16 version | u16 secondary_indices | u16 strategy |
//!  u64 index_start`, 16 bytes little endian.

use crate::error::{HarpoonError, Result};

use super::SEGMENT_VERSION;

pub const HEADER_SIZE: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum SegmentStrategy {
    Replace = 0,
    Inverted = 1,
}

impl SegmentStrategy {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(SegmentStrategy::Replace),
            1 => Some(SegmentStrategy::Inverted),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentHeader {
    pub level: u16,
    pub version: u16,
    pub secondary_indices: u16,
    pub strategy: SegmentStrategy,
    /// Byte offset of the secondary-index region
    pub index_start: u64,
}

impl SegmentHeader {
    pub fn new(level: u16, secondary_indices: u16, strategy: SegmentStrategy) -> Self {
        Self {
            level,
            version: SEGMENT_VERSION,
            secondary_indices,
            strategy,
            index_start: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&self.level.to_le_bytes());
        out[2..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..6].copy_from_slice(&self.secondary_indices.to_le_bytes());
        out[6..8].copy_from_slice(&(self.strategy as u16).to_le_bytes());
        out[8..16].copy_from_slice(&self.index_start.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(HarpoonError::Corrupt("segment header too short".to_string()));
        }

        let version = u16::from_le_bytes(data[2..4].try_into().unwrap());
        if version != SEGMENT_VERSION {
            return Err(HarpoonError::UnsupportedVersion(version as u8));
        }

        let raw_strategy = u16::from_le_bytes(data[6..8].try_into().unwrap());
        let strategy = SegmentStrategy::from_u16(raw_strategy)
            .ok_or_else(|| HarpoonError::Corrupt(format!("unknown strategy {raw_strategy}")))?;

        Ok(Self {
            level: u16::from_le_bytes(data[0..2].try_into().unwrap()),
            version,
            secondary_indices: u16::from_le_bytes(data[4..6].try_into().unwrap()),
            strategy,
            index_start: u64::from_le_bytes(data[8..16].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = SegmentHeader::new(2, 1, SegmentStrategy::Inverted);
        header.index_start = 12345;

        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);

        let decoded = SegmentHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut header = SegmentHeader::new(0, 0, SegmentStrategy::Inverted);
        header.version = 9;
        let err = SegmentHeader::decode(&header.encode()).unwrap_err();
        assert!(matches!(err, HarpoonError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let header = SegmentHeader::new(0, 0, SegmentStrategy::Inverted);
        let mut encoded = header.encode();
        encoded[6] = 0xee;
        let err = SegmentHeader::decode(&encoded).unwrap_err();
        assert!(err.is_corruption());
    }
}
