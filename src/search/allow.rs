//! Doc-id allow list
//!
//! Passed by the caller to restrict scoring to a filtered candidate set.
//! `None` at the API level means unfiltered; an empty allow list matches
//! nothing.

use roaring::RoaringTreemap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllowList {
    docs: RoaringTreemap,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc_id: u64) {
        self.docs.insert(doc_id);
    }

    pub fn remove(&mut self, doc_id: u64) {
        self.docs.remove(doc_id);
    }

    pub fn contains(&self, doc_id: u64) -> bool {
        self.docs.contains(doc_id)
    }

    pub fn len(&self) -> u64 {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn intersect(&self, other: &AllowList) -> AllowList {
        AllowList {
            docs: &self.docs & &other.docs,
        }
    }
}

impl FromIterator<u64> for AllowList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            docs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let allow: AllowList = [1u64, 5, 9].into_iter().collect();
        assert!(allow.contains(5));
        assert!(!allow.contains(2));
        assert_eq!(allow.len(), 3);
    }

    #[test]
    fn test_intersect() {
        let a: AllowList = [1u64, 2, 3].into_iter().collect();
        let b: AllowList = [2u64, 3, 4].into_iter().collect();
        let both = a.intersect(&b);
        assert_eq!(both, [2u64, 3].into_iter().collect());
    }
}
