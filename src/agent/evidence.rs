use std::collections::HashMap;

use crate::retrieval::{EvidenceKey, RetrievedChunk};

/// Chunks accumulated over one research run, unique by [`EvidenceKey`], in
/// first-seen order.
#[derive(Debug, Default)]
pub struct EvidenceSet {
    chunks: Vec<RetrievedChunk>,
    index: HashMap<EvidenceKey, usize>,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add chunks not already present. Returns how many were new.
    pub fn extend(&mut self, chunks: impl IntoIterator<Item = RetrievedChunk>) -> usize {
        let before = self.chunks.len();
        for chunk in chunks {
            let key = chunk.key();
            if self.index.contains_key(&key) {
                continue;
            }
            self.index.insert(key, self.chunks.len());
            self.chunks.push(chunk);
        }
        self.chunks.len() - before
    }

    pub fn get(&self, key: &EvidenceKey) -> Option<&RetrievedChunk> {
        self.index.get(key).map(|&i| &self.chunks[i])
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn as_slice(&self) -> &[RetrievedChunk] {
        &self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(uid: &str, range: &str, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            sutta_uid: uid.into(),
            title: uid.into(),
            nikaya: None,
            segment_range: range.into(),
            text: format!("{uid} {range}"),
            score,
        }
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut set = EvidenceSet::new();
        assert_eq!(set.extend(vec![chunk("mn1", "1", 0.9), chunk("mn1", "2", 0.8)]), 2);
        assert_eq!(set.extend(vec![chunk("mn1", "1", 0.99), chunk("mn2", "1", 0.7)]), 1);
        assert_eq!(set.len(), 3);

        // first occurrence wins
        let kept = set.get(&EvidenceKey::new("mn1", "1")).unwrap();
        assert_eq!(kept.score, 0.9);
    }

    #[test]
    fn same_sutta_different_range_is_distinct() {
        let mut set = EvidenceSet::new();
        set.extend(vec![chunk("sn12.1", "1.1", 0.5), chunk("sn12.1", "1.2", 0.5)]);
        assert!(set.get(&EvidenceKey::new("sn12.1", "1.2")).is_some());
        assert_eq!(set.as_slice().len(), 2);
    }

    #[test]
    fn duplicates_within_one_batch() {
        let mut set = EvidenceSet::new();
        assert_eq!(set.extend(vec![chunk("dn22", "3", 0.4), chunk("dn22", "3", 0.4)]), 1);
        assert!(!set.is_empty());
    }
}
