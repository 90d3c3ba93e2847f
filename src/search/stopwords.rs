//! Stopword detection
//!
//! Only consulted for `word` tokenization. The default preset is the
//! English list with per-collection additions and removals layered on
//! top.

use std::collections::HashSet;

/// Decides whether a query term should be dropped before scoring.
pub trait StopwordDetector: Send + Sync {
    fn is_stopword(&self, term: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopwordPreset {
    #[default]
    English,
    None,
}

pub struct Detector {
    stopwords: HashSet<String>,
}

impl Detector {
    pub fn new(preset: StopwordPreset, additions: &[&str], removals: &[&str]) -> Self {
        let mut stopwords: HashSet<String> = match preset {
            StopwordPreset::English => stop_words::get(stop_words::LANGUAGE::English)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
            StopwordPreset::None => HashSet::new(),
        };

        for term in additions {
            stopwords.insert(term.to_lowercase());
        }
        for term in removals {
            stopwords.remove(&term.to_lowercase());
        }

        Self { stopwords }
    }

    /// A detector backed by an explicit set, mostly for tests.
    pub fn from_terms(terms: &[&str]) -> Self {
        Self::new(StopwordPreset::None, terms, &[])
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(StopwordPreset::default(), &[], &[])
    }
}

impl StopwordDetector for Detector {
    fn is_stopword(&self, term: &str) -> bool {
        self.stopwords.contains(term)
    }
}

/// Drop stopword terms and their duplicate counts in lockstep.
pub fn remove_stopwords(
    terms: Vec<String>,
    counts: Vec<u32>,
    detector: &dyn StopwordDetector,
) -> (Vec<String>, Vec<u32>) {
    let mut kept_terms = Vec::with_capacity(terms.len());
    let mut kept_counts = Vec::with_capacity(counts.len());

    for (term, count) in terms.into_iter().zip(counts) {
        if !detector.is_stopword(&term) {
            kept_terms.push(term);
            kept_counts.push(count);
        }
    }

    (kept_terms, kept_counts)
}
