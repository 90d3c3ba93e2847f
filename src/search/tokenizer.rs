//! Query and document tokenization
//!
//! Four modes, matching the property configuration: `word` splits on
//! unicode word boundaries and lowercases, `lowercase` splits on
//! whitespace and lowercases, `whitespace` splits on whitespace verbatim
//! and `field` treats the trimmed value as a single term.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tokenization {
    Word,
    Lowercase,
    Whitespace,
    Field,
}

impl Tokenization {
    pub const ALL: [Tokenization; 4] = [
        Tokenization::Word,
        Tokenization::Lowercase,
        Tokenization::Whitespace,
        Tokenization::Field,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tokenization::Word => "word",
            Tokenization::Lowercase => "lowercase",
            Tokenization::Whitespace => "whitespace",
            Tokenization::Field => "field",
        }
    }
}

pub fn tokenize(mode: Tokenization, text: &str) -> Vec<String> {
    match mode {
        Tokenization::Word => text
            .unicode_words()
            .map(|word| word.to_lowercase())
            .collect(),
        Tokenization::Lowercase => text
            .split_whitespace()
            .map(|word| word.to_lowercase())
            .collect(),
        Tokenization::Whitespace => text.split_whitespace().map(str::to_string).collect(),
        Tokenization::Field => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            }
        }
    }
}

/// Tokenize and collapse duplicates, keeping first-seen order. The count
/// per unique term becomes its duplicate boost at scoring time.
pub fn tokenize_and_count_duplicates(mode: Tokenization, text: &str) -> (Vec<String>, Vec<u32>) {
    let mut terms: Vec<String> = Vec::new();
    let mut counts: Vec<u32> = Vec::new();

    for token in tokenize(mode, text) {
        match terms.iter().position(|t| *t == token) {
            Some(i) => counts[i] += 1,
            None => {
                terms.push(token);
                counts.push(1);
            }
        }
    }

    (terms, counts)
}
