//! BM25 scoring functions
//!
//! `score = boost * dup_boost * idf * (tf * (k1+1)) / (tf + k1 * norm)`
//! with `norm = 1 - b + b * field_len / avg_len`. A missing average length
//! degenerates to `norm = 1 - b`, which keeps scores deterministic.

use crate::config::Bm25Params;

/// Robertson-Sparck-Jones inverse document frequency.
///
/// `n` is the collection size, `df` the number of documents containing the
/// term in the scored property.
pub fn idf(df: f64, n: f64) -> f32 {
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln() as f32
}

/// Term-frequency component of the BM25 score.
pub fn tf_score(tf: f32, field_len: f32, avg_len: f32, params: &Bm25Params) -> f32 {
    let norm = if avg_len > 0.0 {
        1.0 - params.b + params.b * (field_len / avg_len)
    } else {
        1.0 - params.b
    };
    (tf * (params.k1 + 1.0)) / (tf + params.k1 * norm)
}

/// Upper bound of [`tf_score`] over every possible field and average
/// length. The normalization term is smallest (and the score largest) as
/// `field_len / avg_len` approaches zero, so the bound is reached at
/// `norm = 1 - b`. Monotonically increasing in `tf`, which makes the
/// per-block maximum term frequency sufficient to bound a whole block.
pub fn tf_score_bound(tf: f32, params: &Bm25Params) -> f32 {
    (tf * (params.k1 + 1.0)) / (tf + params.k1 * (1.0 - params.b))
}
