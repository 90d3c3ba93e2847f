//! BM25 top-k keyword search
//!
//! Tokenization, stopword handling, scoring math, term cursors and the
//! block-max WAND loop, orchestrated per property by [`Bm25Searcher`].

mod allow;
mod cancel;
mod queue;
mod schema;
pub mod scoring;
mod searcher;
mod stopwords;
mod terms;
mod tokenizer;
mod tracker;
mod wand;

pub use allow::AllowList;
pub use cancel::CancelToken;
pub use queue::{ScoredDoc, TopKHeap};
pub use schema::{DataType, PropertySchema, Schema};
pub use searcher::Bm25Searcher;
pub use stopwords::{remove_stopwords, Detector, StopwordDetector, StopwordPreset};
pub use terms::{TermCursor, UnifiedTerm};
pub use tokenizer::{tokenize, tokenize_and_count_duplicates, Tokenization};
pub use tracker::{FixedLengthTracker, LengthTracker, PropertyLengthTracker};
pub use wand::block_max_wand;
