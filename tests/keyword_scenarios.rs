//! End-to-end ranking scenarios

use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use harpoon::metrics::{BlockMetrics, MetricsObserver};
use harpoon::search::{Detector, FixedLengthTracker, Tokenization};
use harpoon::{
    AllowList, Bm25Searcher, BucketOptions, CancelToken, PropertySchema, Schema, SearchConfig,
};

fn word_schema(properties: &[&str]) -> Schema {
    let mut schema = Schema::new();
    for name in properties {
        schema = schema.with_property(name, PropertySchema::text(Tokenization::Word));
    }
    schema
}

fn open_searcher(dir: &std::path::Path, properties: &[&str]) -> Bm25Searcher {
    Bm25Searcher::open(dir, word_schema(properties), SearchConfig::default())
        .unwrap()
        .with_bucket_options(BucketOptions {
            sync_writes: false,
            ..Default::default()
        })
        .with_stopwords(Arc::new(Detector::from_terms(&["the"])))
}

/// The three-document corpus used by the ranking scenarios.
fn index_corpus(engine: &Bm25Searcher) {
    engine.index_text(1, "body", "the quick brown fox").unwrap();
    engine.index_text(2, "body", "quick brown").unwrap();
    engine.index_text(3, "body", "the lazy fox").unwrap();
}

#[test]
fn single_property_ranking() {
    // S1: D1 matches both query terms and must lead strictly
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"])
        .with_tracker(Arc::new(FixedLengthTracker::new(&[("body", 5.0)])));
    index_corpus(&engine);

    let (ids, scores) = engine
        .search("quick fox", &["body"], 3, None, &CancelToken::new())
        .unwrap();

    assert_eq!(ids, vec![1, 2, 3]);
    assert!(scores[0] > scores[1]);
    assert!(scores[0] > scores[2]);
}

#[test]
fn ranking_is_identical_on_disk_and_in_memory() {
    // the same corpus must rank the same before and after a flush
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"])
        .with_tracker(Arc::new(FixedLengthTracker::new(&[("body", 5.0)])));
    index_corpus(&engine);

    let before = engine
        .search("quick fox", &["body"], 3, None, &CancelToken::new())
        .unwrap();
    engine.flush().unwrap();
    let after = engine
        .search("quick fox", &["body"], 3, None, &CancelToken::new())
        .unwrap();

    assert_eq!(before.0, after.0);
    for (a, b) in before.1.iter().zip(after.1.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn stopword_filtering() {
    // S2: "the" is dropped from the query, so "the fox" ranks exactly
    // like "fox"
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"])
        .with_tracker(Arc::new(FixedLengthTracker::new(&[("body", 5.0)])));
    index_corpus(&engine);

    let (with_stopword, _) = engine
        .search("the fox", &["body"], 3, None, &CancelToken::new())
        .unwrap();
    let (alone, _) = engine
        .search("fox", &["body"], 3, None, &CancelToken::new())
        .unwrap();

    assert_eq!(with_stopword, alone);
    let mut sorted = with_stopword.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 3]);
}

#[test]
fn only_stopwords_query_is_empty() {
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"]);
    index_corpus(&engine);

    let (ids, scores) = engine
        .search("the", &["body"], 3, None, &CancelToken::new())
        .unwrap();
    assert!(ids.is_empty());
    assert!(scores.is_empty());
}

#[test]
fn update_then_delete_leaves_doc_gone() {
    // S4 at the engine level: two updates then a tombstone
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"]);

    engine.index_text(1, "body", "fox").unwrap();
    engine.index_text(1, "body", "fox fox fox").unwrap();
    engine.tombstone(1).unwrap();

    let (ids, _) = engine
        .search("fox", &["body"], 10, None, &CancelToken::new())
        .unwrap();
    assert!(ids.is_empty());
}

#[derive(Default)]
struct CapturingObserver {
    last: Mutex<Option<BlockMetrics>>,
}

impl MetricsObserver for CapturingObserver {
    fn observe(&self, metrics: &BlockMetrics) {
        *self.last.lock().unwrap() = Some(*metrics);
    }
}

#[test]
fn low_impact_blocks_are_skipped_on_disk() {
    // S5: a block whose impact bound cannot reach the threshold is
    // skipped without decoding any of its documents
    let tmp = TempDir::new().unwrap();
    let observer = Arc::new(CapturingObserver::default());
    let engine = open_searcher(tmp.path(), &["body"]).with_observer(observer.clone());

    // block 0: high impact, blocks 1-2: low, block 3: high
    for i in 0..128u64 {
        engine.write(i, "body", "fox", 50, 4).unwrap();
    }
    for i in 0..256u64 {
        engine.write(1000 + i, "body", "fox", 1, 4).unwrap();
    }
    for i in 0..128u64 {
        engine.write(3000 + i, "body", "fox", 50, 4).unwrap();
    }
    engine.flush().unwrap();

    let (ids, _) = engine
        .search("fox", &["body"], 128, None, &CancelToken::new())
        .unwrap();

    assert_eq!(ids.len(), 128);
    assert!(ids.iter().all(|&id| id < 128 || id >= 3000));

    let metrics = observer.last.lock().unwrap().expect("observer fed");
    assert_eq!(metrics.block_count_total, 4);
    assert_eq!(metrics.block_count_examined, 2);
    assert_eq!(metrics.doc_count_examined, 256);
}

#[test]
fn multi_property_tie_breaks_by_doc_id_descending() {
    // S6: identical summed scores rank the higher doc id first
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body", "title"]).with_tracker(Arc::new(
        FixedLengthTracker::new(&[("body", 1.0), ("title", 1.0)]),
    ));

    engine.index_text(10, "body", "fox").unwrap();
    engine.index_text(20, "title", "fox").unwrap();

    let (ids, scores) = engine
        .search("fox", &["body", "title"], 2, None, &CancelToken::new())
        .unwrap();

    assert_eq!(scores[0], scores[1]);
    assert_eq!(ids, vec![20, 10]);
}

#[test]
fn zero_limit_means_unbounded() {
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"]);
    index_corpus(&engine);

    let (ids, _) = engine
        .search("quick fox brown lazy", &["body"], 0, None, &CancelToken::new())
        .unwrap();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3]);
}

#[test]
fn allow_list_restricts_candidates() {
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"]);
    index_corpus(&engine);

    let allow: AllowList = [2u64, 3].into_iter().collect();
    let (ids, _) = engine
        .search("quick fox", &["body"], 3, Some(&allow), &CancelToken::new())
        .unwrap();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![2, 3]);
}

#[test]
fn property_boost_scales_scores() {
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"]);
    engine.index_text(1, "body", "fox").unwrap();

    let (_, plain) = engine
        .search("fox", &["body"], 1, None, &CancelToken::new())
        .unwrap();
    let (_, boosted) = engine
        .search("fox", &["body^2"], 1, None, &CancelToken::new())
        .unwrap();

    assert!((boosted[0] - plain[0] * 2.0).abs() < 1e-5);
}

#[test]
fn cancelled_search_returns_no_partial_results() {
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"]);
    index_corpus(&engine);

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = engine
        .search("quick fox", &["body"], 3, None, &cancel)
        .unwrap_err();
    assert!(matches!(err, harpoon::HarpoonError::Cancelled));
}

#[test]
fn duplicate_query_terms_boost_scores() {
    let tmp = TempDir::new().unwrap();
    let engine = open_searcher(tmp.path(), &["body"]);
    engine.index_text(1, "body", "fox").unwrap();

    let (_, single) = engine
        .search("fox", &["body"], 1, None, &CancelToken::new())
        .unwrap();
    let (_, doubled) = engine
        .search("fox fox", &["body"], 1, None, &CancelToken::new())
        .unwrap();

    assert!((doubled[0] - single[0] * 2.0).abs() < 1e-5);
}
