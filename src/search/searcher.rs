//! BM25 search engine over per-property buckets
//!
//! Owns one inverted bucket per searchable property, the length
//! statistics, the live-document set and the scoring pool. Writes go
//! through the bucket commit logs; queries tokenize per property
//! tokenization, build unified term cursors and run block-max WAND per
//! property on the worker pool.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringTreemap;

use crate::bucket::Bucket;
use crate::config::{BucketOptions, SearchConfig};
use crate::error::{HarpoonError, Result};
use crate::metrics::{BlockMetrics, MetricsObserver, NullObserver};
use crate::segment::BlockMaxCursor;

use super::allow::AllowList;
use super::cancel::CancelToken;
use super::schema::Schema;
use super::scoring;
use super::stopwords::{remove_stopwords, Detector, StopwordDetector};
use super::terms::{TermCursor, UnifiedTerm};
use super::tokenizer::{tokenize, tokenize_and_count_duplicates, Tokenization};
use super::tracker::{LengthTracker, PropertyLengthTracker};
use super::wand::block_max_wand;

pub struct Bm25Searcher {
    dir: PathBuf,
    config: SearchConfig,
    bucket_opts: BucketOptions,
    schema: Schema,
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
    tracker: Arc<dyn PropertyLengthTracker>,
    recorder: Option<Arc<LengthTracker>>,
    stopwords: Arc<dyn StopwordDetector>,
    observer: Arc<dyn MetricsObserver>,
    live_docs: RwLock<RoaringTreemap>,
    pool: rayon::ThreadPool,
}

/// Property reference with an optional `^boost` suffix parsed off.
fn parse_property_boost(raw: &str) -> (&str, f32) {
    match raw.split_once('^') {
        Some((name, boost)) => (name, boost.parse().unwrap_or(1.0)),
        None => (raw, 1.0),
    }
}

struct PropertyTask {
    terms: Vec<Box<dyn TermCursor>>,
}

impl Bm25Searcher {
    pub fn open(dir: impl AsRef<Path>, schema: Schema, config: SearchConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .build()
            .map_err(|e| HarpoonError::Internal(e.to_string()))?;

        let recorder = Arc::new(LengthTracker::new());

        Ok(Self {
            dir,
            config,
            bucket_opts: BucketOptions::default(),
            schema,
            buckets: RwLock::new(HashMap::new()),
            tracker: recorder.clone(),
            recorder: Some(recorder),
            stopwords: Arc::new(Detector::default()),
            observer: Arc::new(NullObserver),
            live_docs: RwLock::new(RoaringTreemap::new()),
            pool,
        })
    }

    pub fn with_bucket_options(mut self, opts: BucketOptions) -> Self {
        self.bucket_opts = opts;
        self
    }

    pub fn with_stopwords(mut self, detector: Arc<dyn StopwordDetector>) -> Self {
        self.stopwords = detector;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn MetricsObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the length statistics with an externally maintained
    /// tracker; disables internal recording.
    pub fn with_tracker(mut self, tracker: Arc<dyn PropertyLengthTracker>) -> Self {
        self.tracker = tracker;
        self.recorder = None;
        self
    }

    fn bucket_for(&self, property: &str) -> Result<Arc<Bucket>> {
        if let Some(bucket) = self.buckets.read().get(property) {
            return Ok(bucket.clone());
        }

        let mut buckets = self.buckets.write();
        if let Some(bucket) = buckets.get(property) {
            return Ok(bucket.clone());
        }

        let bucket = Arc::new(Bucket::open(
            self.dir.join(format!("property_{property}")),
            self.bucket_opts.clone(),
            self.config.bm25,
            self.config.lock_shards,
        )?);
        buckets.insert(property.to_string(), bucket.clone());
        Ok(bucket)
    }

    /// Record one posting entry for a document's property.
    pub fn write(
        &self,
        doc_id: u64,
        property: &str,
        term: &str,
        tf: u32,
        field_len: u32,
    ) -> Result<()> {
        self.schema.searchable(property)?;
        self.bucket_for(property)?
            .put(term.as_bytes(), doc_id, tf, field_len)?;
        self.live_docs.write().insert(doc_id);
        Ok(())
    }

    /// Tokenize and index one property value of a document. Field length
    /// is the total token count, fed into the length statistics.
    pub fn index_text(&self, doc_id: u64, property: &str, text: &str) -> Result<()> {
        let prop_schema = self.schema.searchable(property)?;
        let tokens = tokenize(prop_schema.tokenization, text);
        let field_len = tokens.len() as u32;

        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *frequencies.entry(token).or_insert(0) += 1;
        }

        let bucket = self.bucket_for(property)?;
        for (term, tf) in &frequencies {
            bucket.put(term.as_bytes(), doc_id, *tf, field_len)?;
        }

        if let Some(recorder) = &self.recorder {
            recorder.record(property, field_len);
        }
        self.live_docs.write().insert(doc_id);
        Ok(())
    }

    /// Delete a document everywhere.
    pub fn tombstone(&self, doc_id: u64) -> Result<()> {
        for bucket in self.buckets.read().values() {
            bucket.tombstone(doc_id)?;
        }
        self.live_docs.write().remove(doc_id);
        Ok(())
    }

    /// Flush every bucket's memtable.
    pub fn flush(&self) -> Result<()> {
        for bucket in self.buckets.read().values() {
            bucket.flush()?;
        }
        Ok(())
    }

    /// Run one round of pairwise compactions across all buckets.
    pub fn compact_once(&self) -> Result<bool> {
        let mut any = false;
        for bucket in self.buckets.read().values() {
            any |= bucket.compact_once()?;
        }
        Ok(any)
    }

    pub fn doc_count(&self) -> u64 {
        self.live_docs.read().len()
    }

    /// Top-k BM25 search over the given properties. `limit = 0` means no
    /// limit, bounded by the union of term document frequencies. Results
    /// are `(doc_ids, scores)` ranked by score descending, ties broken by
    /// doc id descending.
    pub fn search(
        &self,
        query: &str,
        properties: &[&str],
        limit: usize,
        allow: Option<&AllowList>,
        cancel: &CancelToken,
    ) -> Result<(Vec<u64>, Vec<f32>)> {
        if properties.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        if let Some(allow) = allow {
            if allow.is_empty() {
                return Ok((Vec::new(), Vec::new()));
            }
        }

        let total_docs = self.doc_count();
        if total_docs == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        // deleted docs are filtered with the collection-wide live set,
        // intersected with whatever filter the caller supplied
        let live: AllowList = self.live_docs.read().iter().collect();
        let effective_allow = match allow {
            Some(allow) => allow.intersect(&live),
            None => live,
        };

        // tokenize once per tokenization mode, with stopword filtering
        // applied to word tokenization only
        let mut terms_by_tokenization: HashMap<Tokenization, (Vec<String>, Vec<u32>)> =
            HashMap::new();
        for tokenization in Tokenization::ALL {
            let (mut terms, mut boosts) = tokenize_and_count_duplicates(tokenization, query);
            if tokenization == Tokenization::Word {
                (terms, boosts) = remove_stopwords(terms, boosts, self.stopwords.as_ref());
            }
            terms_by_tokenization.insert(tokenization, (terms, boosts));
        }

        // one scoring task per property, each with its own cursor set
        let mut tasks: Vec<PropertyTask> = Vec::new();
        let mut df_total = 0u64;

        for raw_property in properties {
            let (property, boost) = parse_property_boost(raw_property);
            let prop_schema = self.schema.searchable(property)?;
            let (query_terms, dup_boosts) = &terms_by_tokenization[&prop_schema.tokenization];

            let avg_len = self.tracker.mean(property).unwrap_or(0.0);
            let bucket = self.bucket_for(property)?;

            let mut cursors: Vec<Box<dyn TermCursor>> = Vec::new();
            for (term, dup_boost) in query_terms.iter().zip(dup_boosts) {
                let (sources, df) = bucket.posting_sources(term.as_bytes())?;
                if df == 0 {
                    continue;
                }
                df_total += df;

                let idf = scoring::idf(df as f64, total_docs as f64);
                let weight = boost * *dup_boost as f32 * idf;
                let term_cursors: Vec<BlockMaxCursor> = sources
                    .into_iter()
                    .map(|source| {
                        BlockMaxCursor::new(source, weight, avg_len, self.config.bm25)
                    })
                    .collect();
                cursors.push(Box::new(UnifiedTerm::new(term_cursors)));
            }

            tasks.push(PropertyTask { terms: cursors });
        }

        let limit = if limit == 0 { df_total as usize } else { limit };
        if limit == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        // score properties in parallel; each task returns its own result
        // vector and the orchestrator concatenates
        let allow_ref = &effective_allow;
        let task_results: Vec<Result<(Vec<super::queue::ScoredDoc>, BlockMetrics)>> =
            self.pool.install(|| {
                use rayon::prelude::*;
                tasks
                    .into_par_iter()
                    .map(|task| {
                        std::panic::catch_unwind(AssertUnwindSafe(|| {
                            block_max_wand(task.terms, limit, Some(allow_ref), cancel)
                        }))
                        .unwrap_or_else(|panic| {
                            let message = panic_message(panic.as_ref());
                            let backtrace = std::backtrace::Backtrace::force_capture();
                            tracing::error!(%message, %backtrace, "scoring task panicked");
                            Err(HarpoonError::Internal(format!(
                                "scoring task panicked: {message}"
                            )))
                        })
                    })
                    .collect()
            });

        let mut combined: HashMap<u64, f32> = HashMap::new();
        let mut metrics = BlockMetrics::default();
        for result in task_results {
            if let Err(e) = &result {
                if e.is_corruption() {
                    tracing::error!(error = %e, "query failed on corrupt segment data");
                }
            }
            let (scored, task_metrics) = result?;
            metrics.merge(&task_metrics);
            for doc in scored {
                *combined.entry(doc.doc_id).or_insert(0.0) += doc.score;
            }
        }
        self.observer.observe(&metrics);

        let mut ranked: Vec<(u64, f32)> = combined.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        ranked.truncate(limit);

        let ids = ranked.iter().map(|(id, _)| *id).collect();
        let scores = ranked.iter().map(|(_, score)| *score).collect();
        Ok((ids, scores))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
