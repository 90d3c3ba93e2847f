use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use harpoon::search::Tokenization;
use harpoon::{
    Bm25Searcher, BucketOptions, CancelToken, PropertySchema, Schema, SearchConfig,
};

struct BenchEnv {
    _tmp: TempDir,
    engine: Bm25Searcher,
}

const WORDS: &[&str] = &[
    "rust", "search", "engine", "inverted", "index", "segment", "block", "posting", "query",
    "score", "merge", "flush", "cursor", "term", "document",
];

fn make_text(id: u64) -> String {
    let mut words = Vec::with_capacity(12);
    for i in 0..12 {
        words.push(WORDS[((id as usize) * 7 + i * 3) % WORDS.len()]);
    }
    words.join(" ")
}

fn build_env(doc_count: usize) -> BenchEnv {
    let schema = Schema::new().with_property("body", PropertySchema::text(Tokenization::Word));
    let tmp = TempDir::new().unwrap();
    let engine = Bm25Searcher::open(tmp.path(), schema, SearchConfig::default())
        .unwrap()
        .with_bucket_options(BucketOptions {
            sync_writes: false,
            ..Default::default()
        });

    for id in 0..doc_count as u64 {
        engine.index_text(id, "body", &make_text(id)).unwrap();
    }
    engine.flush().unwrap();
    while engine.compact_once().unwrap() {}

    BenchEnv { _tmp: tmp, engine }
}

fn bench_keyword_search(c: &mut Criterion) {
    let counts = [1_000usize, 10_000];
    let envs: Vec<(usize, BenchEnv)> = counts.iter().map(|&n| (n, build_env(n))).collect();

    let mut group = c.benchmark_group("keyword_search");
    for (count, env) in &envs {
        group.bench_with_input(
            BenchmarkId::new("two_terms_top10", count),
            env,
            |b, env| {
                let cancel = CancelToken::new();
                b.iter(|| {
                    let results = env
                        .engine
                        .search(
                            black_box("search engine"),
                            &["body"],
                            10,
                            None,
                            &cancel,
                        )
                        .unwrap();
                    black_box(results)
                });
            },
        );
    }
    group.finish();
}

fn bench_indexing(c: &mut Criterion) {
    c.bench_function("index_1k_docs", |b| {
        b.iter(|| {
            let env = build_env(1_000);
            black_box(env.engine.doc_count())
        });
    });
}

criterion_group!(benches, bench_keyword_search, bench_indexing);
criterion_main!(benches);
