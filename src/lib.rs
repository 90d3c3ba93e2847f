pub mod bucket;
pub mod commitlog;
pub mod compactor;
pub mod config;
pub mod error;
pub mod memtable;
pub mod metrics;
pub mod search;
pub mod segment;

pub use bucket::Bucket;
pub use config::{Bm25Params, BucketOptions, SearchConfig};
pub use error::{HarpoonError, Result};
pub use metrics::{BlockMetrics, LoggingObserver, MetricsObserver, NullObserver};
pub use search::{
    AllowList, Bm25Searcher, CancelToken, PropertySchema, Schema, Tokenization,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
