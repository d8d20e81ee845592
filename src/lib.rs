//! Tiered caching for tabular aid-statistics datasets.
//!
//! Queries resolve through memory, on-disk query results, and on-disk bulk
//! datasets before falling back to the remote source. The base directory can be
//! shared by several processes; bulk downloads are coordinated with per-dataset
//! lock files.

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod types;

pub use cache::{
    BulkCache, BulkFileRecord, CacheKey, DataCache, Lookup, MemoryCache, QueryCache,
};
pub use config::CacheSettings;
pub use data::{Fetcher, ParquetConnector};
pub use error::{AidstatsError, Result};
pub use types::DatasetQuery;
