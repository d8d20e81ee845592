use crate::error::Result;
use crate::types::DatasetQuery;
use polars::prelude::*;

/// Remote-source collaborator.
///
/// Implementations own the actual download mechanics (HTTP, bulk-file endpoints,
/// rate limiting, retries). The cache never retries a failed fetch; errors
/// propagate to the caller unmodified.
pub trait Fetcher: Send + Sync {
    /// Download the complete raw dataset.
    fn fetch_bulk(&self, dataset: &str) -> Result<DataFrame>;

    /// Download a filtered slice directly from the remote API.
    fn fetch_query(&self, query: &DatasetQuery) -> Result<DataFrame>;
}
