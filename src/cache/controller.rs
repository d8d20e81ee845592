use super::bulk::BulkCache;
use super::key::CacheKey;
use super::memory::MemoryCache;
use super::query::QueryCache;
use super::Lookup;
use crate::config::CacheSettings;
use crate::data::{apply_query_filters, Fetcher, ParquetConnector};
use crate::error::{AidstatsError, Result};
use crate::types::DatasetQuery;
use polars::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Controller over the three cache tiers.
///
/// `resolve` falls through memory → query → bulk/fetch, promoting hits from the
/// query tier into memory and storing computed results in both persisted-result
/// tiers. Starts enabled; while disabled every `resolve` goes straight to the
/// fetcher so callers observe deterministic uncached behavior.
pub struct DataCache {
    settings: CacheSettings,
    memory: MemoryCache,
    queries: QueryCache,
    bulk: BulkCache,
    enabled: AtomicBool,
}

impl DataCache {
    pub fn new(settings: CacheSettings) -> Result<Self> {
        settings.validate()?;
        let queries = QueryCache::new(settings.queries_dir())?;
        let bulk = BulkCache::new(
            settings.bulk_dir(),
            settings.lock_timeout(),
            settings.lock_poll(),
        )?;
        Ok(Self {
            settings,
            memory: MemoryCache::new(),
            queries,
            bulk,
            enabled: AtomicBool::new(true),
        })
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    pub fn queries(&self) -> &QueryCache {
        &self.queries
    }

    pub fn bulk(&self) -> &BulkCache {
        &self.bulk
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Resolve a query through the tiers.
    ///
    /// With `via_bulk` the miss path downloads (or reuses) the whole dataset
    /// through the bulk tier and filters it locally; without it the fetcher is
    /// asked for the filtered slice directly.
    pub fn resolve(
        &self,
        query: &DatasetQuery,
        fetcher: &dyn Fetcher,
        via_bulk: bool,
    ) -> Result<DataFrame> {
        let key = CacheKey::from_query(query)?;

        if !self.is_enabled() {
            log::debug!("cache disabled, fetching {} directly", query.dataset);
            return fetcher.fetch_query(query);
        }

        if let Some(frame) = self.memory.get(&key) {
            log::info!("cache hit: memory ({key})");
            return Ok(frame);
        }

        match self.queries.get(&key) {
            Lookup::Hit(frame) => {
                log::info!("cache hit: query ({key})");
                self.memory.set(&key, frame.clone());
                return Ok(frame);
            }
            Lookup::Miss => {}
            Lookup::Corrupt => {
                log::info!("query cache entry for {key} was corrupt, recomputing");
            }
        }

        let frame = if via_bulk {
            log::info!("query cache miss ({key}), reading from bulk data");
            self.load_via_bulk(query, fetcher)?
        } else {
            log::info!("query cache miss ({key}), downloading via API");
            fetcher.fetch_query(query)?
        };

        self.queries.set(&key, &frame)?;
        self.memory.set(&key, frame.clone());
        Ok(frame)
    }

    fn load_via_bulk(&self, query: &DatasetQuery, fetcher: &dyn Fetcher) -> Result<DataFrame> {
        let max_age = self.settings.bulk_max_age();
        let path = self
            .bulk
            .ensure(&query.dataset, max_age, |dataset| fetcher.fetch_bulk(dataset))?;

        let full = match ParquetConnector::load(&path) {
            Ok(frame) => frame,
            Err(e) => {
                // Unreadable bulk file: discard the data only and download once
                // more. The lock file stays, another process may hold it.
                log::warn!("corrupt bulk file for {} ({e}), redownloading", query.dataset);
                self.bulk.discard_data(&query.dataset)?;
                let path = self
                    .bulk
                    .ensure(&query.dataset, max_age, |dataset| fetcher.fetch_bulk(dataset))?;
                ParquetConnector::load(&path)?
            }
        };

        apply_query_filters(full, query)
    }

    /// Clear all tiers. A failure in one tier does not stop the others;
    /// accumulated failures are reported together.
    pub fn clear_all(&self) -> Result<()> {
        self.memory.clear();

        let mut failures = Vec::new();
        if let Err(e) = self.queries.clear() {
            failures.push(format!("query tier: {e}"));
        }
        if let Err(e) = self.bulk.clear_all() {
            failures.push(format!("bulk tier: {e}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AidstatsError::ClearIncomplete(failures.join("; ")))
        }
    }
}
