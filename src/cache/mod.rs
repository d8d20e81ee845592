pub mod bulk;
pub mod controller;
pub mod key;
pub mod memory;
pub mod query;

pub use bulk::{BulkCache, BulkFileRecord};
pub use controller::DataCache;
pub use key::CacheKey;
pub use memory::MemoryCache;
pub use query::QueryCache;

use crate::config::CacheSettings;
use crate::error::{AidstatsError, Result};
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Result of probing one cache tier.
///
/// Corruption is distinct from a plain miss so the controller can log and
/// recompute explicitly instead of relying on swallowed errors.
#[derive(Debug)]
pub enum Lookup {
    Hit(DataFrame),
    Miss,
    Corrupt,
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Temp path next to `path` for write-then-rename. The pid keeps concurrent
/// processes from clobbering each other's temp files; the sequence number keeps
/// threads within one process apart.
pub(crate) fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!("{name}.tmp-{}-{seq}", std::process::id()))
}

static INSTANCE: RwLock<Option<Arc<DataCache>>> = RwLock::new(None);

/// Configure the process-wide cache. Replaces any previous instance.
pub fn configure(settings: CacheSettings) -> Result<Arc<DataCache>> {
    let cache = Arc::new(DataCache::new(settings)?);
    *INSTANCE.write().unwrap() = Some(Arc::clone(&cache));
    log::info!(
        "cache configured at {}",
        cache.settings().base_dir.display()
    );
    Ok(cache)
}

/// The configured process-wide cache.
pub fn instance() -> Result<Arc<DataCache>> {
    INSTANCE.read().unwrap().clone().ok_or_else(|| {
        AidstatsError::Configuration(
            "cache not configured; call cache::configure first".to_string(),
        )
    })
}

pub fn enable() -> Result<()> {
    instance()?.enable();
    Ok(())
}

pub fn disable() -> Result<()> {
    instance()?.disable();
    Ok(())
}

pub fn is_enabled() -> Result<bool> {
    Ok(instance()?.is_enabled())
}

pub fn clear_all() -> Result<()> {
    instance()?.clear_all()
}
