use super::key::CacheKey;
use super::{tmp_sibling, Lookup};
use crate::data::ParquetConnector;
use crate::error::{AidstatsError, Result};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Disk-persisted store of filtered query results, one parquet file per
/// fingerprint.
///
/// Files are immutable once renamed into place, so reads take no lock. Writes go
/// through a temp file in the same directory followed by an atomic rename; a
/// concurrent reader never observes a partially written file.
pub struct QueryCache {
    dir: PathBuf,
}

impl QueryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| AidstatsError::storage(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.parquet"))
    }

    /// Probe the store. Corruption is downgraded to a miss: the unreadable file
    /// is deleted best-effort and the caller recomputes.
    pub fn get(&self, key: &CacheKey) -> Lookup {
        let path = self.file_path(key);
        if !path.exists() {
            log::debug!("query cache miss: {key}");
            return Lookup::Miss;
        }

        match ParquetConnector::load(&path) {
            Ok(frame) => {
                log::debug!("query cache hit: {key}");
                Lookup::Hit(frame)
            }
            Err(e) => {
                log::warn!(
                    "corrupt query cache file {} ({e}), discarding",
                    path.display()
                );
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("failed to delete {}: {e}", path.display());
                }
                Lookup::Corrupt
            }
        }
    }

    pub fn set(&self, key: &CacheKey, frame: &DataFrame) -> Result<()> {
        let path = self.file_path(key);
        let tmp = tmp_sibling(&path);

        if let Err(e) = ParquetConnector::save(&tmp, frame) {
            let _ = fs::remove_file(&tmp);
            // A Storage error already names the offending path.
            return Err(match e {
                AidstatsError::Storage { .. } => e,
                other => AidstatsError::storage(&path, other),
            });
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(AidstatsError::storage(&path, e));
        }
        log::debug!("query cache stored: {key}");
        Ok(())
    }

    /// Remove every file in the queries directory, best-effort per file.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        let entries = fs::read_dir(&self.dir).map_err(|e| AidstatsError::storage(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| AidstatsError::storage(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("failed to delete {}: {e}", path.display()),
            }
        }
        log::info!("cleared {removed} query cache entries");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DatasetQuery;
    use polars::df;
    use tempfile::TempDir;

    fn sample_key(dataset: &str) -> CacheKey {
        CacheKey::from_query(&DatasetQuery::new(dataset)).unwrap()
    }

    fn sample_frame() -> DataFrame {
        df! {
            "year" => &[2020i32, 2021],
            "provider_code" => &[4i64, 12],
            "value" => &[10.0f64, 20.0],
        }
        .unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = QueryCache::new(dir.path()).unwrap();
        let key = sample_key("DAC1");
        let frame = sample_frame();

        assert!(matches!(cache.get(&key), Lookup::Miss));
        cache.set(&key, &frame).unwrap();

        match cache.get(&key) {
            Lookup::Hit(out) => assert!(out.equals(&frame)),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_file_is_a_miss_and_deleted() {
        let dir = TempDir::new().unwrap();
        let cache = QueryCache::new(dir.path()).unwrap();
        let key = sample_key("DAC1");

        let path = cache.file_path(&key);
        fs::write(&path, b"not a parquet file").unwrap();

        assert!(matches!(cache.get(&key), Lookup::Corrupt));
        assert!(!path.exists());
        assert!(matches!(cache.get(&key), Lookup::Miss));
    }

    #[test]
    fn test_interrupted_write_leaves_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = QueryCache::new(dir.path()).unwrap();
        let key = sample_key("DAC1");

        // A crash between temp write and rename leaves only the temp file.
        let tmp = tmp_sibling(&cache.file_path(&key));
        fs::write(&tmp, b"partial parquet bytes").unwrap();

        assert!(matches!(cache.get(&key), Lookup::Miss));
    }

    #[test]
    fn test_set_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = QueryCache::new(dir.path()).unwrap();
        cache.set(&sample_key("DAC1"), &sample_frame()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".parquet"), "unexpected file {names:?}");
    }

    #[test]
    fn test_concurrent_sets_on_one_key_never_corrupt_the_entry() {
        use std::sync::{Arc, Barrier};

        let dir = TempDir::new().unwrap();
        let cache = Arc::new(QueryCache::new(dir.path()).unwrap());
        let key = sample_key("DAC1");
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                let barrier = Arc::clone(&barrier);
                let frame = sample_frame();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.set(&key, &frame).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // The winning rename left a fully written file and no temp siblings.
        match cache.get(&key) {
            Lookup::Hit(out) => assert!(out.equals(&sample_frame())),
            other => panic!("expected hit, got {other:?}"),
        }
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1, "unexpected files {names:?}");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_failure_reports_one_storage_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let cache = QueryCache::new(dir.path()).unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

        let err = cache.set(&sample_key("DAC1"), &sample_frame()).unwrap_err();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(err, AidstatsError::Storage { .. }), "{err}");
        let rendered = err.to_string();
        assert_eq!(rendered.matches("Storage error at").count(), 1, "{rendered}");
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let cache = QueryCache::new(dir.path()).unwrap();
        cache.set(&sample_key("DAC1"), &sample_frame()).unwrap();
        cache.set(&sample_key("DAC2A"), &sample_frame()).unwrap();

        let removed = cache.clear().unwrap();
        assert_eq!(removed, 2);
        assert!(matches!(cache.get(&sample_key("DAC1")), Lookup::Miss));
        assert!(matches!(cache.get(&sample_key("DAC2A")), Lookup::Miss));
    }
}
