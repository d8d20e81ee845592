use super::tmp_sibling;
use crate::data::ParquetConnector;
use crate::error::{AidstatsError, Result};
use crate::types::validate_dataset_id;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// On-disk state for one bulk dataset.
#[derive(Debug, Clone)]
pub struct BulkFileRecord {
    pub dataset: String,
    pub path: PathBuf,
    pub last_modified: DateTime<Utc>,
    pub lock_path: PathBuf,
}

impl BulkFileRecord {
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.last_modified)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Dataset-scoped advisory lock, held while a bulk file is (re)downloaded.
///
/// Acquisition creates the lock file with `create_new`, polling with a bounded
/// wait. The guard removes the file on drop, so the lock is released on every
/// exit path including errors.
struct BulkLock {
    path: PathBuf,
}

impl BulkLock {
    fn acquire(path: &Path, dataset: &str, timeout: Duration, poll: Duration) -> Result<Self> {
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if started.elapsed() >= timeout {
                        return Err(AidstatsError::LockTimeout {
                            dataset: dataset.to_string(),
                            waited_secs: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(poll);
                }
                Err(e) => return Err(AidstatsError::storage(path, e)),
            }
        }
    }
}

impl Drop for BulkLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to remove lock file {}: {e}", self.path.display());
        }
    }
}

/// Disk-persisted store of whole raw datasets, one parquet file per dataset.
///
/// `ensure` coordinates downloads across threads and processes sharing the same
/// base directory: a per-dataset lock file guarantees at most one in-flight
/// download system-wide, and a freshness re-check after acquisition stops a
/// waiter that lost the race from downloading again.
pub struct BulkCache {
    dir: PathBuf,
    lock_timeout: Duration,
    lock_poll: Duration,
}

impl BulkCache {
    pub fn new(dir: impl Into<PathBuf>, lock_timeout: Duration, lock_poll: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| AidstatsError::storage(&dir, e))?;
        Ok(Self {
            dir,
            lock_timeout,
            lock_poll,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self, dataset: &str) -> PathBuf {
        self.dir.join(format!("{dataset}.parquet"))
    }

    pub fn lock_path(&self, dataset: &str) -> PathBuf {
        self.dir.join(format!("{dataset}.lock"))
    }

    /// Records for every dataset with a bulk file on disk, sorted by dataset.
    pub fn records(&self) -> Result<Vec<BulkFileRecord>> {
        let mut out = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| AidstatsError::storage(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| AidstatsError::storage(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("parquet") {
                continue;
            }
            let dataset = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) => stem,
                None => continue,
            };
            if let Some(record) = self.record(dataset) {
                out.push(record);
            }
        }
        out.sort_by(|a, b| a.dataset.cmp(&b.dataset));
        Ok(out)
    }

    /// Current on-disk record for `dataset`, if a bulk file exists.
    pub fn record(&self, dataset: &str) -> Option<BulkFileRecord> {
        let path = self.data_path(dataset);
        let modified = fs::metadata(&path).ok()?.modified().ok()?;
        Some(BulkFileRecord {
            dataset: dataset.to_string(),
            path,
            last_modified: DateTime::<Utc>::from(modified),
            lock_path: self.lock_path(dataset),
        })
    }

    fn is_fresh(&self, dataset: &str, max_age: Duration) -> bool {
        self.record(dataset)
            .map(|record| record.age() <= max_age)
            .unwrap_or(false)
    }

    /// Return the path to a bulk file no older than `max_age`, downloading via
    /// `fetch` only when no other caller got there first.
    pub fn ensure<F>(&self, dataset: &str, max_age: Duration, fetch: F) -> Result<PathBuf>
    where
        F: FnOnce(&str) -> Result<DataFrame>,
    {
        validate_dataset_id(dataset)?;
        let path = self.data_path(dataset);

        if self.is_fresh(dataset, max_age) {
            log::debug!("using cached bulk data for {dataset}");
            return Ok(path);
        }

        let lock = BulkLock::acquire(
            &self.lock_path(dataset),
            dataset,
            self.lock_timeout,
            self.lock_poll,
        )?;

        // Another thread or process may have refreshed the file while this
        // caller was waiting on the lock.
        if self.is_fresh(dataset, max_age) {
            log::debug!("bulk data for {dataset} was refreshed while waiting");
            return Ok(path);
        }

        log::info!("downloading bulk data for {dataset}");
        let frame = fetch(dataset)?;

        let tmp = tmp_sibling(&path);
        if let Err(e) = ParquetConnector::save(&tmp, &frame) {
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
        // The temp file was written moments ago, so the renamed file's mtime
        // restarts the freshness clock.

        log::info!("cached bulk data for {dataset}");
        drop(lock);
        Ok(path)
    }

    /// Remove only the dataset's data file, forcing the next `ensure` to
    /// redownload. The lock file is untouched, so a download in flight
    /// elsewhere keeps its exclusivity.
    pub fn discard_data(&self, dataset: &str) -> Result<()> {
        validate_dataset_id(dataset)?;
        remove_if_exists(&self.data_path(dataset))?;
        log::info!("discarded bulk data for {dataset}");
        Ok(())
    }

    /// Remove the dataset's data file and lock file.
    pub fn clear(&self, dataset: &str) -> Result<()> {
        validate_dataset_id(dataset)?;
        remove_if_exists(&self.data_path(dataset))?;
        remove_if_exists(&self.lock_path(dataset))?;
        log::info!("cleared bulk cache entry for {dataset}");
        Ok(())
    }

    /// Remove every data and lock file in the bulk directory, best-effort.
    pub fn clear_all(&self) -> Result<usize> {
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
        log::info!("cleared {removed} bulk cache files");
        Ok(removed)
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AidstatsError::storage(path, e)),
    }
}
