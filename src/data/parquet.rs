use crate::error::{AidstatsError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Parquet is the storage format for every persisted tier: bulk datasets and
/// cached query results alike.
pub struct ParquetConnector;

impl ParquetConnector {
    /// Load a parquet file into a DataFrame.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AidstatsError::storage(path, e))?;
        let df = ParquetReader::new(file).finish()?;
        Ok(df)
    }

    /// Write a DataFrame to a parquet file, replacing any existing file.
    pub fn save<P: AsRef<Path>>(path: P, frame: &DataFrame) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| AidstatsError::storage(path, e))?;
        // The writer needs a mutable frame; cloning only bumps column refcounts.
        let mut frame = frame.clone();
        ParquetWriter::new(file).finish(&mut frame)?;
        Ok(())
    }
}
