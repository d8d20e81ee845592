use crate::error::{AidstatsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable descriptor for one dataset query.
///
/// Fields mirror the filter surface of the DAC-style datasets: list fields are
/// unordered id collections, scalar fields are optional. Two descriptors that are
/// set-equal field by field produce the same cache key regardless of list ordering,
/// duplication, or empty-vs-omitted representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetQuery {
    pub dataset: String,
    pub measure: Option<String>,
    pub currency: Option<String>,
    pub base_year: Option<i32>,
    pub years: Vec<i32>,
    pub providers: Vec<i64>,
    pub recipients: Vec<i64>,
    pub sectors: Vec<i64>,
    pub indicators: Vec<String>,
    /// Additional free-form filters, keyed by column name.
    pub extras: BTreeMap<String, serde_json::Value>,
}

/// Fixed field names; an extras entry shadowing one of these is ambiguous.
const RESERVED_FIELDS: [&str; 9] = [
    "dataset",
    "measure",
    "currency",
    "base_year",
    "years",
    "providers",
    "recipients",
    "sectors",
    "indicators",
];

impl DatasetQuery {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Default::default()
        }
    }

    /// Check that the descriptor can be turned into an unambiguous cache key.
    pub fn validate(&self) -> Result<()> {
        validate_dataset_id(&self.dataset)?;

        for (name, value) in &self.extras {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(AidstatsError::KeyConstruction(format!(
                    "extra filter '{name}' shadows a fixed query field"
                )));
            }
            validate_extra_value(name, value)?;
        }
        Ok(())
    }
}

/// Dataset ids become file names, so path-like ids are rejected outright.
pub(crate) fn validate_dataset_id(dataset: &str) -> Result<()> {
    if dataset.is_empty()
        || dataset.contains('/')
        || dataset.contains('\\')
        || dataset.contains("..")
    {
        return Err(AidstatsError::KeyConstruction(format!(
            "invalid dataset id '{dataset}'"
        )));
    }
    Ok(())
}

fn validate_extra_value(name: &str, value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Null => Err(AidstatsError::KeyConstruction(format!(
            "extra filter '{name}' is null; omit the entry instead"
        ))),
        serde_json::Value::Object(_) => Err(AidstatsError::KeyConstruction(format!(
            "extra filter '{name}' is a nested object"
        ))),
        serde_json::Value::Array(items) => {
            for item in items {
                match item {
                    serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                        return Err(AidstatsError::KeyConstruction(format!(
                            "extra filter '{name}' must be a list of scalars"
                        )))
                    }
                    _ => {}
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
