use crate::error::Result;
use crate::types::DatasetQuery;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Width of the hex fingerprint kept from the digest.
const KEY_WIDTH: usize = 16;

/// Canonical fingerprint for one dataset + parameter combination.
///
/// Built by sorting and de-duplicating every list field, dropping absent and
/// empty fields, serializing the result as JSON with stable key ordering, and
/// hashing with SHA-256. The fingerprint doubles as the query-tier file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_query(query: &DatasetQuery) -> Result<Self> {
        query.validate()?;
        let canonical = serde_json::to_string(&canonical_value(query))?;
        let digest = Sha256::digest(canonical.as_bytes());
        let mut fingerprint = hex::encode(digest);
        fingerprint.truncate(KEY_WIDTH);
        Ok(CacheKey(fingerprint))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One canonical serialization of a query descriptor.
///
/// `serde_json::Map` is backed by a BTreeMap, so object keys serialize in sorted
/// order. Empty collections and `None` scalars are omitted entirely, making them
/// indistinguishable from fields that were never set.
fn canonical_value(query: &DatasetQuery) -> Value {
    let mut map = Map::new();
    map.insert("dataset".to_string(), Value::from(query.dataset.clone()));

    if let Some(measure) = &query.measure {
        map.insert("measure".to_string(), Value::from(measure.clone()));
    }
    if let Some(currency) = &query.currency {
        map.insert("currency".to_string(), Value::from(currency.clone()));
    }
    if let Some(base_year) = query.base_year {
        map.insert("base_year".to_string(), Value::from(base_year));
    }

    insert_sorted(&mut map, "years", &query.years);
    insert_sorted(&mut map, "providers", &query.providers);
    insert_sorted(&mut map, "recipients", &query.recipients);
    insert_sorted(&mut map, "sectors", &query.sectors);
    insert_sorted(&mut map, "indicators", &query.indicators);

    for (name, value) in &query.extras {
        map.insert(name.clone(), normalize_extra(value));
    }

    Value::Object(map)
}

fn insert_sorted<T>(map: &mut Map<String, Value>, field: &str, values: &[T])
where
    T: Ord + Clone + Into<Value>,
{
    if values.is_empty() {
        return;
    }
    let sorted: BTreeSet<T> = values.iter().cloned().collect();
    map.insert(
        field.to_string(),
        Value::Array(sorted.into_iter().map(Into::into).collect()),
    );
}

/// Sort and de-duplicate extra list values by their serialized form.
fn normalize_extra(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let sorted: BTreeSet<String> = items.iter().map(|v| v.to_string()).collect();
            let mut normalized: Vec<Value> = Vec::with_capacity(sorted.len());
            for repr in sorted {
                // Round-trips scalar values only; validate() rejected the rest.
                if let Ok(v) = serde_json::from_str(&repr) {
                    normalized.push(v);
                }
            }
            Value::Array(normalized)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(query: &DatasetQuery) -> CacheKey {
        CacheKey::from_query(query).unwrap()
    }

    #[test]
    fn test_key_is_fixed_width_hex() {
        let k = key(&DatasetQuery::new("DAC1"));
        assert_eq!(k.as_str().len(), KEY_WIDTH);
        assert!(k.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_list_ordering_and_duplicates_do_not_matter() {
        let mut a = DatasetQuery::new("DAC1");
        a.providers = vec![4, 12];
        a.years = vec![2020, 2021];

        let mut b = DatasetQuery::new("DAC1");
        b.providers = vec![12, 4, 12];
        b.years = vec![2021, 2020, 2020];

        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn test_empty_list_equals_omitted_list() {
        let a = DatasetQuery::new("DAC2A");
        let mut b = DatasetQuery::new("DAC2A");
        b.years = Vec::new();
        b.indicators = Vec::new();
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn test_distinct_queries_get_distinct_keys() {
        let mut a = DatasetQuery::new("DAC1");
        a.years = vec![2020];
        let mut b = DatasetQuery::new("DAC1");
        b.years = vec![2021];
        assert_ne!(key(&a), key(&b));

        let c = DatasetQuery::new("DAC2A");
        assert_ne!(key(&DatasetQuery::new("DAC1")), key(&c));
    }

    #[test]
    fn test_scalar_fields_enter_the_key() {
        let mut a = DatasetQuery::new("DAC1");
        a.currency = Some("USD".to_string());
        let mut b = DatasetQuery::new("DAC1");
        b.currency = Some("EUR".to_string());
        assert_ne!(key(&a), key(&b));

        let mut c = DatasetQuery::new("DAC1");
        c.base_year = Some(2015);
        assert_ne!(key(&DatasetQuery::new("DAC1")), key(&c));
    }

    #[test]
    fn test_extras_are_normalized() {
        let mut a = DatasetQuery::new("CRS");
        a.extras.insert("channels".to_string(), json!([200, 100, 200]));
        let mut b = DatasetQuery::new("CRS");
        b.extras.insert("channels".to_string(), json!([100, 200]));
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn test_invalid_query_is_reported() {
        let query = DatasetQuery::new("a/b");
        assert!(CacheKey::from_query(&query).is_err());
    }

    #[test]
    fn test_dac1_scenario_keys_match() {
        let mut a = DatasetQuery::new("DAC1");
        a.years = vec![2020, 2021];
        a.providers = vec![4];

        let mut b = DatasetQuery::new("DAC1");
        b.years = vec![2021, 2020];
        b.providers = vec![4];

        assert_eq!(key(&a), key(&b));
    }
}
