use crate::error::Result;
use crate::types::DatasetQuery;
use polars::prelude::*;
use std::collections::HashSet;

/// Reduce a full bulk frame to the rows a query asks for.
///
/// Pure row selection on membership: each non-empty query field keeps rows whose
/// column value is in the requested set. Filter columns the dataset does not
/// carry are skipped, so one descriptor works across datasets with different
/// schemas. Derived-value computation (currency conversion, deflation,
/// aggregation) is out of scope here.
pub fn apply_query_filters(frame: DataFrame, query: &DatasetQuery) -> Result<DataFrame> {
    let years: Vec<i64> = query.years.iter().map(|y| *y as i64).collect();

    let mut frame = frame;
    frame = filter_by_ints(frame, "year", &years)?;
    frame = filter_by_ints(frame, "provider_code", &query.providers)?;
    frame = filter_by_ints(frame, "recipient_code", &query.recipients)?;
    frame = filter_by_ints(frame, "sector_code", &query.sectors)?;
    frame = filter_by_strings(frame, "indicator", &query.indicators)?;
    if let Some(measure) = &query.measure {
        frame = filter_by_strings(frame, "measure", std::slice::from_ref(measure))?;
    }
    Ok(frame)
}

fn has_column(frame: &DataFrame, column: &str) -> bool {
    frame
        .get_column_names()
        .iter()
        .any(|name| name.as_str() == column)
}

fn filter_by_ints(frame: DataFrame, column: &str, values: &[i64]) -> Result<DataFrame> {
    if values.is_empty() || !has_column(&frame, column) {
        return Ok(frame);
    }
    let wanted: HashSet<i64> = values.iter().copied().collect();

    let col = frame.column(column)?.cast(&DataType::Int64)?;
    let ints = col.i64()?;
    let mut mask = Vec::with_capacity(ints.len());
    for i in 0..ints.len() {
        mask.push(ints.get(i).is_some_and(|v| wanted.contains(&v)));
    }

    let mask = BooleanChunked::from_slice("mask".into(), &mask);
    Ok(frame.filter(&mask)?)
}

fn filter_by_strings(frame: DataFrame, column: &str, values: &[String]) -> Result<DataFrame> {
    if values.is_empty() || !has_column(&frame, column) {
        return Ok(frame);
    }
    let wanted: HashSet<&str> = values.iter().map(String::as_str).collect();

    let col = frame.column(column)?.cast(&DataType::String)?;
    let strings = col.str()?;
    let mut mask = Vec::with_capacity(strings.len());
    for i in 0..strings.len() {
        mask.push(strings.get(i).is_some_and(|v| wanted.contains(v)));
    }

    let mask = BooleanChunked::from_slice("mask".into(), &mask);
    Ok(frame.filter(&mask)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn bulk_frame() -> DataFrame {
        df! {
            "year" => &[2019i32, 2020, 2020, 2021],
            "provider_code" => &[4i64, 4, 12, 4],
            "indicator" => &["oda_total", "oda_total", "oda_grants", "oda_total"],
            "value" => &[1.0f64, 2.0, 3.0, 4.0],
        }
        .unwrap()
    }

    #[test]
    fn test_empty_query_keeps_all_rows() {
        let query = DatasetQuery::new("DAC1");
        let out = apply_query_filters(bulk_frame(), &query).unwrap();
        assert_eq!(out.height(), 4);
    }

    #[test]
    fn test_year_and_provider_membership() {
        let mut query = DatasetQuery::new("DAC1");
        query.years = vec![2020, 2021];
        query.providers = vec![4];

        let out = apply_query_filters(bulk_frame(), &query).unwrap();
        assert_eq!(out.height(), 2);

        let values = out.column("value").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(2.0));
        assert_eq!(values.get(1), Some(4.0));
    }

    #[test]
    fn test_string_membership() {
        let mut query = DatasetQuery::new("DAC1");
        query.indicators = vec!["oda_grants".to_string()];

        let out = apply_query_filters(bulk_frame(), &query).unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_absent_columns_are_skipped() {
        let mut query = DatasetQuery::new("DAC1");
        query.recipients = vec![999];
        query.measure = Some("net_disbursement".to_string());

        // Neither recipient_code nor measure exists in this frame.
        let out = apply_query_filters(bulk_frame(), &query).unwrap();
        assert_eq!(out.height(), 4);
    }
}
