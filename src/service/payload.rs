//! Decoding of `/predict` request bodies into a raw demand table.
//!
//! Three JSON shapes are accepted:
//! - an array of records: `[{"Time": ..., "Demand": ...}, ...]`
//! - an object of columns: `{"Time": [...], "Demand": [...]}`
//! - an object of indexed columns: `{"Time": {"0": ..., "1": ...}, ...}`
//!
//! Numeric `Time` and `Date` values are read as epoch milliseconds.

use std::{cmp::Ordering, collections::HashMap};

use polars::prelude::*;
use serde_json::Value;

use crate::{
    data::schema::RawCol,
    error::{DataError, DemandResult, polars_to_demand_error},
};

pub fn frame_from_json(body: &Value) -> DemandResult<DataFrame> {
    let columns = match body {
        Value::Array(records) => records_to_columns(records)?,
        Value::Object(map) => map
            .iter()
            .map(|(name, values)| Ok((name.clone(), column_values(name, values)?)))
            .collect::<DemandResult<Vec<_>>>()?,
        _ => {
            return Err(invalid(
                "body",
                "expected an array of records or an object of columns",
            ));
        }
    };

    if let Some((first, rest)) = columns.split_first() {
        if let Some((name, values)) = rest.iter().find(|(_, v)| v.len() != first.1.len()) {
            return Err(invalid(
                name,
                &format!(
                    "has {} values but '{}' has {}",
                    values.len(),
                    first.0,
                    first.1.len()
                ),
            ));
        }
    }

    let columns = columns
        .iter()
        .map(|(name, values)| to_column(name, values))
        .collect::<DemandResult<Vec<_>>>()?;
    DataFrame::new(columns).map_err(|e| polars_to_demand_error("Building request frame", e))
}

fn records_to_columns(records: &[Value]) -> DemandResult<Vec<(String, Vec<Value>)>> {
    let mut columns: Vec<(String, Vec<Value>)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for (row, record) in records.iter().enumerate() {
        let Value::Object(fields) = record else {
            return Err(invalid("body", &format!("record {row} is not an object")));
        };
        for (name, value) in fields {
            let at = *position.entry(name.clone()).or_insert_with(|| {
                columns.push((name.clone(), vec![Value::Null; row]));
                columns.len() - 1
            });
            columns[at].1.push(value.clone());
        }
        // keys absent from this record
        for (_, values) in columns.iter_mut() {
            values.resize(row + 1, Value::Null);
        }
    }
    Ok(columns)
}

fn column_values(name: &str, values: &Value) -> DemandResult<Vec<Value>> {
    match values {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(indexed) => {
            let mut entries: Vec<(&String, &Value)> = indexed.iter().collect();
            entries.sort_by(|(a, _), (b, _)| compare_index(a, b));
            Ok(entries.into_iter().map(|(_, v)| v.clone()).collect())
        }
        _ => Err(invalid(name, "expected an array or an indexed object")),
    }
}

/// Numeric keys sort numerically, anything else lexically after them.
fn compare_index(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn to_column(name: &str, values: &[Value]) -> DemandResult<Column> {
    let present = || values.iter().filter(|v| !v.is_null());
    let pl_name: PlSmallStr = name.into();

    if present().all(Value::is_string) && present().next().is_some() {
        let data: Vec<Option<&str>> = values.iter().map(Value::as_str).collect();
        return Ok(Column::new(pl_name, data));
    }
    if present().all(Value::is_boolean) && present().next().is_some() {
        let data: Vec<Option<bool>> = values.iter().map(Value::as_bool).collect();
        return Ok(Column::new(pl_name, data));
    }
    if !present().all(Value::is_number) {
        return Err(invalid(name, "mixes strings, numbers and booleans"));
    }

    let is_temporal = name == RawCol::Time.as_str() || name == RawCol::Date.as_str();
    if is_temporal {
        let millis: Vec<Option<i64>> = values
            .iter()
            .map(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .collect();
        return Column::new(pl_name, millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| polars_to_demand_error(&format!("Casting '{name}'"), e));
    }

    let data: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
    Ok(Column::new(pl_name, data))
}

fn invalid(column: &str, msg: &str) -> crate::error::DemandError {
    DataError::InvalidValue {
        column: column.to_string(),
        msg: msg.to_string(),
    }
    .into()
}
