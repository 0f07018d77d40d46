// query results and how each row gets turned into json

use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub rows_affected: u64,
}

impl QueryResult {
    pub(crate) fn from_rows(rows: &[SqliteRow], factory: &dyn RowFactory) -> Self {
        let Some(first) = rows.first() else {
            return Self::default();
        };

        let columns: Vec<String> = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows: Vec<Value> = rows.iter().map(|row| factory.build(&columns, row)).collect();
        let row_count = rows.len();

        Self {
            columns,
            rows,
            row_count,
            rows_affected: 0,
        }
    }
}

/// Decides what one result row looks like.
pub trait RowFactory: Send + Sync {
    fn build(&self, columns: &[String], row: &SqliteRow) -> Value;
}

/// Rows as json arrays, in column order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tuples;

impl RowFactory for Tuples {
    fn build(&self, columns: &[String], row: &SqliteRow) -> Value {
        Value::Array((0..columns.len()).map(|i| row_value_to_json(row, i)).collect())
    }
}

/// Rows as json objects keyed by column name.
#[derive(Debug, Clone, Copy, Default)]
pub struct Records;

impl RowFactory for Records {
    fn build(&self, columns: &[String], row: &SqliteRow) -> Value {
        Value::Object(
            columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), row_value_to_json(row, i)))
                .collect(),
        )
    }
}

// sqlite values are dynamically typed, so try the storage classes in turn
fn row_value_to_json(row: &SqliteRow, index: usize) -> Value {
    use sqlx::ValueRef;

    if row.try_get_raw(index).map(|v| v.is_null()).unwrap_or(true) {
        return Value::Null;
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::Number(v.into());
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Value::Array(v.into_iter().map(Value::from).collect());
    }

    Value::String("<unsupported>".to_string())
}
