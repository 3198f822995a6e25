//! Dynamically-typed row values moved between the two stores.
//!
//! Rows are scanned from the source into [`Value`]s using the prototypes chosen
//! by the row type inferer, grouped into [`RowBatch`]es, and rendered into the
//! PostgreSQL COPY text format by the staging loader.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

/// A single scanned cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL (only produced for nullable columns).
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (Int8 through Int64).
    Int(i64),

    /// Unsigned integer (UInt8 through UInt64).
    UInt(u64),

    /// Floating point (Float32, Float64).
    Float(f64),

    /// Decimal kept in its textual form to avoid precision loss.
    ///
    /// Also carries 128/256-bit integers, which do not fit `i64`/`u64`.
    Decimal(String),

    /// Text data (String, FixedString, Enum, IP addresses).
    Text(String),

    /// UUID value.
    Uuid(Uuid),

    /// Calendar date.
    Date(NaiveDate),

    /// Timestamp without time zone (DateTime, DateTime64).
    DateTime(NaiveDateTime),

    /// Variable-length sequence (Array).
    Array(Vec<Value>),

    /// Keyed mapping (Map), entries in source order.
    Map(Vec<(Value, Value)>),

    /// Composite values without a dedicated variant (Tuple, JSON).
    Json(serde_json::Value),
}

impl Value {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret the value as a UTC timestamp, for cursor tracking.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt.and_utc()),
            Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            _ => None,
        }
    }
}

/// One scanned row, aligned to the table's column order.
pub type Row = Vec<Value>;

/// A bounded group of rows moved as one unit from extraction to merge.
///
/// Batches are immutable once handed to a worker; ownership moves with them.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    /// Zero-based position of this batch in extraction order.
    pub sequence: u64,

    /// Rows in result order.
    pub rows: Vec<Row>,
}

impl RowBatch {
    /// Create a new batch with the given rows.
    pub fn new(sequence: u64, rows: Vec<Row>) -> Self {
        Self { sequence, rows }
    }

    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_timestamp() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(Value::DateTime(dt).as_timestamp(), Some(dt.and_utc()));

        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            Value::Date(d).as_timestamp().unwrap().to_string(),
            "2024-03-01 00:00:00 UTC"
        );

        assert_eq!(Value::Int(5).as_timestamp(), None);
        assert_eq!(Value::Null.as_timestamp(), None);
    }

    #[test]
    fn test_batch_len() {
        let batch = RowBatch::new(0, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert!(RowBatch::new(1, vec![]).is_empty());
    }
}
