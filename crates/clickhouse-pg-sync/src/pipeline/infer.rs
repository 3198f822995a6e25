//! Row type inference: choose a typed scan target per result-set column.
//!
//! ClickHouse reports a type string for every column of a result set
//! (`Nullable(Int32)`, `Array(String)`, `Map(String, UInt64)`, ...). The
//! inferer parses each one into a closed [`ScanType`] once per extraction and
//! builds a [`ScanTarget`] holding the column's prototype value. The targets
//! are then reused to scan every subsequent row of the same shape.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as Json;
use tracing::info;
use uuid::Uuid;

use crate::core::{ColumnMeta, Value};
use crate::error::{Result, SyncError};

/// Scalar families a cell can be scanned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    /// Decimals and integers wider than 64 bits, kept as text.
    Decimal,
    Text,
    Uuid,
    Date,
    DateTime,
    /// Tuples, JSON objects and anything else composite.
    Json,
}

/// The shape of a reported column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanType {
    Scalar(ScalarKind),
    Nullable(Box<ScanType>),
    Array(Box<ScanType>),
    Map(Box<ScanType>, Box<ScanType>),
}

impl ScanType {
    /// Parse a ClickHouse type string.
    ///
    /// `LowCardinality(T)` is transparent. Unrecognized types scan as text.
    pub fn parse(type_name: &str) -> ScanType {
        let type_name = type_name.trim();
        let (name, args) = split_type(type_name);

        match name {
            "Nullable" => ScanType::Nullable(Box::new(Self::parse_arg(&args, 0))),
            "LowCardinality" => Self::parse_arg(&args, 0),
            "SimpleAggregateFunction" => Self::parse_arg(&args, 1),
            "Array" => ScanType::Array(Box::new(Self::parse_arg(&args, 0))),
            "Map" => ScanType::Map(
                Box::new(Self::parse_arg(&args, 0)),
                Box::new(Self::parse_arg(&args, 1)),
            ),
            _ => ScanType::Scalar(scalar_kind(name)),
        }
    }

    fn parse_arg(args: &[&str], idx: usize) -> ScanType {
        args.get(idx)
            .map(|a| ScanType::parse(a))
            .unwrap_or(ScanType::Scalar(ScalarKind::Text))
    }

    /// Zero value of this type, used as the column prototype.
    pub fn zero(&self) -> Value {
        match self {
            ScanType::Nullable(inner) => inner.zero(),
            ScanType::Array(_) => Value::Array(Vec::new()),
            ScanType::Map(_, _) => Value::Map(Vec::new()),
            ScanType::Scalar(kind) => match kind {
                ScalarKind::Bool => Value::Bool(false),
                ScalarKind::Int => Value::Int(0),
                ScalarKind::UInt => Value::UInt(0),
                ScalarKind::Float => Value::Float(0.0),
                ScalarKind::Decimal => Value::Decimal("0".to_string()),
                ScalarKind::Text => Value::Text(String::new()),
                ScalarKind::Uuid => Value::Uuid(Uuid::nil()),
                ScalarKind::Date => Value::Date(NaiveDate::default()),
                ScalarKind::DateTime => Value::DateTime(NaiveDateTime::default()),
                ScalarKind::Json => Value::Json(Json::Null),
            },
        }
    }
}

/// Reusable scan target for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTarget {
    /// Column name, for error messages.
    pub column: String,
    /// Type after unwrapping one optional level.
    pub scan_type: ScanType,
    /// Whether the reported type was an optional wrapper.
    pub nullable: bool,
    /// Zero value of `scan_type`.
    pub prototype: Value,
}

impl ScanTarget {
    /// Build the target for one column's reported type.
    pub fn for_column(meta: &ColumnMeta) -> Self {
        let (scan_type, nullable) = match ScanType::parse(&meta.type_name) {
            ScanType::Nullable(inner) => (*inner, true),
            other => (other, false),
        };
        let prototype = scan_type.zero();

        Self {
            column: meta.name.clone(),
            scan_type,
            nullable,
            prototype,
        }
    }

    /// Scan one raw cell.
    pub fn scan(&self, raw: &Json) -> Result<Value> {
        if raw.is_null() {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(SyncError::scan(&self.column, "NULL in non-nullable column"))
            };
        }
        scan_value(&self.scan_type, raw, &self.column)
    }
}

/// Infer scan targets for a result set. Runs once per extraction.
pub fn infer_scan_targets(columns: &[ColumnMeta]) -> Vec<ScanTarget> {
    info!("Inferring scan targets for {} columns", columns.len());

    columns
        .iter()
        .enumerate()
        .map(|(index, meta)| {
            let target = ScanTarget::for_column(meta);
            info!(
                index,
                name = %meta.name,
                reported = %meta.type_name,
                nullable = target.nullable,
                prototype = ?target.prototype,
                "Inferred scan target"
            );
            target
        })
        .collect()
}

/// Scan a full raw row with previously inferred targets.
pub fn scan_row(targets: &[ScanTarget], raw: &[Json]) -> Result<Vec<Value>> {
    if raw.len() != targets.len() {
        return Err(SyncError::scan(
            "<row>",
            format!("expected {} cells, got {}", targets.len(), raw.len()),
        ));
    }

    targets
        .iter()
        .zip(raw)
        .map(|(target, cell)| target.scan(cell))
        .collect()
}

fn scan_value(ty: &ScanType, raw: &Json, column: &str) -> Result<Value> {
    match ty {
        ScanType::Nullable(inner) => {
            if raw.is_null() {
                Ok(Value::Null)
            } else {
                scan_value(inner, raw, column)
            }
        }
        ScanType::Array(elem) => match raw {
            Json::Array(items) => items
                .iter()
                .map(|item| scan_value(elem, item, column))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Err(mismatch(column, "array", other)),
        },
        ScanType::Map(key_ty, value_ty) => match raw {
            Json::Object(entries) => entries
                .iter()
                .map(|(k, v)| {
                    let key = scan_value(key_ty, &Json::String(k.clone()), column)?;
                    let value = scan_value(value_ty, v, column)?;
                    Ok((key, value))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Map),
            other => Err(mismatch(column, "map", other)),
        },
        ScanType::Scalar(kind) => scan_scalar(*kind, raw, column),
    }
}

fn scan_scalar(kind: ScalarKind, raw: &Json, column: &str) -> Result<Value> {
    if raw.is_null() && kind != ScalarKind::Json {
        return Err(SyncError::scan(column, "NULL in non-nullable value"));
    }

    match kind {
        ScalarKind::Bool => match raw {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => Ok(Value::Bool(n.as_u64().unwrap_or(0) != 0)),
            Json::String(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch(column, "bool", raw)),
            },
            other => Err(mismatch(column, "bool", other)),
        },
        ScalarKind::Int => match raw {
            Json::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| mismatch(column, "signed integer", raw)),
            Json::String(s) => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| mismatch(column, "signed integer", raw)),
            other => Err(mismatch(column, "signed integer", other)),
        },
        ScalarKind::UInt => match raw {
            Json::Number(n) => n
                .as_u64()
                .map(Value::UInt)
                .ok_or_else(|| mismatch(column, "unsigned integer", raw)),
            Json::String(s) => s
                .parse::<u64>()
                .map(Value::UInt)
                .map_err(|_| mismatch(column, "unsigned integer", raw)),
            other => Err(mismatch(column, "unsigned integer", other)),
        },
        ScalarKind::Float => match raw {
            Json::Number(n) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| mismatch(column, "float", raw)),
            Json::String(s) => match s.as_str() {
                "nan" | "-nan" => Ok(Value::Float(f64::NAN)),
                "inf" | "+inf" => Ok(Value::Float(f64::INFINITY)),
                "-inf" => Ok(Value::Float(f64::NEG_INFINITY)),
                other => other
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| mismatch(column, "float", raw)),
            },
            other => Err(mismatch(column, "float", other)),
        },
        ScalarKind::Decimal => match raw {
            Json::Number(n) => Ok(Value::Decimal(n.to_string())),
            Json::String(s) if is_numeric_literal(s) => Ok(Value::Decimal(s.clone())),
            other => Err(mismatch(column, "decimal", other)),
        },
        ScalarKind::Text => match raw {
            Json::String(s) => Ok(Value::Text(s.clone())),
            Json::Number(n) => Ok(Value::Text(n.to_string())),
            Json::Bool(b) => Ok(Value::Text(b.to_string())),
            other => Ok(Value::Text(other.to_string())),
        },
        ScalarKind::Uuid => match raw {
            Json::String(s) => Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|_| mismatch(column, "uuid", raw)),
            other => Err(mismatch(column, "uuid", other)),
        },
        ScalarKind::Date => match raw {
            Json::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| mismatch(column, "date", raw)),
            other => Err(mismatch(column, "date", other)),
        },
        ScalarKind::DateTime => match raw {
            Json::String(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map(Value::DateTime)
                .map_err(|_| mismatch(column, "datetime", raw)),
            Json::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| Value::DateTime(dt.naive_utc()))
                .ok_or_else(|| mismatch(column, "datetime", raw)),
            other => Err(mismatch(column, "datetime", other)),
        },
        ScalarKind::Json => Ok(Value::Json(raw.clone())),
    }
}

fn mismatch(column: &str, expected: &str, raw: &Json) -> SyncError {
    SyncError::scan(column, format!("expected {}, got {}", expected, raw))
}

fn is_numeric_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
}

/// Map a bare ClickHouse type name to its scalar family.
fn scalar_kind(name: &str) -> ScalarKind {
    match name {
        "Bool" | "Boolean" => ScalarKind::Bool,
        "Int8" | "Int16" | "Int32" | "Int64" => ScalarKind::Int,
        "UInt8" | "UInt16" | "UInt32" | "UInt64" => ScalarKind::UInt,
        "Int128" | "Int256" | "UInt128" | "UInt256" => ScalarKind::Decimal,
        "Float32" | "Float64" => ScalarKind::Float,
        "UUID" => ScalarKind::Uuid,
        "Date" | "Date32" => ScalarKind::Date,
        "DateTime" | "DateTime64" => ScalarKind::DateTime,
        "Tuple" | "Nested" | "JSON" | "Object" | "Variant" | "Dynamic" => ScalarKind::Json,
        n if n.starts_with("Decimal") => ScalarKind::Decimal,
        _ => ScalarKind::Text,
    }
}

/// Split `Name(arg1, arg2)` into the name and its top-level arguments.
fn split_type(type_name: &str) -> (&str, Vec<&str>) {
    let Some(open) = type_name.find('(') else {
        return (type_name, Vec::new());
    };
    let name = type_name[..open].trim();
    let inner = type_name[open + 1..]
        .strip_suffix(')')
        .unwrap_or(&type_name[open + 1..]);

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut start = 0usize;
    let bytes = inner.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' if i == 0 || bytes[i - 1] != b'\\' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => depth = depth.saturating_sub(1),
            b',' if !in_quote && depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() {
        args.push(last);
    }

    (name, args)
}
