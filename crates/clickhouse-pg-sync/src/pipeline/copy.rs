//! PostgreSQL COPY text encoding for row batches.
//!
//! Each row becomes one line of tab-separated fields in the declared
//! destination column order, `\N` for NULL. Arrays are rendered as array
//! literals (`{a,"b c",NULL}`), maps and composite values as JSON text.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value as Json;

use crate::core::identifier::quote_pg_list;
use crate::core::{RowBatch, Value};
use crate::error::Result;

/// `COPY <table> (<cols>) FROM STDIN` in text format.
pub fn copy_statement(qualified_table: &str, columns: &[String]) -> Result<String> {
    Ok(format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
        qualified_table,
        quote_pg_list(columns)?
    ))
}

/// Encode a batch as a COPY text payload.
pub fn encode_batch(batch: &RowBatch) -> Bytes {
    let mut buf = BytesMut::with_capacity(batch.len() * 128);

    for row in &batch.rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                buf.put_u8(b'\t');
            }
            buf.put_slice(value_to_text(value).as_bytes());
        }
        buf.put_u8(b'\n');
    }

    buf.freeze()
}

/// Render one value as a COPY text field.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => "\\N".to_string(),
        Value::Array(items) => escape_copy_text(&array_literal(items)),
        Value::Map(_) | Value::Json(_) => escape_copy_text(&value_to_json(value).to_string()),
        scalar => match scalar_text(scalar) {
            Some(text) => escape_copy_text(&text),
            None => "\\N".to_string(),
        },
    }
}

/// Unescaped text of a scalar value, `None` for NULL.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => float_text(*f),
        Value::Decimal(d) => d.clone(),
        Value::Text(s) => s.clone(),
        Value::Uuid(u) => u.to_string(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        Value::Array(items) => array_literal(items),
        Value::Map(_) | Value::Json(_) => value_to_json(value).to_string(),
    };
    Some(text)
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

/// PostgreSQL array literal, e.g. `{1,2,NULL}` or `{"a b","c"}`.
fn array_literal(items: &[Value]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Null => "NULL".to_string(),
            Value::Array(inner) => array_literal(inner),
            other => {
                let text = scalar_text(other).unwrap_or_default();
                quote_array_element(&text)
            }
        })
        .collect();

    format!("{{{}}}", elements.join(","))
}

fn quote_array_element(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text.eq_ignore_ascii_case("null")
        || text
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());

    if !needs_quotes {
        return text.to_string();
    }

    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// JSON form of a value, used for maps and composite columns.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::UInt(u) => Json::from(*u),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Json(j) => j.clone(),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(entries) => {
            let object = entries
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::Text(s) => s.clone(),
                        other => scalar_text(other).unwrap_or_default(),
                    };
                    (key, value_to_json(v))
                })
                .collect();
            Json::Object(object)
        }
        other => scalar_text(other).map(Json::String).unwrap_or(Json::Null),
    }
}

/// Escape text for PostgreSQL COPY.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}
