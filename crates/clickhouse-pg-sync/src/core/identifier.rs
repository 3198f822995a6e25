//! Identifier validation and quoting for generated SQL.
//!
//! Identifiers cannot be bound as statement parameters, so every destination
//! table, column and index name is validated and quoted here before it is
//! spliced into DDL, COPY or merge statements.
//!
//! Source column names are deliberately not quoted: the `source` side of a
//! column mapping may be a ClickHouse expression (`toString(id)`), and it is
//! emitted into the SELECT list verbatim.

use crate::error::{Result, SyncError};

/// PostgreSQL truncates identifiers beyond 63 bytes.
pub const PG_MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier for obviously unsafe content.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers longer than PostgreSQL keeps.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(SyncError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > PG_MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            PG_MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a list of identifiers and join them with `", "`.
pub fn quote_pg_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    let quoted: Result<Vec<String>> = names.iter().map(|n| quote_pg(n.as_ref())).collect();
    Ok(quoted?.join(", "))
}

/// Render a single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Build an index name, truncated to fit PostgreSQL's identifier limit.
pub fn index_name(table: &str, index: &str) -> String {
    let mut name = format!("{}_{}", table, index);
    if name.len() > PG_MAX_IDENTIFIER_LENGTH {
        let mut cut = PG_MAX_IDENTIFIER_LENGTH;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}
