//! Per-batch staging tables.
//!
//! Every batch is bulk-loaded into its own session-scoped temporary table
//! shaped like the destination (`LIKE ... INCLUDING DEFAULTS`). The table
//! carries one extra identity column recording COPY order, which the merge
//! uses to keep the last occurrence of a duplicated key.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::identifier::{qualify_pg, quote_pg, PG_MAX_IDENTIFIER_LENGTH};
use crate::core::{RowBatch, TableSpec, TargetSession};
use crate::error::Result;

use super::copy::{copy_statement, encode_batch};
use super::with_cancel;

/// Identity column appended to every staging table.
pub const STAGING_ORDINAL_COLUMN: &str = "__staging_ordinal";

const STAGING_PREFIX: &str = "_staging_";

/// A loaded staging table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTable {
    /// Unqualified temporary table name.
    pub name: String,
    /// Rows copied into it.
    pub rows: u64,
}

/// Unique staging table name: `_staging_<destination>_<8 hex chars>`.
///
/// The destination part is shortened so the whole name stays a valid
/// PostgreSQL identifier.
pub fn staging_name(destination: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..8];

    let budget = PG_MAX_IDENTIFIER_LENGTH - STAGING_PREFIX.len() - 1 - suffix.len();
    let mut cut = destination.len().min(budget);
    while !destination.is_char_boundary(cut) {
        cut -= 1;
    }

    format!("{}{}_{}", STAGING_PREFIX, &destination[..cut], suffix)
}

/// DDL creating the staging table for `qualified_destination`.
pub fn create_staging_sql(name: &str, qualified_destination: &str) -> Result<String> {
    Ok(format!(
        "CREATE TEMP TABLE {} (LIKE {} INCLUDING DEFAULTS, {} BIGINT GENERATED ALWAYS AS IDENTITY)",
        quote_pg(name)?,
        qualified_destination,
        quote_pg(STAGING_ORDINAL_COLUMN)?
    ))
}

pub fn drop_staging_sql(name: &str) -> Result<String> {
    Ok(format!("DROP TABLE IF EXISTS {}", quote_pg(name)?))
}

/// Loads batches into staging tables on a caller-provided session.
#[derive(Debug, Clone)]
pub struct StagingLoader {
    schema: String,
}

impl StagingLoader {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Create a staging table and COPY `batch` into it.
    ///
    /// Creation failure aborts without attempting the copy. On copy failure
    /// the staging table is dropped best-effort before the error is returned.
    pub async fn load(
        &self,
        table: &TableSpec,
        session: &mut dyn TargetSession,
        batch: &RowBatch,
        cancel: &CancellationToken,
    ) -> Result<StagingTable> {
        let name = staging_name(&table.destination);
        let destination = qualify_pg(&self.schema, &table.destination)?;

        let create = create_staging_sql(&name, &destination)?;
        with_cancel(cancel, session.execute(&create)).await?;

        let copy_sql = copy_statement(&quote_pg(&name)?, &table.destination_columns())?;
        let payload = encode_batch(batch);

        match with_cancel(cancel, session.copy_in(&copy_sql, payload)).await {
            Ok(rows) => {
                debug!(
                    "{}: batch {} staged {} rows in {}",
                    table.destination, batch.sequence, rows, name
                );
                Ok(StagingTable { name, rows })
            }
            Err(e) => {
                // Not raced against `cancel`: a cancelled copy still drops its table.
                if let Err(drop_err) = session.execute(&drop_staging_sql(&name)?).await {
                    warn!("{}: failed to drop staging table {}: {}", table.destination, name, drop_err);
                }
                Err(e)
            }
        }
    }
}
