//! Staging → destination merge.
//!
//! With a primary key the merge is a single deduplicating upsert:
//!
//! ```sql
//! INSERT INTO dest (cols)
//! SELECT DISTINCT ON (pk) cols FROM staging
//! ORDER BY pk, "__staging_ordinal" DESC
//! ON CONFLICT (pk) DO UPDATE SET col = EXCLUDED.col, ...
//! ```
//!
//! Ordering by the staging ordinal keeps the last row of the batch for each
//! key. Without a primary key the merge is a plain append.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::identifier::{qualify_pg, quote_pg, quote_pg_list};
use crate::core::{TableSpec, TargetSession};
use crate::error::Result;

use super::stage::{drop_staging_sql, StagingTable, STAGING_ORDINAL_COLUMN};
use super::with_cancel;

/// Build the merge statement for one staging table.
pub fn merge_sql(table: &TableSpec, qualified_destination: &str, staging: &str) -> Result<String> {
    let columns = table.destination_columns();
    let pk = table.primary_key();
    let col_list = quote_pg_list(&columns)?;
    let staging = quote_pg(staging)?;

    if pk.is_empty() {
        return Ok(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            qualified_destination, col_list, col_list, staging
        ));
    }

    let pk_list = quote_pg_list(&pk)?;
    let update_cols = columns
        .iter()
        .filter(|c| !pk.contains(c))
        .map(|c| {
            let quoted = quote_pg(c)?;
            Ok(format!("{} = EXCLUDED.{}", quoted, quoted))
        })
        .collect::<Result<Vec<String>>>()?;

    let conflict = if update_cols.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", update_cols.join(", "))
    };

    Ok(format!(
        "INSERT INTO {} ({}) SELECT DISTINCT ON ({}) {} FROM {} ORDER BY {}, {} DESC ON CONFLICT ({}) {}",
        qualified_destination,
        col_list,
        pk_list,
        col_list,
        staging,
        pk_list,
        quote_pg(STAGING_ORDINAL_COLUMN)?,
        pk_list,
        conflict
    ))
}

/// Applies staging tables to their destination.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    schema: String,
}

impl MergeEngine {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Merge `staging` into the destination, then drop it.
    ///
    /// Returns the number of destination rows inserted or updated. The
    /// staging table is dropped whether or not the merge succeeded.
    pub async fn merge(
        &self,
        table: &TableSpec,
        session: &mut dyn TargetSession,
        staging: &StagingTable,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let destination = qualify_pg(&self.schema, &table.destination)?;
        let sql = merge_sql(table, &destination, &staging.name)?;

        let result = with_cancel(cancel, session.execute(&sql)).await;

        // Runs even when `cancel` fired so no staging table outlives the batch.
        if let Err(e) = session.execute(&drop_staging_sql(&staging.name)?).await {
            warn!(
                "{}: failed to drop staging table {}: {}",
                table.destination, staging.name, e
            );
        }

        let merged = result?;
        debug!(
            "{}: merged {} of {} staged rows from {}",
            table.destination, merged, staging.rows, staging.name
        );
        Ok(merged)
    }
}
