//! ClickHouse source reader.
//!
//! Queries run over the HTTP interface and results are streamed in the
//! `JSONCompactEachRowWithNamesAndTypes` format: a JSON array of column names,
//! a JSON array of column types, then one JSON array per row. The type line
//! feeds the row type inferer; rows are handed on as raw JSON cells.
//!
//! The `clickhouse` client treats `?` as a bind placeholder, so generated SQL
//! must not contain a literal `?`.

use async_trait::async_trait;
use clickhouse::Client;
use serde_json::Value as Json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::{ColumnMeta, RowStream, SourceReader};
use crate::error::{Result, SyncError};

/// Output format used for every row query.
pub const ROW_FORMAT: &str = "JSONCompactEachRowWithNamesAndTypes";

/// ClickHouse implementation of [`SourceReader`].
#[derive(Clone)]
pub struct ClickHouseReader {
    client: Client,
}

impl ClickHouseReader {
    /// Build the client and verify connectivity.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let reader = Self::from_config(config);
        reader.ping().await?;

        info!(
            "Connected to ClickHouse source: {}/{}",
            config.url, config.database
        );
        Ok(reader)
    }

    /// Build the client without connecting.
    pub fn from_config(config: &SourceConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_user(&config.user)
            .with_database(&config.database)
            // Keep Decimal/Int128+ exact by receiving them as strings.
            .with_option("output_format_json_quote_decimals", "1")
            .with_option("output_format_json_quote_64bit_integers", "1")
            .with_option("date_time_output_format", "simple")
            // DateTime values without an explicit column zone are read and written in UTC.
            .with_option("session_timezone", "UTC");

        if !config.password.is_empty() {
            client = client.with_password(&config.password);
        }

        Self { client }
    }
}

#[async_trait]
impl SourceReader for ClickHouseReader {
    async fn count(&self, sql: &str) -> Result<u64> {
        debug!("ClickHouse count: {}", sql);
        let count = self.client.query(sql).fetch_one::<u64>().await?;
        Ok(count)
    }

    async fn query(&self, sql: &str) -> Result<Box<dyn RowStream>> {
        debug!("ClickHouse query: {}", sql);
        let cursor = self.client.query(sql).fetch_bytes(ROW_FORMAT)?;
        let stream = JsonRowStream::open(cursor.lines()).await?;
        Ok(Box::new(stream))
    }

    async fn ping(&self) -> Result<()> {
        self.client.query("SELECT 1").fetch_one::<u8>().await?;
        Ok(())
    }
}

/// Row stream over `JSONCompactEachRowWithNamesAndTypes` lines.
pub struct JsonRowStream<R> {
    lines: Lines<R>,
    columns: Vec<ColumnMeta>,
}

impl<R> JsonRowStream<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Consume the two header lines and position the stream on the first row.
    pub async fn open(mut lines: Lines<R>) -> Result<Self> {
        let names = match read_json_line(&mut lines).await? {
            Some(names) => header_strings(names, "names")?,
            None => {
                return Ok(Self {
                    lines,
                    columns: Vec::new(),
                })
            }
        };

        let types = match read_json_line(&mut lines).await? {
            Some(types) => header_strings(types, "types")?,
            None => return Err(stream_error("missing type header line")),
        };

        if names.len() != types.len() {
            return Err(stream_error(format!(
                "{} column names but {} column types",
                names.len(),
                types.len()
            )));
        }

        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, type_name)| ColumnMeta::new(name, type_name))
            .collect();

        Ok(Self { lines, columns })
    }
}

#[async_trait]
impl<R> RowStream for JsonRowStream<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<Json>>> {
        match read_json_line(&mut self.lines).await? {
            Some(Json::Array(cells)) => Ok(Some(cells)),
            Some(other) => Err(stream_error(format!("expected a row array, got {}", other))),
            None => Ok(None),
        }
    }
}

/// Next non-empty line parsed as JSON, or `None` at end of stream.
async fn read_json_line<R>(lines: &mut Lines<R>) -> Result<Option<Json>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| stream_error(format!("reading result stream: {}", e)))?;

        match line {
            None => return Ok(None),
            Some(l) if l.trim().is_empty() => continue,
            Some(l) => {
                return serde_json::from_str(&l)
                    .map(Some)
                    .map_err(|e| stream_error(format!("malformed result line: {}", e)))
            }
        }
    }
}

fn header_strings(value: Json, what: &str) -> Result<Vec<String>> {
    match value {
        Json::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Json::String(s) => Ok(s),
                other => Err(stream_error(format!("non-string column {}: {}", what, other))),
            })
            .collect(),
        other => Err(stream_error(format!("expected column {} array, got {}", what, other))),
    }
}

fn stream_error(message: impl Into<String>) -> SyncError {
    SyncError::extract("clickhouse", message)
}
