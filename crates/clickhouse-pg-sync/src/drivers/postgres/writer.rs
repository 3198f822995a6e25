//! PostgreSQL destination pool.
//!
//! Uses deadpool-postgres for connection pooling. Each worker acquires its
//! own [`PgSession`] per batch, so temporary staging tables stay private to
//! the batch that created them.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::Config as PgConfig;
use tracing::info;

use crate::config::TargetConfig;
use crate::core::{TargetPool, TargetSession};
use crate::drivers::common::{make_connector, SslMode};
use crate::error::{Result, SyncError};

/// Connection timeout for new pool connections.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// deadpool-backed [`TargetPool`].
#[derive(Clone)]
pub struct PgTargetPool {
    pool: Pool,
}

impl PgTargetPool {
    /// Create the pool from configuration and verify connectivity.
    pub async fn new(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("clickhouse-pg-sync");

        let target = Self::from_pg_config(pg_config, config.ssl_mode, max_conns)?;
        target.ping().await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{} (pool size {})",
            config.host, config.port, config.database, max_conns
        );
        Ok(target)
    }

    /// Create the pool from a connection URL, e.g. `postgres://user:pw@host/db`.
    pub fn from_url(url: &str, ssl_mode: SslMode, max_conns: usize) -> Result<Self> {
        let pg_config: PgConfig = url
            .parse()
            .map_err(|e| SyncError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;
        Self::from_pg_config(pg_config, ssl_mode, max_conns)
    }

    fn from_pg_config(mut pg_config: PgConfig, ssl_mode: SslMode, max_conns: usize) -> Result<Self> {
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match make_connector(ssl_mode)? {
            None => Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config),
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        };

        let pool = Pool::builder(mgr)
            .max_size(max_conns.max(1))
            .build()
            .map_err(|e| SyncError::pool(e, "creating PostgreSQL target pool"))?;

        Ok(Self { pool })
    }

    async fn get(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, context))
    }
}

#[async_trait]
impl TargetPool for PgTargetPool {
    async fn acquire(&self) -> Result<Box<dyn TargetSession>> {
        let client = self.get("acquiring PostgreSQL connection").await?;
        Ok(Box::new(PgSession { client }))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.get("testing PostgreSQL target connection").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

/// One pooled connection, returned to the pool on drop.
pub struct PgSession {
    client: Object,
}

#[async_trait]
impl TargetSession for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.client.execute(sql, &[]).await?)
    }

    async fn copy_in(&mut self, sql: &str, data: Bytes) -> Result<u64> {
        let sink = self.client.copy_in(sql).await?;
        tokio::pin!(sink);
        sink.send(data).await?;
        Ok(sink.finish().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnSpec, RowBatch, TableSpec, Value};
    use crate::pipeline::ddl::ensure_schema;
    use crate::pipeline::merge::MergeEngine;
    use crate::pipeline::stage::StagingLoader;
    use chrono::NaiveDate;
    use tokio_util::sync::CancellationToken;

    // Run with: PG_TEST_URL=postgres://user:pw@localhost/db cargo test -- --ignored
    fn live_pool() -> Option<PgTargetPool> {
        let url = std::env::var("PG_TEST_URL").ok()?;
        Some(PgTargetPool::from_url(&url, SslMode::Disable, 4).expect("valid PG_TEST_URL"))
    }

    fn column(name: &str, data_type: &str, primary: bool) -> ColumnSpec {
        ColumnSpec {
            source: name.to_string(),
            destination: name.to_string(),
            data_type: data_type.to_string(),
            primary,
        }
    }

    fn live_table() -> TableSpec {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        TableSpec {
            source: "events".to_string(),
            destination: format!("sync_live_{}", &suffix[..8]),
            indexes: vec![],
            columns: vec![
                column("id", "bigint", true),
                column("name", "text", false),
                column("updated_at", "timestamp", false),
            ],
            cursor: None,
        }
    }

    fn row(id: i64, name: &str, day: u32) -> Vec<Value> {
        let ts = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        vec![
            Value::Int(id),
            Value::Text(name.to_string()),
            Value::DateTime(ts),
        ]
    }

    async fn apply(pool: &PgTargetPool, table: &TableSpec, batch: &RowBatch) -> u64 {
        let cancel = CancellationToken::new();
        let mut session = pool.acquire().await.unwrap();
        let staging = StagingLoader::new("public")
            .load(table, session.as_mut(), batch, &cancel)
            .await
            .unwrap();
        MergeEngine::new("public")
            .merge(table, session.as_mut(), &staging, &cancel)
            .await
            .unwrap()
    }

    async fn contents(pool: &PgTargetPool, table: &TableSpec) -> Vec<(i64, String)> {
        let client = pool.get("reading test table").await.unwrap();
        let sql = format!(
            "SELECT id, name FROM public.\"{}\" ORDER BY id",
            table.destination
        );
        client
            .query(sql.as_str(), &[])
            .await
            .unwrap()
            .iter()
            .map(|r| (r.get::<_, i64>(0), r.get::<_, String>(1)))
            .collect()
    }

    async fn setup(pool: &PgTargetPool, table: &TableSpec) {
        let mut session = pool.acquire().await.unwrap();
        ensure_schema(table, session.as_mut(), "public", &CancellationToken::new())
            .await
            .unwrap();
    }

    async fn teardown(pool: &PgTargetPool, table: &TableSpec) {
        let mut session = pool.acquire().await.unwrap();
        let sql = format!("DROP TABLE IF EXISTS public.\"{}\"", table.destination);
        session.execute(&sql).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_upsert_scenario() {
        let Some(pool) = live_pool() else { return };
        let table = live_table();
        setup(&pool, &table).await;

        apply(&pool, &table, &RowBatch::new(0, vec![row(1, "a", 1), row(2, "b", 1)])).await;
        apply(&pool, &table, &RowBatch::new(1, vec![row(1, "a2", 2), row(3, "c", 2)])).await;

        assert_eq!(
            contents(&pool, &table).await,
            vec![
                (1, "a2".to_string()),
                (2, "b".to_string()),
                (3, "c".to_string())
            ]
        );
        teardown(&pool, &table).await;
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_merge_is_idempotent() {
        let Some(pool) = live_pool() else { return };
        let table = live_table();
        setup(&pool, &table).await;

        let batch = RowBatch::new(0, vec![row(1, "a", 1), row(2, "b", 1)]);
        apply(&pool, &table, &batch).await;
        let first = contents(&pool, &table).await;
        apply(&pool, &table, &batch).await;

        assert_eq!(contents(&pool, &table).await, first);
        assert_eq!(first.len(), 2);
        teardown(&pool, &table).await;
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_duplicate_keys_keep_last_row() {
        let Some(pool) = live_pool() else { return };
        let table = live_table();
        setup(&pool, &table).await;

        let merged = apply(
            &pool,
            &table,
            &RowBatch::new(0, vec![row(4, "x", 1), row(5, "z", 1), row(4, "y", 2)]),
        )
        .await;

        assert_eq!(merged, 2);
        assert_eq!(
            contents(&pool, &table).await,
            vec![(4, "y".to_string()), (5, "z".to_string())]
        );
        teardown(&pool, &table).await;
    }
}
