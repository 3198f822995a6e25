//! Store drivers implementing the core traits.
//!
//! - [`clickhouse`]: ClickHouse source reader
//! - [`postgres`]: PostgreSQL destination pool
//! - [`common`]: shared utilities (TLS)

pub mod clickhouse;
pub mod common;
pub mod postgres;

pub use self::clickhouse::ClickHouseReader;
pub use common::SslMode;
pub use postgres::PgTargetPool;
