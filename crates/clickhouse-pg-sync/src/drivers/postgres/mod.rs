//! PostgreSQL driver.
//!
//! - [`PgTargetPool`]: pooled destination connections
//! - [`PgSession`]: statement execution and text COPY on one connection

mod writer;

pub use writer::{PgSession, PgTargetPool};
