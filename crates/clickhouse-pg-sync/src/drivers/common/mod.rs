//! Shared driver utilities.
//!
//! - [`tls`]: rustls configuration for PostgreSQL connections

pub mod tls;

pub use tls::{make_connector, SslMode};
