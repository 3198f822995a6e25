//! ClickHouse driver.
//!
//! - [`ClickHouseReader`]: source reader over the HTTP interface

mod reader;

pub use reader::{ClickHouseReader, JsonRowStream};
