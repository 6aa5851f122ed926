//! Physical database handles.
//!
//! A [`Driver`] executes already-compiled SQL (with `?` placeholders) and
//! bound [`Value`]s. Everything above this seam (quoting, validation,
//! transaction bookkeeping, observation) lives in [`Connection`](crate::Connection).
//!
//! Built-in drivers:
//! - [`SqliteDriver`] (rusqlite, bundled SQLite)
//! - [`PostgresDriver`] (tokio-postgres, feature `postgres`)
//!
//! MySQL has no built-in handle; supply one through
//! [`Connection::with_driver`](crate::Connection::with_driver).

mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

pub use sqlite::SqliteDriver;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;

use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::row::Row;
use crate::value::Value;

/// A single physical connection.
///
/// Calls are blocking round trips. Implementations are not expected to be
/// thread-safe; a [`Connection`](crate::Connection) owns exactly one driver.
pub trait Driver {
    /// Dialect this handle speaks.
    fn dialect(&self) -> Dialect;

    /// Run a row-returning statement.
    fn query(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64>;

    /// Run one or more `;`-separated statements without parameters.
    fn execute_batch(&mut self, sql: &str) -> SqlResult<()>;

    /// Key generated by the most recent insert, if the driver tracks one.
    fn last_insert_id(&mut self) -> SqlResult<Option<i64>>;
}

/// Open the built-in driver for `config.driver`.
pub fn open(config: &ConnectionConfig) -> SqlResult<Box<dyn Driver>> {
    match config.driver {
        Dialect::Sqlite => Ok(Box::new(SqliteDriver::open(&config.database)?)),
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Ok(Box::new(PostgresDriver::connect(&config.connection_string()?)?)),
        #[cfg(not(feature = "postgres"))]
        Dialect::Postgres => Err(SqlError::UnsupportedDriver(
            "pgsql (built without the `postgres` feature)".to_string(),
        )),
        Dialect::MySql => Err(SqlError::UnsupportedDriver(
            "mysql has no built-in handle; use Connection::with_driver".to_string(),
        )),
    }
}
