//! # sqlkit
//!
//! A transactional SQL query engine for MySQL, PostgreSQL and SQLite.
//!
//! ## Features
//!
//! - **Injection-safe builder**: every identifier and operator goes through an
//!   allow-list; every value (including LIMIT/OFFSET) is a bound parameter
//! - **Nested transactions**: the outermost scope is a real transaction, inner
//!   scopes are savepoints named from a per-connection random id
//! - **Query watcher**: N+1 pattern and slow-query detection per observation window
//! - **Migrations**: typed schema blueprints, SQL-file migrations, batch rollback
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use sqlkit::prelude::*;
//!
//! let conn = Connection::open(&ConnectionConfig::sqlite("app.db"))?;
//!
//! // SELECT
//! let users = conn
//!     .table("users")
//!     .where_("status", "=", "active")
//!     .order_by("created_at", "desc")
//!     .limit(10)
//!     .get()?;
//!
//! // INSERT
//! let id = conn.table("users").insert_get_id(&[
//!     ("username", "alice".into()),
//!     ("email", "alice@example.com".into()),
//! ])?;
//!
//! // UPDATE
//! conn.table("users")
//!     .where_("id", "=", id)
//!     .update(&[("status", "inactive".into())])?;
//!
//! // DELETE (requires a WHERE; use delete_all otherwise)
//! conn.table("users").where_("id", "=", id).delete()?;
//! ```
//!
//! ## Transactions
//!
//! ```ignore
//! conn.transaction(|c| {
//!     c.insert("orders", &order)?;
//!     c.transaction(|c| c.insert("audit", &entry))?; // savepoint
//!     Ok(())
//! })?;
//! ```
//!
//! ## Long-lived processes
//!
//! Call [`Connection::reset_request_state`] between units of work: it rolls
//! back anything left open and clears the query log and watcher window.

pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod ident;
pub mod migrate;
pub mod monitor;
pub mod prelude;
pub mod qb;
pub mod row;
pub mod schema;
pub mod transaction;
pub mod value;

pub use config::ConnectionConfig;
pub use connection::{Connection, LoggedQuery};
pub use dialect::Dialect;
pub use driver::{Driver, SqliteDriver};
pub use error::{SqlError, SqlResult, ValidationError};
pub use ident::{
    Expression, Ident, IdentKind, MAX_IDENTIFIER_LENGTH, Operator, TableRef, validate_identifier,
    validate_operator,
};
pub use migrate::{Migration, MigrationStatus, Migrator, RunOptions, SqlMigration};
pub use monitor::{
    CallSite, CompositeObserver, LoggingObserver, NPlusOnePattern, QueryObservation, QueryObserver,
    QueryType, QueryWatcher, SlowQuery, WatcherConfig, WatcherReport, normalize_sql,
};
pub use qb::{CompiledQuery, Paginator, QueryBuilder, StatementDescriptor};
pub use row::{FromRow, FromValue, Row};
pub use schema::{Blueprint, ForeignKeyAction, Schema};
pub use value::Value;

#[cfg(feature = "postgres")]
pub use driver::PostgresDriver;
