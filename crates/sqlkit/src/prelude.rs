//! Convenient imports for typical `sqlkit` usage.
//!
//! ```ignore
//! use sqlkit::prelude::*;
//! ```

pub use crate::{
    Blueprint, Connection, ConnectionConfig, Dialect, FromRow, Migration, Migrator, QueryBuilder,
    QueryWatcher, Row, Schema, SqlError, SqlResult, Value, WatcherConfig,
};
