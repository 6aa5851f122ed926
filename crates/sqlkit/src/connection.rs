//! The connection: one physical handle, transaction bookkeeping, observation.

use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::driver::{self, Driver};
use crate::error::{SqlError, SqlResult, ValidationError};
use crate::ident::{Ident, TableRef};
use crate::monitor::{CallSite, QueryObservation, QueryObserver, QueryType, QueryWatcher};
use crate::qb::QueryBuilder;
use crate::row::{FromRow, Row};
use crate::value::Value;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One entry of the in-memory query log.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
    #[serde(rename = "elapsed_ms", serialize_with = "crate::monitor::serialize_ms")]
    pub elapsed: Duration,
}

/// A database connection.
///
/// Owns exactly one [`Driver`] and the nesting depth of the transaction open
/// on it. Methods take `&self` so that query builders, transaction closures
/// and schema builders can all borrow the same connection; the type is
/// deliberately `!Sync`. Use one `Connection` per logical unit of work, or
/// serialize access externally.
///
/// # Example
///
/// ```ignore
/// use sqlkit::{Connection, ConnectionConfig, Value};
///
/// let conn = Connection::open(&ConnectionConfig::sqlite_memory())?;
/// conn.unprepared("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)")?;
///
/// conn.transaction(|c| {
///     c.insert("users", &[("email", "a@example.com".into())])?;
///     Ok(())
/// })?;
///
/// let rows = conn.table("users").where_("email", "LIKE", "%@example.com").get()?;
/// # Ok::<(), sqlkit::SqlError>(())
/// ```
pub struct Connection {
    driver: RefCell<Box<dyn Driver>>,
    dialect: Dialect,
    config: ConnectionConfig,
    id: String,
    pub(crate) transaction_level: Cell<u32>,
    logging: Cell<bool>,
    query_log: RefCell<Vec<LoggedQuery>>,
    watcher: Option<Arc<QueryWatcher>>,
    observers: Vec<Arc<dyn QueryObserver>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect)
            .field("id", &self.id)
            .field("transaction_level", &self.transaction_level.get())
            .field("logging", &self.logging.get())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open the built-in driver described by `config`.
    ///
    /// Fails with [`SqlError::UnsupportedDriver`] when no built-in handle
    /// exists for the dialect (MySQL); use [`with_driver`](Self::with_driver).
    pub fn open(config: &ConnectionConfig) -> SqlResult<Self> {
        let driver = driver::open(config)?;
        Ok(Self::with_driver(driver, config.clone()))
    }

    /// In-memory SQLite connection.
    pub fn open_in_memory() -> SqlResult<Self> {
        Self::open(&ConnectionConfig::sqlite_memory())
    }

    /// Wrap a host-supplied driver. The driver's dialect wins over `config.driver`.
    pub fn with_driver(driver: Box<dyn Driver>, mut config: ConnectionConfig) -> Self {
        let dialect = driver.dialect();
        config.driver = dialect;
        let watcher = config
            .watcher
            .enabled
            .then(|| Arc::new(QueryWatcher::new(config.watcher.clone())));
        let id = uuid::Uuid::new_v4().simple().to_string();
        tracing::debug!(target: "sqlkit.sql", dialect = %dialect, connection_id = %id, "connection opened");
        Self {
            driver: RefCell::new(driver),
            dialect,
            logging: Cell::new(config.logging),
            config,
            id,
            transaction_level: Cell::new(0),
            query_log: RefCell::new(Vec::new()),
            watcher,
            observers: Vec::new(),
        }
    }

    /// Attach an observer that receives every executed statement.
    pub fn with_observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replace the connection's watcher.
    pub fn with_watcher(mut self, watcher: Arc<QueryWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Random per-connection identifier (32 hex chars) used in savepoint names.
    pub fn connection_id(&self) -> &str {
        &self.id
    }

    /// The watcher created from `config.watcher`, or set with [`with_watcher`](Self::with_watcher).
    pub fn watcher(&self) -> Option<&Arc<QueryWatcher>> {
        self.watcher.as_ref()
    }

    /// Start a query builder on `table`.
    pub fn table(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder::new(self, table)
    }

    // ==================== raw execution ====================

    /// Run a row-returning statement.
    #[track_caller]
    pub fn query(&self, sql: &str, bindings: &[Value]) -> SqlResult<Vec<Row>> {
        self.run(sql, bindings, |d| d.query(sql, bindings))
    }

    /// Run a row-returning statement and map each row.
    #[track_caller]
    pub fn select<T: FromRow>(&self, sql: &str, bindings: &[Value]) -> SqlResult<Vec<T>> {
        self.query(sql, bindings)?.iter().map(T::from_row).collect()
    }

    /// First row of a statement, if any.
    #[track_caller]
    pub fn select_one(&self, sql: &str, bindings: &[Value]) -> SqlResult<Option<Row>> {
        Ok(self.query(sql, bindings)?.into_iter().next())
    }

    /// Run a statement for its side effect.
    #[track_caller]
    pub fn statement(&self, sql: &str, bindings: &[Value]) -> SqlResult<()> {
        self.affecting_statement(sql, bindings).map(|_| ())
    }

    /// Run a statement and return the affected row count.
    #[track_caller]
    pub fn affecting_statement(&self, sql: &str, bindings: &[Value]) -> SqlResult<u64> {
        self.run(sql, bindings, |d| d.execute(sql, bindings))
    }

    /// Run one or more statements without bindings (DDL scripts).
    #[track_caller]
    pub fn unprepared(&self, sql: &str) -> SqlResult<()> {
        self.run(sql, &[], |d| d.execute_batch(sql))
    }

    // ==================== table-level convenience ====================

    /// `INSERT INTO table (cols...) VALUES (?, ...)`.
    #[track_caller]
    pub fn insert(&self, table: &str, values: &[(&str, Value)]) -> SqlResult<u64> {
        let (sql, bindings) = self.compile_insert(table, values)?;
        self.affecting_statement(&sql, &bindings)
    }

    /// Insert one row and return its generated `id`.
    ///
    /// Postgres uses `RETURNING`; the other dialects ask the driver for the
    /// last generated key.
    #[track_caller]
    pub fn insert_get_id(&self, table: &str, values: &[(&str, Value)]) -> SqlResult<i64> {
        let (sql, bindings) = self.compile_insert(table, values)?;
        self.insert_returning_id(sql, &bindings, "id")
    }

    #[track_caller]
    pub(crate) fn insert_returning_id(&self, mut sql: String, bindings: &[Value], key: &str) -> SqlResult<i64> {
        if self.dialect.uses_returning() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.dialect.quote_segment(key));
            let row = self
                .select_one(&sql, bindings)?
                .ok_or_else(|| SqlError::not_found("INSERT ... RETURNING produced no row"))?;
            return row
                .get_index(0)
                .and_then(Value::as_i64)
                .ok_or_else(|| SqlError::decode(key, "generated key is not an integer"));
        }
        let sql_ref = sql.as_str();
        self.run(sql_ref, bindings, |d| {
            d.execute(sql_ref, bindings)?;
            d.last_insert_id()?
                .ok_or_else(|| SqlError::Driver("driver does not report generated keys".to_string()))
        })
    }

    /// `UPDATE table SET col = ? ... WHERE key = ? AND ...`.
    #[track_caller]
    pub fn update(&self, table: &str, values: &[(&str, Value)], wheres: &[(&str, Value)]) -> SqlResult<u64> {
        if values.is_empty() {
            return Err(ValidationError::argument("update requires at least one column").into());
        }
        if wheres.is_empty() {
            return Err(ValidationError::argument("update without conditions; use the query builder").into());
        }
        let table = TableRef::parse(table)?;
        let mut bindings = Vec::with_capacity(values.len() + wheres.len());
        let mut sets = Vec::with_capacity(values.len());
        for (col, value) in values {
            sets.push(format!("{} = ?", self.quote_column(col)?));
            bindings.push(value.clone());
        }
        let conds = self.equality_conditions(wheres, &mut bindings)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            table.to_sql(self.dialect),
            sets.join(", "),
            conds
        );
        self.affecting_statement(&sql, &bindings)
    }

    /// `DELETE FROM table WHERE key = ? AND ...`. Conditions are required.
    #[track_caller]
    pub fn delete(&self, table: &str, wheres: &[(&str, Value)]) -> SqlResult<u64> {
        if wheres.is_empty() {
            return Err(ValidationError::argument("delete without conditions; use the query builder").into());
        }
        let table = TableRef::parse(table)?;
        let mut bindings = Vec::with_capacity(wheres.len());
        let conds = self.equality_conditions(wheres, &mut bindings)?;
        let sql = format!("DELETE FROM {} WHERE {}", table.to_sql(self.dialect), conds);
        self.affecting_statement(&sql, &bindings)
    }

    fn quote_column(&self, column: &str) -> SqlResult<String> {
        Ok(Ident::parse(column)?.to_sql(self.dialect))
    }

    fn equality_conditions(&self, wheres: &[(&str, Value)], bindings: &mut Vec<Value>) -> SqlResult<String> {
        let mut conds = Vec::with_capacity(wheres.len());
        for (col, value) in wheres {
            let col = self.quote_column(col)?;
            if value.is_null() {
                conds.push(format!("{col} IS NULL"));
            } else {
                conds.push(format!("{col} = ?"));
                bindings.push(value.clone());
            }
        }
        Ok(conds.join(" AND "))
    }

    pub(crate) fn compile_insert(&self, table: &str, values: &[(&str, Value)]) -> SqlResult<(String, Vec<Value>)> {
        if values.is_empty() {
            return Err(ValidationError::argument("insert requires at least one column").into());
        }
        let table = Ident::parse(table)?;
        let mut cols = Vec::with_capacity(values.len());
        let mut bindings = Vec::with_capacity(values.len());
        for (col, value) in values {
            cols.push(self.quote_column(col)?);
            bindings.push(value.clone());
        }
        let placeholders = vec!["?"; cols.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.to_sql(self.dialect),
            cols.join(", "),
            placeholders
        );
        Ok((sql, bindings))
    }

    // ==================== query log ====================

    pub fn enable_query_log(&self) {
        self.logging.set(true);
    }

    pub fn disable_query_log(&self) {
        self.logging.set(false);
    }

    pub fn logging(&self) -> bool {
        self.logging.get()
    }

    /// Copy of the statements logged so far.
    pub fn query_log(&self) -> Vec<LoggedQuery> {
        self.query_log.borrow().clone()
    }

    pub fn flush_query_log(&self) {
        self.query_log.borrow_mut().clear();
    }

    // ==================== request lifecycle ====================

    /// Prepare the connection for the next logical unit of work.
    ///
    /// Rolls back any transaction left open (one `ROLLBACK` discards every
    /// savepoint), clears the query log and resets every attached observer,
    /// including the watcher. Long-lived processes must call this between
    /// requests. The rollback error, if any, is returned after the clean-up.
    pub fn reset_request_state(&self) -> SqlResult<()> {
        let level = self.transaction_level.replace(0);
        let result = if level > 0 {
            tracing::warn!(
                target: "sqlkit.sql",
                connection_id = %self.id,
                level,
                "rolling back transaction left open by previous unit of work"
            );
            self.control("ROLLBACK")
        } else {
            Ok(())
        };

        self.query_log.borrow_mut().clear();
        if let Some(w) = &self.watcher {
            w.reset();
        }
        for o in &self.observers {
            o.reset();
        }
        result
    }

    // ==================== internals ====================

    /// Transaction control statement: not logged, not observed.
    pub(crate) fn control(&self, sql: &str) -> SqlResult<()> {
        tracing::debug!(target: "sqlkit.sql", connection_id = %self.id, sql, "transaction control");
        self.driver_mut()?.execute_batch(sql)
    }

    fn driver_mut(&self) -> SqlResult<std::cell::RefMut<'_, Box<dyn Driver>>> {
        self.driver
            .try_borrow_mut()
            .map_err(|_| SqlError::Driver("connection is already executing a statement".to_string()))
    }

    fn observing(&self) -> bool {
        !self.observers.is_empty() || self.watcher.as_ref().is_some_and(|w| w.is_enabled())
    }

    /// Time, log and observe one driver call.
    #[track_caller]
    fn run<T>(
        &self,
        sql: &str,
        bindings: &[Value],
        f: impl FnOnce(&mut dyn Driver) -> SqlResult<T>,
    ) -> SqlResult<T> {
        let call_site = CallSite::capture();
        let start = Instant::now();
        let result = {
            let mut driver = self.driver_mut()?;
            f(driver.as_mut())
        };
        let elapsed = start.elapsed();

        tracing::debug!(
            target: "sqlkit.sql",
            query_type = ?QueryType::from_sql(sql),
            param_count = bindings.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            ok = result.is_ok(),
            sql,
            "query executed"
        );

        if self.logging.get() {
            self.query_log.borrow_mut().push(LoggedQuery {
                sql: sql.to_string(),
                bindings: bindings.to_vec(),
                elapsed,
            });
        }

        if self.observing() {
            let mut obs =
                QueryObservation::new(sql, bindings.to_vec(), elapsed).with_call_site(call_site);
            if let Err(e) = &result {
                obs = obs.with_error(e.to_string());
            }
            if let Some(w) = &self.watcher {
                w.record(&obs);
            }
            for o in &self.observers {
                o.on_query(&obs);
            }
        }

        result
    }
}
