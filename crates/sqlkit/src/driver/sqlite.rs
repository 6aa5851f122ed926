use super::Driver;
use crate::dialect::Dialect;
use crate::error::SqlResult;
use crate::row::Row;
use crate::value::Value;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{ToSql, params_from_iter};
use std::path::Path;
use std::sync::Arc;

/// SQLite handle backed by rusqlite.
pub struct SqliteDriver {
    conn: rusqlite::Connection,
}

impl SqliteDriver {
    /// Open a database file, or an in-memory database for `:memory:`.
    ///
    /// Foreign-key enforcement is switched on.
    pub fn open(path: impl AsRef<Path>) -> SqlResult<Self> {
        let path = path.as_ref();
        let conn = if path.as_os_str() == ":memory:" {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(path)?
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> SqlResult<Self> {
        Self::open(":memory:")
    }

    /// Wrap an existing rusqlite connection.
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn from_value_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    fn execute_batch(&mut self, sql: &str) -> SqlResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn last_insert_id(&mut self) -> SqlResult<Option<i64>> {
        Ok(Some(self.conn.last_insert_rowid()))
    }
}
