//! The migrations tracking table.

use crate::connection::Connection;
use crate::error::{SqlError, SqlResult};
use crate::row::Row;
use crate::value::Value;
use serde::Serialize;

pub const DEFAULT_MIGRATION_TABLE: &str = "migrations";

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub migration: String,
    pub batch: i64,
    pub executed_at: Option<String>,
}

impl MigrationRecord {
    fn from_row(row: &Row) -> SqlResult<Self> {
        let executed_at = match row.get("executed_at") {
            None | Some(Value::Null) => None,
            Some(Value::Text(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        Ok(Self {
            migration: row.try_get("migration")?,
            batch: row.try_get("batch")?,
            executed_at,
        })
    }
}

/// Reads and writes `(id, migration, batch, executed_at)` rows.
#[derive(Debug, Clone)]
pub struct MigrationRepository<'c> {
    conn: &'c Connection,
    table: String,
}

impl<'c> MigrationRepository<'c> {
    /// `table` must already be validated.
    pub(crate) fn new(conn: &'c Connection, table: String) -> Self {
        Self { conn, table }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn quoted(&self) -> String {
        self.conn.dialect().quote_identifier(&self.table)
    }

    fn col(&self, name: &str) -> String {
        self.conn.dialect().quote_segment(name)
    }

    pub fn exists(&self) -> SqlResult<bool> {
        self.conn.schema().has_table(&self.table)
    }

    /// Create the tracking table.
    pub fn create(&self) -> SqlResult<()> {
        self.conn.schema().create(&self.table, |t| {
            t.increments("id");
            t.string("migration", 255).unique();
            t.integer("batch");
            t.timestamp("executed_at").use_current();
        })
    }

    /// Every record, oldest first.
    pub fn records(&self) -> SqlResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT {m}, {b}, {e} FROM {t} ORDER BY {b} ASC, {id} ASC",
            m = self.col("migration"),
            b = self.col("batch"),
            e = self.col("executed_at"),
            id = self.col("id"),
            t = self.quoted()
        );
        self.conn
            .query(&sql, &[])?
            .iter()
            .map(MigrationRecord::from_row)
            .collect()
    }

    /// Names of applied migrations.
    pub fn ran(&self) -> SqlResult<Vec<String>> {
        Ok(self.records()?.into_iter().map(|r| r.migration).collect())
    }

    /// The last `steps` applied migrations, newest first.
    pub fn last_n(&self, steps: usize) -> SqlResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT {m}, {b}, {e} FROM {t} ORDER BY {id} DESC LIMIT ?",
            m = self.col("migration"),
            b = self.col("batch"),
            e = self.col("executed_at"),
            id = self.col("id"),
            t = self.quoted()
        );
        let limit = Value::Int(i64::try_from(steps).unwrap_or(i64::MAX));
        self.conn
            .query(&sql, &[limit])?
            .iter()
            .map(MigrationRecord::from_row)
            .collect()
    }

    /// Migrations of the most recent batch, newest first.
    pub fn last_batch(&self) -> SqlResult<Vec<MigrationRecord>> {
        let batch = self.last_batch_number()?;
        let sql = format!(
            "SELECT {m}, {b}, {e} FROM {t} WHERE {b} = ? ORDER BY {id} DESC",
            m = self.col("migration"),
            b = self.col("batch"),
            e = self.col("executed_at"),
            id = self.col("id"),
            t = self.quoted()
        );
        self.conn
            .query(&sql, &[Value::Int(batch)])?
            .iter()
            .map(MigrationRecord::from_row)
            .collect()
    }

    /// Highest batch number, `0` when nothing has run.
    pub fn last_batch_number(&self) -> SqlResult<i64> {
        let sql = format!(
            "SELECT MAX({b}) AS {agg} FROM {t}",
            b = self.col("batch"),
            agg = self.col("aggregate"),
            t = self.quoted()
        );
        match self.conn.select_one(&sql, &[])?.and_then(|r| r.get_index(0).cloned()) {
            None | Some(Value::Null) => Ok(0),
            Some(v) => v
                .as_i64()
                .ok_or_else(|| SqlError::decode("batch", format!("not an integer: {v}"))),
        }
    }

    pub fn next_batch_number(&self) -> SqlResult<i64> {
        Ok(self.last_batch_number()? + 1)
    }

    /// Record `migration` as applied in `batch`.
    pub fn log(&self, migration: &str, batch: i64) -> SqlResult<()> {
        let sql = format!(
            "INSERT INTO {t} ({m}, {b}) VALUES (?, ?)",
            t = self.quoted(),
            m = self.col("migration"),
            b = self.col("batch")
        );
        self.conn.statement(&sql, &[migration.into(), Value::Int(batch)])
    }

    /// Remove the record for `migration`.
    pub fn delete(&self, migration: &str) -> SqlResult<()> {
        let sql = format!(
            "DELETE FROM {t} WHERE {m} = ?",
            t = self.quoted(),
            m = self.col("migration")
        );
        self.conn.statement(&sql, &[migration.into()])
    }
}
