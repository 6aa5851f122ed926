//! Schema builder: typed DDL over a [`Connection`].
//!
//! ```ignore
//! let schema = conn.schema();
//! schema.create("users", |t| {
//!     t.increments("id");
//!     t.string("email", 255).unique();
//!     t.timestamps();
//! })?;
//! assert!(schema.has_table("users")?);
//! ```
//!
//! A schema in pretend mode ([`Schema::pretend`]) records the statements it
//! would run instead of executing them. Introspection (`has_table`,
//! `has_column`) still queries the database.

mod blueprint;
mod column;
mod grammar;

pub use blueprint::Blueprint;
pub use column::{
    ColumnDefinition, ColumnType, ForeignKeyAction, ForeignKeyDefinition, IndexDefinition,
    IndexKind,
};
pub use grammar::Grammar;

use crate::connection::Connection;
use crate::error::SqlResult;
use crate::value::Value;
use std::cell::RefCell;

/// DDL facade bound to a connection.
#[derive(Debug)]
pub struct Schema<'c> {
    conn: &'c Connection,
    grammar: Grammar,
    pretend: Option<RefCell<Vec<String>>>,
}

impl<'c> Schema<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        let config = conn.config();
        // An invalid charset is passed through so DDL rendering rejects it.
        let charset = config
            .effective_charset()
            .ok()
            .flatten()
            .unwrap_or_else(|| config.charset.clone());
        Self {
            conn,
            grammar: Grammar::new(conn.dialect(), &charset),
            pretend: None,
        }
    }

    /// A schema that records statements instead of running them.
    pub fn pretend(conn: &'c Connection) -> Self {
        Self {
            pretend: Some(RefCell::new(Vec::new())),
            ..Self::new(conn)
        }
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn is_pretending(&self) -> bool {
        self.pretend.is_some()
    }

    /// Statements recorded so far in pretend mode.
    pub fn recorded(&self) -> Vec<String> {
        self.pretend
            .as_ref()
            .map(|log| log.borrow().clone())
            .unwrap_or_default()
    }

    #[track_caller]
    fn run_all(&self, statements: Vec<String>) -> SqlResult<()> {
        for sql in statements {
            self.unprepared(&sql)?;
        }
        Ok(())
    }

    /// Run (or record) a raw DDL script.
    #[track_caller]
    pub fn unprepared(&self, sql: &str) -> SqlResult<()> {
        match &self.pretend {
            Some(log) => {
                log.borrow_mut().push(sql.to_string());
                Ok(())
            }
            None => self.conn.unprepared(sql),
        }
    }

    /// `CREATE TABLE` from a blueprint.
    #[track_caller]
    pub fn create(&self, table: &str, f: impl FnOnce(&mut Blueprint)) -> SqlResult<()> {
        let mut bp = Blueprint::new(table);
        f(&mut bp);
        let statements = self.grammar.compile_create(&bp)?;
        self.run_all(statements)
    }

    /// Alter an existing table: add, rename and drop columns and indexes.
    #[track_caller]
    pub fn table(&self, table: &str, f: impl FnOnce(&mut Blueprint)) -> SqlResult<()> {
        let mut bp = Blueprint::new(table);
        f(&mut bp);
        let statements = self.grammar.compile_alter(&bp)?;
        self.run_all(statements)
    }

    #[track_caller]
    pub fn drop(&self, table: &str) -> SqlResult<()> {
        let table = blueprint::table_name(table)?;
        self.unprepared(&self.grammar.compile_drop(&table))
    }

    #[track_caller]
    pub fn drop_if_exists(&self, table: &str) -> SqlResult<()> {
        let table = blueprint::table_name(table)?;
        self.unprepared(&self.grammar.compile_drop_if_exists(&table))
    }

    #[track_caller]
    pub fn rename(&self, from: &str, to: &str) -> SqlResult<()> {
        let from = blueprint::table_name(from)?;
        let to = blueprint::table_name(to)?;
        self.unprepared(&self.grammar.compile_rename(&from, &to))
    }

    #[track_caller]
    pub fn has_table(&self, table: &str) -> SqlResult<bool> {
        let table = blueprint::table_name(table)?;
        let (sql, bindings) = self.grammar.compile_has_table(&table);
        self.count_positive(&sql, &bindings)
    }

    #[track_caller]
    pub fn has_column(&self, table: &str, column: &str) -> SqlResult<bool> {
        let table = blueprint::table_name(table)?;
        let column = blueprint::column_name(column)?;
        let (sql, bindings) = self.grammar.compile_has_column(&table, &column);
        self.count_positive(&sql, &bindings)
    }

    #[track_caller]
    fn count_positive(&self, sql: &str, bindings: &[Value]) -> SqlResult<bool> {
        let row = self.conn.select_one(sql, bindings)?;
        Ok(row
            .and_then(|r| r.get_index(0).and_then(Value::as_i64))
            .is_some_and(|n| n > 0))
    }
}

impl Connection {
    /// Schema builder over this connection.
    pub fn schema(&self) -> Schema<'_> {
        Schema::new(self)
    }
}
