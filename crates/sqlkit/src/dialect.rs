//! SQL dialects supported by the engine.
//!
//! The dialect is fixed when a [`Connection`](crate::Connection) is created and
//! decides identifier quoting, connection-string shape, default port, and the
//! DDL vocabulary used by the schema builder.

use crate::error::SqlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three reference drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dialect {
    /// MySQL / MariaDB (backtick quoting).
    MySql,
    /// PostgreSQL (double-quote quoting, `$n` placeholders on the wire).
    Postgres,
    /// SQLite (double-quote quoting).
    Sqlite,
}

impl Dialect {
    /// Canonical driver name as written in configuration.
    pub fn name(self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "pgsql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Identifier quote character.
    pub fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    /// Default TCP port, if the driver uses one.
    pub fn default_port(self) -> Option<u16> {
        match self {
            Dialect::MySql => Some(3306),
            Dialect::Postgres => Some(5432),
            Dialect::Sqlite => None,
        }
    }

    /// Statement opening the outermost transaction scope.
    pub fn begin_sql(self) -> &'static str {
        match self {
            Dialect::MySql => "START TRANSACTION",
            Dialect::Postgres | Dialect::Sqlite => "BEGIN",
        }
    }

    /// Whether DDL statements can be rolled back inside a transaction.
    pub fn supports_transactional_ddl(self) -> bool {
        !matches!(self, Dialect::MySql)
    }

    /// Whether `INSERT ... RETURNING` is used to fetch generated keys.
    pub fn uses_returning(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Quote a single identifier segment, doubling any embedded quote char.
    pub fn quote_segment(self, segment: &str) -> String {
        let q = self.quote_char();
        let mut out = String::with_capacity(segment.len() + 2);
        out.push(q);
        for ch in segment.chars() {
            if ch == q {
                out.push(q);
            }
            out.push(ch);
        }
        out.push(q);
        out
    }

    /// Quote a possibly dotted identifier (`table.column`). `*` segments stay bare.
    pub fn quote_identifier(self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    self.quote_segment(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Rewrite `?` placeholders into `$1, $2, ...` for drivers that need
    /// numbered parameters.
    ///
    /// Placeholders inside string literals and quoted identifiers are left alone.
    pub fn number_placeholders(sql: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut idx = 0usize;
        let mut quote: Option<char> = None;
        for ch in sql.chars() {
            match quote {
                Some(q) => {
                    out.push(ch);
                    if ch == q {
                        // A doubled quote re-enters the literal on the next char.
                        quote = None;
                    }
                }
                None => match ch {
                    '\'' | '"' | '`' => {
                        quote = Some(ch);
                        out.push(ch);
                    }
                    '?' => {
                        idx += 1;
                        out.push('$');
                        out.push_str(&idx.to_string());
                    }
                    _ => out.push(ch),
                },
            }
        }
        out
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = SqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(SqlError::UnsupportedDriver(other.to_string())),
        }
    }
}

impl TryFrom<String> for Dialect {
    type Error = SqlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dialect> for String {
    fn from(value: Dialect) -> Self {
        value.name().to_string()
    }
}
