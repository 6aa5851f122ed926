use crate::value::Value;
use serde::Serialize;
use std::fmt;
use std::panic::Location;
use std::time::Duration;

/// The type of SQL operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// SELECT query
    Select,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// Other SQL (e.g., DDL, transaction control)
    Other,
}

impl QueryType {
    /// Detect query type from SQL string.
    ///
    /// For CTEs (`WITH ...`), looks past the CTE definitions to find the
    /// actual DML keyword.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") {
            QueryType::Select
        } else if starts_with_keyword(trimmed, "INSERT") {
            QueryType::Insert
        } else if starts_with_keyword(trimmed, "UPDATE") {
            QueryType::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            QueryType::Delete
        } else if starts_with_keyword(trimmed, "WITH") {
            Self::detect_cte_dml(trimmed)
        } else {
            QueryType::Other
        }
    }

    fn detect_cte_dml(sql: &str) -> Self {
        // The main statement is the first DML keyword outside every CTE body.
        let bytes = sql.as_bytes();
        let mut depth: i32 = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => depth -= 1,
                quote @ (b'\'' | b'"' | b'`') => {
                    i += 1;
                    while i < bytes.len() {
                        if bytes[i] == quote {
                            if i + 1 < bytes.len() && bytes[i + 1] == quote {
                                i += 1;
                            } else {
                                break;
                            }
                        }
                        i += 1;
                    }
                }
                c if depth == 0 && (c.is_ascii_alphabetic() || c == b'_') => {
                    let start = i;
                    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                        i += 1;
                    }
                    let word = &sql[start..i];
                    for (keyword, ty) in [
                        ("SELECT", QueryType::Select),
                        ("INSERT", QueryType::Insert),
                        ("UPDATE", QueryType::Update),
                        ("DELETE", QueryType::Delete),
                    ] {
                        if word.eq_ignore_ascii_case(keyword) {
                            return ty;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        QueryType::Select
    }
}

/// Skip leading whitespace, comments and opening parens.
fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            return s;
        }
    }
}

fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    s.len() >= keyword.len()
        && s.is_char_boundary(keyword.len())
        && s[..keyword.len()].eq_ignore_ascii_case(keyword)
        && s[keyword.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
}

/// Source location of the code that issued a statement.
///
/// Captured through `#[track_caller]` on every public execution entry point,
/// so it always names the caller's frame, never one inside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl CallSite {
    #[track_caller]
    pub fn capture() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(loc: &'static Location<'static>) -> Self {
        Self {
            file: loc.file(),
            line: loc.line(),
            column: loc.column(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One executed statement, handed to every attached [`QueryObserver`].
#[derive(Debug, Clone, Serialize)]
pub struct QueryObservation {
    /// SQL as sent to the driver.
    pub sql: String,
    pub bindings: Vec<Value>,
    #[serde(serialize_with = "serialize_ms")]
    pub elapsed: Duration,
    pub query_type: QueryType,
    pub call_site: Option<CallSite>,
    /// Driver error message, if the statement failed.
    pub error: Option<String>,
}

impl QueryObservation {
    pub fn new(sql: impl Into<String>, bindings: Vec<Value>, elapsed: Duration) -> Self {
        let sql = sql.into();
        Self {
            query_type: QueryType::from_sql(&sql),
            sql,
            bindings,
            elapsed,
            call_site: None,
            error: None,
        }
    }

    pub fn with_call_site(mut self, call_site: CallSite) -> Self {
        self.call_site = Some(call_site);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Normalized pattern (literals and `IN` lists collapsed to `?`).
    pub fn pattern(&self) -> String {
        super::normalize::normalize_sql(&self.sql)
    }

    pub fn elapsed_ms(&self) -> f64 {
        duration_ms(self.elapsed)
    }
}

pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

pub(crate) fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(duration_ms(*d))
}

/// Receives every statement a [`Connection`](crate::Connection) executes.
///
/// Observers are advisory: they cannot fail or block execution.
pub trait QueryObserver: Send + Sync {
    /// Called after each statement completes (success or failure).
    fn on_query(&self, observation: &QueryObservation);

    /// Drop per-window state. Called from
    /// [`Connection::reset_request_state`](crate::Connection::reset_request_state).
    ///
    /// Default implementation does nothing.
    fn reset(&self) {}
}
