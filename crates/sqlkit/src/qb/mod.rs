//! Query builder.
//!
//! A [`QueryBuilder`] is a value: clause methods take `self` and return the
//! updated builder, so a shared base is reused by cloning it explicitly
//! ([`branch`](QueryBuilder::branch) / `clone`). Clones never share clause
//! state.
//!
//! Every identifier and operator is validated when the clause is added. The
//! first failure is kept and reported by the terminal call (or
//! [`to_sql`](QueryBuilder::to_sql)); later clauses are still accepted so
//! chains stay readable.
//!
//! ```ignore
//! let base = conn.table("posts").where_("published", "=", true);
//!
//! let recent = base.branch().latest().take(10).get()?;
//! let total = base.count()?;
//!
//! let page = conn
//!     .table("users")
//!     .where_("status", "=", "active")
//!     .or_where_in("role", ["admin", "owner"])
//!     .order_by("name", "asc")
//!     .paginate(20, 2)?;
//! ```

mod clause;
mod compile;
mod execute;
mod paginate;

#[cfg(test)]
mod tests;

pub use clause::{Boolean, Direction, Join, JoinKind, Order, WhereClause};
pub use compile::{CompiledQuery, StatementDescriptor};
pub use paginate::Paginator;

use crate::connection::Connection;
use crate::error::{SqlResult, ValidationError};
use crate::ident::{Expression, IdentKind, Operator, TableRef};
use crate::value::Value;

/// Fluent SELECT/UPDATE/DELETE builder bound to a connection.
#[derive(Clone, Debug)]
pub struct QueryBuilder<'c> {
    conn: &'c Connection,
    desc: StatementDescriptor,
    error: Option<ValidationError>,
}

impl<'c> QueryBuilder<'c> {
    /// Start a query on `table` (`users`, `public.users`, `users AS u`).
    pub fn new(conn: &'c Connection, table: &str) -> Self {
        let mut qb = Self {
            conn,
            desc: StatementDescriptor::default(),
            error: None,
        };
        match TableRef::parse(table) {
            Ok(t) => qb.desc.table = Some(t),
            Err(e) => qb.error = Some(e),
        }
        qb
    }

    /// The accumulated descriptor.
    pub fn descriptor(&self) -> &StatementDescriptor {
        &self.desc
    }

    /// First validation failure, if any clause was rejected.
    pub fn error(&self) -> Option<&ValidationError> {
        self.error.as_ref()
    }

    /// Deep copy for diverging from a shared base.
    pub fn branch(&self) -> Self {
        self.clone()
    }

    fn fail(mut self, err: ValidationError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    fn column(&self, column: &str) -> Result<Expression, ValidationError> {
        Expression::parse(column, IdentKind::Column)
    }

    fn check(&self) -> SqlResult<()> {
        match &self.error {
            Some(e) => Err(e.clone().into()),
            None => Ok(()),
        }
    }

    // ==================== SELECT columns ====================

    /// Replace the projection.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.desc.columns.clear();
        self.add_select(columns)
    }

    /// Append to the projection.
    pub fn add_select(mut self, columns: &[&str]) -> Self {
        for c in columns {
            match Expression::parse(c, IdentKind::Projection) {
                Ok(e) => self.desc.columns.push(e),
                Err(e) => return self.fail(e),
            }
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.desc.distinct = true;
        self
    }

    // ==================== WHERE ====================

    fn push_basic(self, column: &str, operator: &str, value: Value, boolean: Boolean) -> Self {
        let column = match self.column(column) {
            Ok(c) => c,
            Err(e) => return self.fail(e),
        };
        let operator = match Operator::parse(operator) {
            Ok(op) => op,
            Err(e) => return self.fail(e),
        };
        // `= NULL` never matches; treat it the way the caller meant it.
        let clause = match (&value, operator) {
            (Value::Null, Operator::Eq) => WhereClause::Null {
                column,
                negated: false,
                boolean,
            },
            (Value::Null, Operator::NotEq | Operator::LtGt) => WhereClause::Null {
                column,
                negated: true,
                boolean,
            },
            _ => WhereClause::Basic {
                column,
                operator,
                value,
                boolean,
            },
        };
        self.push_where(clause)
    }

    fn push_where(mut self, clause: WhereClause) -> Self {
        self.desc.wheres.push(clause);
        self
    }

    /// `AND column op ?`
    pub fn where_(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_basic(column, operator, value.into(), Boolean::And)
    }

    /// `AND column = ?`
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_basic(column, "=", value.into(), Boolean::And)
    }

    /// `OR column op ?`
    pub fn or_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_basic(column, operator, value.into(), Boolean::Or)
    }

    fn push_in<I, V>(self, column: &str, values: I, negated: bool, boolean: Boolean) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        match self.column(column) {
            Ok(column) => self.push_where(WhereClause::In {
                column,
                values: values.into_iter().map(Into::into).collect(),
                negated,
                boolean,
            }),
            Err(e) => self.fail(e),
        }
    }

    /// `AND column IN (?, ...)`; an empty list matches nothing.
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, values, false, Boolean::And)
    }

    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, values, false, Boolean::Or)
    }

    /// `AND column NOT IN (?, ...)`; an empty list matches everything.
    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, values, true, Boolean::And)
    }

    pub fn or_where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, values, true, Boolean::Or)
    }

    fn push_null(self, column: &str, negated: bool, boolean: Boolean) -> Self {
        match self.column(column) {
            Ok(column) => self.push_where(WhereClause::Null {
                column,
                negated,
                boolean,
            }),
            Err(e) => self.fail(e),
        }
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_null(column, false, Boolean::And)
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.push_null(column, false, Boolean::Or)
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_null(column, true, Boolean::And)
    }

    pub fn or_where_not_null(self, column: &str) -> Self {
        self.push_null(column, true, Boolean::Or)
    }

    fn push_between(self, column: &str, low: Value, high: Value, negated: bool, boolean: Boolean) -> Self {
        match self.column(column) {
            Ok(column) => self.push_where(WhereClause::Between {
                column,
                low,
                high,
                negated,
                boolean,
            }),
            Err(e) => self.fail(e),
        }
    }

    /// `AND column BETWEEN ? AND ?`
    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(column, low.into(), high.into(), false, Boolean::And)
    }

    pub fn or_where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(column, low.into(), high.into(), false, Boolean::Or)
    }

    pub fn where_not_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(column, low.into(), high.into(), true, Boolean::And)
    }

    /// Apply `f` only when `condition` holds.
    pub fn when(self, condition: bool, f: impl FnOnce(Self) -> Self) -> Self {
        if condition { f(self) } else { self }
    }

    // ==================== JOIN ====================

    fn push_join(mut self, kind: JoinKind, table: &str, left: &str, operator: &str, right: &str) -> Self {
        let join = (|| {
            Ok::<_, ValidationError>(Join {
                kind,
                table: TableRef::parse(table)?,
                left: self.column(left)?,
                operator: Operator::parse(operator)?,
                right: self.column(right)?,
            })
        })();
        match join {
            Ok(join) => {
                self.desc.joins.push(join);
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// `INNER JOIN table ON left op right`
    pub fn join(self, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.push_join(JoinKind::Inner, table, left, operator, right)
    }

    pub fn left_join(self, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.push_join(JoinKind::Left, table, left, operator, right)
    }

    pub fn right_join(self, table: &str, left: &str, operator: &str, right: &str) -> Self {
        self.push_join(JoinKind::Right, table, left, operator, right)
    }

    // ==================== ORDER / GROUP ====================

    /// `ORDER BY column direction`; direction is `asc` or `desc`.
    pub fn order_by(mut self, column: &str, direction: &str) -> Self {
        let Some(direction) = Direction::parse(direction) else {
            return self.fail(ValidationError::argument(format!(
                "order direction must be 'asc' or 'desc', got '{}'",
                direction.chars().take(16).collect::<String>()
            )));
        };
        match self.column(column) {
            Ok(column) => {
                self.desc.orders.push(Order { column, direction });
                self
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, "desc")
    }

    /// Newest first by `created_at`.
    pub fn latest(self) -> Self {
        self.order_by("created_at", "desc")
    }

    /// Oldest first by `created_at`.
    pub fn oldest(self) -> Self {
        self.order_by("created_at", "asc")
    }

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        for c in columns {
            match self.column(c) {
                Ok(e) => self.desc.groups.push(e),
                Err(e) => return self.fail(e),
            }
        }
        self
    }

    // ==================== LIMIT / OFFSET ====================

    /// Maximum rows; negative values are rejected.
    pub fn limit(mut self, n: i64) -> Self {
        match u64::try_from(n) {
            Ok(n) => {
                self.desc.limit = Some(n);
                self
            }
            Err(_) => self.fail(ValidationError::argument(format!("limit must be non-negative, got {n}"))),
        }
    }

    pub fn take(self, n: i64) -> Self {
        self.limit(n)
    }

    /// Rows to skip; negative values are rejected.
    pub fn offset(mut self, n: i64) -> Self {
        match u64::try_from(n) {
            Ok(n) => {
                self.desc.offset = Some(n);
                self
            }
            Err(_) => self.fail(ValidationError::argument(format!("offset must be non-negative, got {n}"))),
        }
    }

    pub fn skip(self, n: i64) -> Self {
        self.offset(n)
    }

    /// Limit/offset for 1-based `page` of `per_page` rows.
    pub fn for_page(mut self, page: u64, per_page: u64) -> Self {
        if page == 0 || per_page == 0 {
            return self.fail(ValidationError::argument("page and per_page start at 1"));
        }
        self.desc.limit = Some(per_page);
        self.desc.offset = Some((page - 1).saturating_mul(per_page));
        self
    }

    // ==================== compilation ====================

    /// Compile to SQL text plus bindings without executing.
    pub fn to_sql(&self) -> SqlResult<CompiledQuery> {
        self.check()?;
        self.desc.compile_select(self.conn.dialect())
    }

    /// The `COUNT(*)` query [`count`](Self::count) would run.
    pub fn to_count_sql(&self) -> SqlResult<CompiledQuery> {
        self.check()?;
        self.desc.compile_count(self.conn.dialect())
    }
}
