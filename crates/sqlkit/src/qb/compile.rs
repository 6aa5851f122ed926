//! Descriptor -> SQL text + bindings.

use super::clause::{Join, Order, WhereClause};
use crate::dialect::Dialect;
use crate::error::{SqlResult, ValidationError};
use crate::ident::{Expression, TableRef};
use crate::value::Value;

/// SQL text with `?` placeholders and the values for them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
}

impl CompiledQuery {
    /// Number of `?` placeholders outside quoted spans.
    pub fn placeholder_count(&self) -> usize {
        let mut quote: Option<char> = None;
        let mut count = 0;
        for ch in self.sql.chars() {
            match quote {
                Some(q) if ch == q => quote = None,
                Some(_) => {}
                None if matches!(ch, '\'' | '"' | '`') => quote = Some(ch),
                None if ch == '?' => count += 1,
                None => {}
            }
        }
        count
    }
}

/// Everything a SELECT-shaped query has accumulated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementDescriptor {
    pub table: Option<TableRef>,
    /// Empty means `*`.
    pub columns: Vec<Expression>,
    pub wheres: Vec<WhereClause>,
    pub joins: Vec<Join>,
    pub orders: Vec<Order>,
    pub groups: Vec<Expression>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
}

impl StatementDescriptor {
    pub(crate) fn table(&self) -> SqlResult<&TableRef> {
        self.table
            .as_ref()
            .ok_or_else(|| ValidationError::argument("query has no table").into())
    }

    /// `SELECT [DISTINCT] cols FROM t [JOIN..] [WHERE..] [GROUP BY..] [ORDER BY..] [LIMIT ? [OFFSET ?]]`
    pub fn compile_select(&self, dialect: Dialect) -> SqlResult<CompiledQuery> {
        let mut bindings = Vec::new();
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&join_exprs(&self.columns, dialect));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.table()?.to_sql(dialect));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.render(dialect));
        }

        if let Some(wheres) = self.compile_wheres(dialect, &mut bindings) {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }

        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&join_exprs(&self.groups, dialect));
        }

        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            let orders: Vec<String> = self
                .orders
                .iter()
                .map(|o| format!("{} {}", o.column.to_sql(dialect), o.direction.as_sql()))
                .collect();
            sql.push_str(&orders.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ?");
                bindings.push(to_value(limit));
                if let Some(offset) = offset {
                    sql.push_str(" OFFSET ?");
                    bindings.push(to_value(offset));
                }
            }
            (None, Some(offset)) => {
                // MySQL and SQLite only accept OFFSET after a LIMIT.
                if dialect != Dialect::Postgres {
                    sql.push_str(" LIMIT ?");
                    bindings.push(Value::Int(i64::MAX));
                }
                sql.push_str(" OFFSET ?");
                bindings.push(to_value(offset));
            }
            (None, None) => {}
        }

        Ok(CompiledQuery { sql, bindings })
    }

    /// `SELECT COUNT(*) AS "aggregate" ...` ignoring ORDER BY/LIMIT/OFFSET.
    ///
    /// Grouped or DISTINCT queries are counted through a derived table so the
    /// result is the number of rows the query would return.
    pub fn compile_count(&self, dialect: Dialect) -> SqlResult<CompiledQuery> {
        let mut inner = self.clone();
        inner.orders.clear();
        inner.limit = None;
        inner.offset = None;

        if inner.groups.is_empty() && !inner.distinct {
            inner.columns = vec![aggregate_expr("COUNT", Expression::Star)];
            return inner.compile_select(dialect);
        }

        let CompiledQuery { sql, bindings } = inner.compile_select(dialect)?;
        Ok(CompiledQuery {
            sql: format!(
                "SELECT COUNT(*) AS {} FROM ({sql}) AS {}",
                dialect.quote_segment("aggregate"),
                dialect.quote_segment("aggregate_table")
            ),
            bindings,
        })
    }

    /// Aggregate over `column` (already validated) with ORDER BY/LIMIT/OFFSET removed.
    pub fn compile_aggregate(&self, function: &'static str, column: Expression, dialect: Dialect) -> SqlResult<CompiledQuery> {
        let mut inner = self.clone();
        inner.orders.clear();
        inner.limit = None;
        inner.offset = None;
        inner.columns = vec![aggregate_expr(function, column)];
        inner.compile_select(dialect)
    }

    /// `UPDATE t SET ... [WHERE ...]`; SET bindings precede WHERE bindings.
    pub fn compile_update(&self, sets: Vec<(String, Value)>, dialect: Dialect) -> SqlResult<CompiledQuery> {
        self.check_mutation("update")?;
        let mut bindings = Vec::with_capacity(sets.len());
        let assignments: Vec<String> = sets
            .into_iter()
            .map(|(assignment, value)| {
                bindings.push(value);
                assignment
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.table()?.to_sql(dialect),
            assignments.join(", ")
        );
        if let Some(wheres) = self.compile_wheres(dialect, &mut bindings) {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }
        Ok(CompiledQuery { sql, bindings })
    }

    /// `DELETE FROM t [WHERE ...]`
    pub fn compile_delete(&self, dialect: Dialect) -> SqlResult<CompiledQuery> {
        self.check_mutation("delete")?;
        let mut bindings = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.table()?.to_sql(dialect));
        if let Some(wheres) = self.compile_wheres(dialect, &mut bindings) {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }
        Ok(CompiledQuery { sql, bindings })
    }

    fn check_mutation(&self, what: &str) -> SqlResult<()> {
        if !self.joins.is_empty() {
            return Err(ValidationError::argument(format!("{what} with joins is not supported")).into());
        }
        if self.limit.is_some() || self.offset.is_some() {
            return Err(ValidationError::argument(format!("{what} with limit/offset is not supported")).into());
        }
        if self.table()?.alias.is_some() {
            return Err(ValidationError::argument(format!("{what} on an aliased table is not supported")).into());
        }
        Ok(())
    }

    /// WHERE body in declaration order; the first clause's connective is dropped.
    fn compile_wheres(&self, dialect: Dialect, bindings: &mut Vec<Value>) -> Option<String> {
        if self.wheres.is_empty() {
            return None;
        }
        let mut out = String::new();
        for (i, clause) in self.wheres.iter().enumerate() {
            if i > 0 {
                out.push(' ');
                out.push_str(clause.boolean().as_sql());
                out.push(' ');
            }
            out.push_str(&clause.render(dialect, bindings));
        }
        Some(out)
    }
}

fn aggregate_expr(function: &'static str, column: Expression) -> Expression {
    Expression::Aliased {
        expr: Box::new(Expression::Function {
            name: function,
            distinct: false,
            args: vec![column],
        }),
        alias: "aggregate".to_string(),
    }
}

fn join_exprs(exprs: &[Expression], dialect: Dialect) -> String {
    exprs
        .iter()
        .map(|e| e.to_sql(dialect))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_value(n: u64) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}
