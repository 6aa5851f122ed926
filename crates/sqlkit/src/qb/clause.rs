//! Typed clause AST for the statement descriptor.

use crate::dialect::Dialect;
use crate::ident::{Expression, Operator, TableRef};
use crate::value::Value;

/// Connective joining a WHERE clause to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

impl Boolean {
    pub fn as_sql(self) -> &'static str {
        match self {
            Boolean::And => "AND",
            Boolean::Or => "OR",
        }
    }
}

/// One WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// `column op ?`
    Basic {
        column: Expression,
        operator: Operator,
        value: Value,
        boolean: Boolean,
    },
    /// `column [NOT] IN (?, ...)`
    In {
        column: Expression,
        values: Vec<Value>,
        negated: bool,
        boolean: Boolean,
    },
    /// `column IS [NOT] NULL`
    Null {
        column: Expression,
        negated: bool,
        boolean: Boolean,
    },
    /// `column [NOT] BETWEEN ? AND ?`
    Between {
        column: Expression,
        low: Value,
        high: Value,
        negated: bool,
        boolean: Boolean,
    },
}

impl WhereClause {
    pub fn boolean(&self) -> Boolean {
        match self {
            WhereClause::Basic { boolean, .. }
            | WhereClause::In { boolean, .. }
            | WhereClause::Null { boolean, .. }
            | WhereClause::Between { boolean, .. } => *boolean,
        }
    }

    /// Render this clause, appending its bindings in placeholder order.
    pub fn render(&self, dialect: Dialect, bindings: &mut Vec<Value>) -> String {
        match self {
            WhereClause::Basic {
                column,
                operator,
                value,
                ..
            } => {
                bindings.push(value.clone());
                format!("{} {} ?", column.to_sql(dialect), operator.to_sql(dialect))
            }
            WhereClause::In {
                column,
                values,
                negated,
                ..
            } => {
                if values.is_empty() {
                    // Nothing is in an empty set.
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                bindings.extend(values.iter().cloned());
                format!(
                    "{} {}IN ({})",
                    column.to_sql(dialect),
                    if *negated { "NOT " } else { "" },
                    vec!["?"; values.len()].join(", ")
                )
            }
            WhereClause::Null {
                column, negated, ..
            } => format!(
                "{} IS {}NULL",
                column.to_sql(dialect),
                if *negated { "NOT " } else { "" }
            ),
            WhereClause::Between {
                column,
                low,
                high,
                negated,
                ..
            } => {
                bindings.push(low.clone());
                bindings.push(high.clone());
                format!(
                    "{} {}BETWEEN ? AND ?",
                    column.to_sql(dialect),
                    if *negated { "NOT " } else { "" }
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// `kind JOIN table ON left op right`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub left: Expression,
    pub operator: Operator,
    pub right: Expression,
}

impl Join {
    pub fn render(&self, dialect: Dialect) -> String {
        format!(
            "{} {} ON {} {} {}",
            self.kind.as_sql(),
            self.table.to_sql(dialect),
            self.left.to_sql(dialect),
            self.operator.to_sql(dialect),
            self.right.to_sql(dialect)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if s.trim().eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// `column direction`
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: Expression,
    pub direction: Direction,
}
