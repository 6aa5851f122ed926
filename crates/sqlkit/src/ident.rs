//! Identifier and operator validation.
//!
//! Every caller-influenced string that ends up in SQL text (table, column,
//! projection, operator) is parsed here into a small typed tree before it is
//! rendered. Parsing is a single left-to-right scan over bounded input, so
//! pathological strings cannot trigger super-linear work.
//!
//! Accepted grammar:
//!
//! - identifier: `[A-Za-z_][A-Za-z0-9_]*`, up to three dotted parts
//!   (`schema.table.column`); projections may end in `.*`
//! - function call: an allow-listed function wrapping identifiers, numeric
//!   literals, or further calls (`COUNT(*)`, `SUM(amount)`,
//!   `COALESCE(SUM(a), 0)`, `COUNT(DISTINCT user_id)`)
//! - alias: `expr AS alias` or `expr alias`
//!
//! # Example
//! ```ignore
//! use sqlkit::ident::{validate_identifier, IdentKind};
//!
//! validate_identifier("users.email", IdentKind::Column)?;
//! validate_identifier("COUNT(*) AS total", IdentKind::Projection)?;
//! assert!(validate_identifier("1=1; DROP TABLE x", IdentKind::Column).is_err());
//! # Ok::<(), sqlkit::ValidationError>(())
//! ```

use crate::dialect::Dialect;
use crate::error::ValidationError;

/// Upper bound on any identifier or expression string.
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Function calls may nest at most this deep.
const MAX_NESTING: usize = 4;

/// Functions allowed inside projections and ORDER/GROUP BY expressions.
const ALLOWED_FUNCTIONS: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "COALESCE", "IFNULL", "LOWER", "UPPER", "LENGTH",
    "ROUND", "ABS",
];

/// Functions that accept a leading `DISTINCT`.
const DISTINCT_FUNCTIONS: &[&str] = &["COUNT", "SUM", "AVG"];

/// Keywords that would change the meaning of a trailing `expr alias`.
const RESERVED_ALIASES: &[&str] = &[
    "AS", "FROM", "WHERE", "JOIN", "ON", "AND", "OR", "NOT", "SELECT", "DISTINCT", "GROUP",
    "ORDER", "BY", "LIMIT", "OFFSET", "UNION", "NULL", "IS", "IN", "LIKE",
];

/// Where an identifier is going to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentKind {
    /// FROM/JOIN target; an alias is allowed (`users u`).
    Table,
    /// WHERE/ORDER BY/GROUP BY operand; identifiers and function calls.
    Column,
    /// SELECT list entry; additionally allows `*`, `t.*` and aliases.
    Projection,
}

/// A validated, possibly dotted identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    parts: Vec<String>,
}

impl Ident {
    /// Parse a plain identifier (no star, no functions).
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        check_input(s)?;
        parse_ident(s.trim(), false)
    }

    /// The dotted parts.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Last segment (`id` for `users.id`).
    pub fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Render with the dialect's quote character.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.parts
            .iter()
            .map(|p| {
                if p == "*" {
                    p.clone()
                } else {
                    dialect.quote_segment(p)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Parsed column/projection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Bare `*`
    Star,
    /// Column reference, possibly `table.*`
    Column(Ident),
    /// Numeric literal, kept verbatim
    Number(String),
    /// Allow-listed function call
    Function {
        name: &'static str,
        distinct: bool,
        args: Vec<Expression>,
    },
    /// `expr AS alias`
    Aliased { expr: Box<Expression>, alias: String },
}

impl Expression {
    /// Parse and validate `s` for the given usage.
    pub fn parse(s: &str, kind: IdentKind) -> Result<Self, ValidationError> {
        check_input(s)?;
        let s = s.trim();
        match kind {
            IdentKind::Table => {
                let table = TableRef::parse(s)?;
                Ok(match table.alias {
                    Some(alias) => Expression::Aliased {
                        expr: Box::new(Expression::Column(table.name)),
                        alias,
                    },
                    None => Expression::Column(table.name),
                })
            }
            IdentKind::Column => {
                let expr = parse_expr(s, 0, false)?;
                if matches!(expr, Expression::Star) {
                    return Err(ValidationError::identifier(s, "'*' is only valid in a select list"));
                }
                Ok(expr)
            }
            IdentKind::Projection => parse_projection(s),
        }
    }

    /// Render with dialect-specific identifier quoting.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        match self {
            Expression::Star => "*".to_string(),
            Expression::Column(ident) => ident.to_sql(dialect),
            Expression::Number(n) => n.clone(),
            Expression::Function {
                name,
                distinct,
                args,
            } => {
                let args = args
                    .iter()
                    .map(|a| a.to_sql(dialect))
                    .collect::<Vec<_>>()
                    .join(", ");
                if *distinct {
                    format!("{name}(DISTINCT {args})")
                } else {
                    format!("{name}({args})")
                }
            }
            Expression::Aliased { expr, alias } => {
                format!("{} AS {}", expr.to_sql(dialect), dialect.quote_segment(alias))
            }
        }
    }

    /// The output column name a driver will report for this expression, if
    /// it is simple enough to predict.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Expression::Column(ident) => Some(ident.name()),
            Expression::Aliased { alias, .. } => Some(alias),
            _ => None,
        }
    }
}

/// A FROM/JOIN target with optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: Ident,
    pub alias: Option<String>,
}

impl TableRef {
    /// Parse `users`, `public.users`, `users u` or `users AS u`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        check_input(s)?;
        let s = s.trim();
        let (base, alias) = split_alias(s);
        let name = parse_ident(base, false)?;
        let alias = alias.map(|a| parse_alias(a, s)).transpose()?;
        Ok(Self { name, alias })
    }

    /// Render as `"users" AS "u"`.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", self.name.to_sql(dialect), dialect.quote_segment(alias)),
            None => self.name.to_sql(dialect),
        }
    }
}

/// Validate `name` for the given usage.
pub fn validate_identifier(name: &str, kind: IdentKind) -> Result<(), ValidationError> {
    Expression::parse(name, kind).map(|_| ())
}

/// Comparison operators accepted in WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    /// `<>`, kept distinct from `!=` so the SQL echoes what the caller wrote
    LtGt,
    Lt,
    Gt,
    Lte,
    Gte,
    Like,
    NotLike,
    ILike,
    NotILike,
}

impl Operator {
    /// Parse an operator (case-insensitive, inner whitespace collapsed).
    pub fn parse(op: &str) -> Result<Self, ValidationError> {
        if op.len() > 16 {
            return Err(ValidationError::InvalidOperator(op.chars().take(16).collect()));
        }
        let normalized = op
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let parsed = match normalized.as_str() {
            "=" => Operator::Eq,
            "!=" => Operator::NotEq,
            "<>" => Operator::LtGt,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Lte,
            ">=" => Operator::Gte,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "ILIKE" => Operator::ILike,
            "NOT ILIKE" => Operator::NotILike,
            _ => return Err(ValidationError::InvalidOperator(op.to_string())),
        };
        Ok(parsed)
    }

    /// Render for `dialect`. `ILIKE` only exists on Postgres; MySQL and SQLite
    /// compare case-insensitively with `LIKE` under their default collations.
    pub fn to_sql(self, dialect: Dialect) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::LtGt => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike if dialect == Dialect::Postgres => "ILIKE",
            Operator::ILike => "LIKE",
            Operator::NotILike if dialect == Dialect::Postgres => "NOT ILIKE",
            Operator::NotILike => "NOT LIKE",
        }
    }
}

/// Validate a comparison operator against the allow-list.
pub fn validate_operator(op: &str) -> Result<(), ValidationError> {
    Operator::parse(op).map(|_| ())
}

// ==================== Parsing ====================

fn check_input(s: &str) -> Result<(), ValidationError> {
    if s.trim().is_empty() {
        return Err(ValidationError::identifier(s, "identifier cannot be empty"));
    }
    if s.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::identifier(
            s,
            format!("longer than {MAX_IDENTIFIER_LENGTH} bytes"),
        ));
    }
    if s.contains('\0') {
        return Err(ValidationError::identifier(s, "contains NUL character"));
    }
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '*' | '(' | ')' | ',' | ' ' | '-')))
    {
        return Err(ValidationError::identifier(s, format!("disallowed character '{c}'")));
    }
    Ok(())
}

fn parse_projection(s: &str) -> Result<Expression, ValidationError> {
    let (base, alias) = split_alias(s);
    let expr = parse_expr(base, 0, true)?;
    match alias {
        Some(alias) => {
            if matches!(expr, Expression::Star)
                || matches!(&expr, Expression::Column(i) if i.name() == "*")
            {
                return Err(ValidationError::identifier(s, "'*' cannot be aliased"));
            }
            Ok(Expression::Aliased {
                expr: Box::new(expr),
                alias: parse_alias(alias, s)?,
            })
        }
        None => Ok(expr),
    }
}

/// Split a trailing `AS alias` / `alias` at parenthesis depth zero.
fn split_alias(s: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    let mut last_space = None;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ' ' if depth == 0 => last_space = Some(i),
            _ => {}
        }
    }
    let Some(pos) = last_space else {
        return (s, None);
    };
    let alias = s[pos + 1..].trim();
    let mut base = s[..pos].trim_end();
    if let Some(stripped) = strip_suffix_ci(base, " AS") {
        base = stripped.trim_end();
    }
    if alias.is_empty() || base.is_empty() {
        return (s, None);
    }
    (base, Some(alias))
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = s.len().checked_sub(suffix.len())?;
    if s.is_char_boundary(cut) && s[cut..].eq_ignore_ascii_case(suffix) {
        Some(&s[..cut])
    } else {
        None
    }
}

fn parse_alias(alias: &str, whole: &str) -> Result<String, ValidationError> {
    if !is_bare_identifier(alias) {
        return Err(ValidationError::identifier(whole, format!("invalid alias '{alias}'")));
    }
    if RESERVED_ALIASES.iter().any(|k| k.eq_ignore_ascii_case(alias)) {
        return Err(ValidationError::identifier(
            whole,
            format!("keyword '{alias}' cannot be used as an alias"),
        ));
    }
    Ok(alias.to_string())
}

fn parse_expr(s: &str, depth: usize, allow_star: bool) -> Result<Expression, ValidationError> {
    let s = s.trim();
    if depth > MAX_NESTING {
        return Err(ValidationError::identifier(s, "function calls nested too deeply"));
    }
    if s == "*" {
        return if allow_star {
            Ok(Expression::Star)
        } else {
            Err(ValidationError::identifier(s, "'*' not allowed here"))
        };
    }
    if let Some(open) = s.find('(') {
        return parse_function(s, open, depth);
    }
    if s.contains(')') {
        return Err(ValidationError::identifier(s, "unbalanced parentheses"));
    }
    if is_number(s) {
        // Literals only appear as function arguments.
        if depth == 0 {
            return Err(ValidationError::identifier(s, "numeric literal is not a column"));
        }
        return Ok(Expression::Number(s.to_string()));
    }
    Ok(Expression::Column(parse_ident(s, allow_star)?))
}

fn parse_function(s: &str, open: usize, depth: usize) -> Result<Expression, ValidationError> {
    if !s.ends_with(')') {
        return Err(ValidationError::identifier(s, "trailing input after function call"));
    }
    let raw_name = s[..open].trim();
    let Some(name) = ALLOWED_FUNCTIONS
        .iter()
        .copied()
        .find(|f| f.eq_ignore_ascii_case(raw_name))
    else {
        return Err(ValidationError::identifier(s, format!("function '{raw_name}' is not allowed")));
    };

    let inner = &s[open + 1..s.len() - 1];
    let mut args_src = split_top_level(inner).ok_or_else(|| {
        ValidationError::identifier(s, "unbalanced parentheses")
    })?;

    let mut distinct = false;
    if let [only] = args_src.as_mut_slice() {
        let trimmed = only.trim_start();
        if trimmed.len() > 9 && trimmed[..9].eq_ignore_ascii_case("DISTINCT ") {
            if !DISTINCT_FUNCTIONS.contains(&name) {
                return Err(ValidationError::identifier(s, format!("DISTINCT not allowed in {name}")));
            }
            distinct = true;
            *only = &trimmed[9..];
        }
    }

    let mut args = Vec::with_capacity(args_src.len());
    for arg in args_src {
        if arg.trim().is_empty() {
            return Err(ValidationError::identifier(s, "empty function argument"));
        }
        let star_ok = name == "COUNT" && !distinct;
        args.push(parse_expr(arg, depth + 1, star_ok)?);
    }
    if args.is_empty() {
        return Err(ValidationError::identifier(s, format!("{name} requires arguments")));
    }
    if args.len() > 1 && !matches!(name, "COALESCE" | "IFNULL" | "ROUND") {
        return Err(ValidationError::identifier(s, format!("{name} takes a single argument")));
    }
    if args.iter().any(|a| matches!(a, Expression::Column(i) if i.name() == "*")) {
        return Err(ValidationError::identifier(s, "'table.*' is not a valid argument"));
    }
    Ok(Expression::Function {
        name,
        distinct,
        args,
    })
}

/// Split on commas at parenthesis depth zero. `None` if parentheses don't balance.
fn split_top_level(s: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&s[start..]);
    Some(parts)
}

fn parse_ident(s: &str, allow_star: bool) -> Result<Ident, ValidationError> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() > 3 {
        return Err(ValidationError::identifier(s, "too many '.' separated parts"));
    }
    let last = parts.len() - 1;
    let mut out = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        if *part == "*" && allow_star && i == last && last > 0 {
            out.push("*".to_string());
            continue;
        }
        if !is_bare_identifier(part) {
            let reason = if part.is_empty() {
                "empty identifier segment".to_string()
            } else {
                format!("invalid identifier segment '{part}'")
            };
            return Err(ValidationError::identifier(s, reason));
        }
        out.push(part.to_string());
    }
    Ok(Ident { parts: out })
}

fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn is_number(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() {
        return false;
    }
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_dotted() {
        for ok in ["id", "_tmp", "users.id", "public.users.id", "Col9"] {
            assert!(validate_identifier(ok, IdentKind::Column).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_injection_shapes() {
        for bad in [
            "1=1; DROP TABLE x",
            "id; --",
            "id -- comment",
            "name'",
            "\"name\"",
            "`name`",
            "a\0b",
            "users..id",
            "9lives",
            "",
            "   ",
            "a.b.c.d",
            "id)",
            "(id",
        ] {
            let err = validate_identifier(bad, IdentKind::Column).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidIdentifier { .. }),
                "{bad:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn rejects_oversized_input() {
        let long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(&long, IdentKind::Column).is_err());
        let max = "a".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&max, IdentKind::Column).is_ok());
    }

    #[test]
    fn functions_and_nesting() {
        for ok in [
            "COUNT(*)",
            "count(*)",
            "SUM(amount)",
            "COALESCE(a, b, c)",
            "COALESCE(SUM(total), 0)",
            "COUNT(DISTINCT user_id)",
            "ROUND(AVG(price), 2)",
        ] {
            assert!(validate_identifier(ok, IdentKind::Column).is_ok(), "{ok}");
        }
        for bad in [
            "SLEEP(10)",
            "SUM(*)",
            "COUNT(a, b)",
            "COALESCE(SUM(a, 0)",
            "SUM(a))",
            "COUNT()",
            "MAX(DISTINCT x)",
            "SUM(a) + 1",
        ] {
            assert!(validate_identifier(bad, IdentKind::Column).is_err(), "{bad}");
        }
    }

    #[test]
    fn numeric_literals_only_inside_functions() {
        for bad in ["1", "-2", "3.5", "1 AS one"] {
            assert!(validate_identifier(bad, IdentKind::Column).is_err(), "{bad}");
            assert!(validate_identifier(bad, IdentKind::Projection).is_err(), "{bad}");
        }
        assert!(validate_identifier("COALESCE(total, 0)", IdentKind::Column).is_ok());
        assert!(validate_identifier("ROUND(price, 2)", IdentKind::Column).is_ok());
    }

    #[test]
    fn nesting_limit() {
        let deep = "ABS(ABS(ABS(ABS(ABS(ABS(x))))))";
        assert!(validate_identifier(deep, IdentKind::Column).is_err());
    }

    #[test]
    fn projections_and_aliases() {
        for ok in [
            "*",
            "users.*",
            "email AS contact",
            "email contact",
            "COUNT(*) AS total",
            "COUNT(*) total",
            "SUM(amount) as revenue",
        ] {
            assert!(validate_identifier(ok, IdentKind::Projection).is_ok(), "{ok}");
        }
        assert!(validate_identifier("* AS x", IdentKind::Projection).is_err());
        assert!(validate_identifier("email AS 1x", IdentKind::Projection).is_err());
        assert!(validate_identifier("email AS", IdentKind::Projection).is_err());
        assert!(validate_identifier("email as", IdentKind::Projection).is_err());
        assert!(validate_identifier("COUNT(*) AS", IdentKind::Projection).is_err());
        assert!(validate_identifier("email AS from", IdentKind::Projection).is_err());
        assert!(TableRef::parse("users AS").is_err());
        assert!(validate_identifier("*", IdentKind::Column).is_err());
        assert!(validate_identifier("email AS contact", IdentKind::Column).is_err());
    }

    #[test]
    fn renders_with_quoting() {
        let e = Expression::parse("COUNT(DISTINCT o.user_id) AS buyers", IdentKind::Projection).unwrap();
        assert_eq!(e.to_sql(Dialect::MySql), "COUNT(DISTINCT `o`.`user_id`) AS `buyers`");
        let e = Expression::parse("coalesce(sum(total), 0)", IdentKind::Column).unwrap();
        assert_eq!(e.to_sql(Dialect::Postgres), "COALESCE(SUM(\"total\"), 0)");
        let t = TableRef::parse("users AS u").unwrap();
        assert_eq!(t.to_sql(Dialect::Sqlite), "\"users\" AS \"u\"");
    }

    #[test]
    fn operators() {
        for ok in ["=", "!=", "<>", "<", ">", "<=", ">=", "like", "NOT LIKE", "not   like", "ILIKE"] {
            assert!(validate_operator(ok).is_ok(), "{ok}");
        }
        for bad in ["==", "; DROP", "OR 1=1", "", "LIKE LIKE", "=>"] {
            assert_eq!(
                validate_operator(bad),
                Err(ValidationError::InvalidOperator(bad.to_string()))
            );
        }
        assert_eq!(Operator::ILike.to_sql(Dialect::Sqlite), "LIKE");
        assert_eq!(Operator::ILike.to_sql(Dialect::Postgres), "ILIKE");
    }
}
