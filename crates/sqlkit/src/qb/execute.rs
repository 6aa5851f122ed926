//! Terminal methods: compile the descriptor and hand it to the connection.
//!
//! None of these mutate the builder; derived queries (`first`, `count`,
//! `paginate`, ...) work on a copy of the descriptor.

use super::{CompiledQuery, Paginator, QueryBuilder};
use crate::error::{SqlError, SqlResult, ValidationError};
use crate::ident::{Expression, Ident, IdentKind};
use crate::row::{FromRow, Row};
use crate::value::Value;

impl<'c> QueryBuilder<'c> {
    #[track_caller]
    fn fetch(&self, compiled: CompiledQuery) -> SqlResult<Vec<Row>> {
        self.conn.query(&compiled.sql, &compiled.bindings)
    }

    /// All matching rows.
    #[track_caller]
    pub fn get(&self) -> SqlResult<Vec<Row>> {
        let compiled = self.to_sql()?;
        self.fetch(compiled)
    }

    /// All matching rows mapped through [`FromRow`].
    #[track_caller]
    pub fn get_as<T: FromRow>(&self) -> SqlResult<Vec<T>> {
        self.get()?.iter().map(T::from_row).collect()
    }

    /// First matching row; runs with `LIMIT 1` on a copy of this query.
    #[track_caller]
    pub fn first(&self) -> SqlResult<Option<Row>> {
        let rows = self.branch().limit(1).get()?;
        Ok(rows.into_iter().next())
    }

    #[track_caller]
    pub fn first_as<T: FromRow>(&self) -> SqlResult<Option<T>> {
        self.first()?.as_ref().map(T::from_row).transpose()
    }

    /// Row whose `id` equals `id`.
    #[track_caller]
    pub fn find(&self, id: impl Into<Value>) -> SqlResult<Option<Row>> {
        self.branch().where_("id", "=", id).first()
    }

    /// `column` of the first matching row.
    #[track_caller]
    pub fn value(&self, column: &str) -> SqlResult<Option<Value>> {
        let row = self.branch().select(&[column]).first()?;
        Ok(row.and_then(|r| r.into_values().into_iter().next()))
    }

    /// `column` of every matching row.
    #[track_caller]
    pub fn pluck(&self, column: &str) -> SqlResult<Vec<Value>> {
        let rows = self.branch().select(&[column]).get()?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.into_values().into_iter().next())
            .collect())
    }

    /// Whether any row matches.
    #[track_caller]
    pub fn exists(&self) -> SqlResult<bool> {
        self.check()?;
        let mut desc = self.desc.clone();
        desc.columns = vec![Expression::Number("1".to_string())];
        desc.orders.clear();
        desc.limit = Some(1);
        desc.offset = None;
        let compiled = desc.compile_select(self.conn.dialect())?;
        Ok(!self.fetch(compiled)?.is_empty())
    }

    // ==================== aggregates ====================

    /// Number of rows the query would return (ORDER BY/LIMIT ignored).
    #[track_caller]
    pub fn count(&self) -> SqlResult<u64> {
        let compiled = self.to_count_sql()?;
        let value = first_value(self.fetch(compiled)?);
        value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| SqlError::decode("aggregate", format!("count is not an integer: {value}")))
    }

    #[track_caller]
    fn aggregate(&self, function: &'static str, column: &str) -> SqlResult<Value> {
        self.check()?;
        let column = Expression::parse(column, IdentKind::Column)?;
        let compiled = self
            .desc
            .compile_aggregate(function, column, self.conn.dialect())?;
        Ok(first_value(self.fetch(compiled)?))
    }

    /// `SUM(column)`; `0` when no rows match.
    #[track_caller]
    pub fn sum(&self, column: &str) -> SqlResult<f64> {
        let value = self.aggregate("SUM", column)?;
        if value.is_null() {
            return Ok(0.0);
        }
        value
            .as_f64()
            .ok_or_else(|| SqlError::decode("aggregate", format!("sum is not numeric: {value}")))
    }

    /// `AVG(column)`; `None` when no rows match.
    #[track_caller]
    pub fn avg(&self, column: &str) -> SqlResult<Option<f64>> {
        let value = self.aggregate("AVG", column)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_f64()
            .map(Some)
            .ok_or_else(|| SqlError::decode("aggregate", format!("avg is not numeric: {value}")))
    }

    #[track_caller]
    pub fn min(&self, column: &str) -> SqlResult<Option<Value>> {
        let value = self.aggregate("MIN", column)?;
        Ok((!value.is_null()).then_some(value))
    }

    #[track_caller]
    pub fn max(&self, column: &str) -> SqlResult<Option<Value>> {
        let value = self.aggregate("MAX", column)?;
        Ok((!value.is_null()).then_some(value))
    }

    // ==================== writes ====================

    fn table_name(&self) -> SqlResult<String> {
        self.check()?;
        let table = self.desc.table()?;
        if table.alias.is_some() {
            return Err(ValidationError::argument("insert into an aliased table is not supported").into());
        }
        Ok(table.name.parts().join("."))
    }

    /// Insert one row into the builder's table. Clauses are ignored.
    #[track_caller]
    pub fn insert(&self, values: &[(&str, Value)]) -> SqlResult<u64> {
        let (sql, bindings) = self.conn.compile_insert(&self.table_name()?, values)?;
        self.conn.affecting_statement(&sql, &bindings)
    }

    /// Insert one row and return its generated `id`.
    #[track_caller]
    pub fn insert_get_id(&self, values: &[(&str, Value)]) -> SqlResult<i64> {
        let (sql, bindings) = self.conn.compile_insert(&self.table_name()?, values)?;
        self.conn.insert_returning_id(sql, &bindings, "id")
    }

    /// `UPDATE ... SET col = ? ... WHERE <clauses>`; returns affected rows.
    #[track_caller]
    pub fn update(&self, values: &[(&str, Value)]) -> SqlResult<u64> {
        self.check()?;
        if values.is_empty() {
            return Err(ValidationError::argument("update requires at least one column").into());
        }
        let dialect = self.conn.dialect();
        let sets = values
            .iter()
            .map(|(col, value)| Ok((format!("{} = ?", Ident::parse(col)?.to_sql(dialect)), value.clone())))
            .collect::<Result<Vec<_>, ValidationError>>()?;
        let compiled = self.desc.compile_update(sets, dialect)?;
        self.conn.affecting_statement(&compiled.sql, &compiled.bindings)
    }

    /// `SET column = column + amount` on matching rows.
    #[track_caller]
    pub fn increment(&self, column: &str, amount: i64) -> SqlResult<u64> {
        self.step(column, "+", amount)
    }

    /// `SET column = column - amount` on matching rows.
    #[track_caller]
    pub fn decrement(&self, column: &str, amount: i64) -> SqlResult<u64> {
        self.step(column, "-", amount)
    }

    #[track_caller]
    fn step(&self, column: &str, sign: &str, amount: i64) -> SqlResult<u64> {
        self.check()?;
        let dialect = self.conn.dialect();
        let col = Ident::parse(column)?.to_sql(dialect);
        let sets = vec![(format!("{col} = {col} {sign} ?"), Value::Int(amount))];
        let compiled = self.desc.compile_update(sets, dialect)?;
        self.conn.affecting_statement(&compiled.sql, &compiled.bindings)
    }

    /// Delete matching rows. Refuses to run without a WHERE clause; use
    /// [`delete_all`](Self::delete_all) to empty the table.
    #[track_caller]
    pub fn delete(&self) -> SqlResult<u64> {
        self.check()?;
        if self.desc.wheres.is_empty() {
            return Err(ValidationError::argument("delete without conditions; use delete_all").into());
        }
        self.delete_all()
    }

    /// Delete every row matching the clauses, including none.
    #[track_caller]
    pub fn delete_all(&self) -> SqlResult<u64> {
        self.check()?;
        let compiled = self.desc.compile_delete(self.conn.dialect())?;
        self.conn.affecting_statement(&compiled.sql, &compiled.bindings)
    }

    // ==================== pagination ====================

    /// One page of rows plus totals.
    ///
    /// Two round trips: a `COUNT(*)` over the unpaged query, then the page
    /// itself with `LIMIT`/`OFFSET` on a copy.
    #[track_caller]
    pub fn paginate(&self, per_page: u64, page: u64) -> SqlResult<Paginator<Row>> {
        if per_page == 0 || page == 0 {
            return Err(ValidationError::argument("page and per_page start at 1").into());
        }
        let total = self.count()?;
        let items = self.branch().for_page(page, per_page).get()?;
        Ok(Paginator::new(items, total, per_page, page))
    }

    #[track_caller]
    pub fn paginate_as<T: FromRow>(&self, per_page: u64, page: u64) -> SqlResult<Paginator<T>> {
        self.paginate(per_page, page)?.try_map(|row| T::from_row(&row))
    }
}

fn first_value(rows: Vec<Row>) -> Value {
    rows.into_iter()
        .next()
        .and_then(|r| r.into_values().into_iter().next())
        .unwrap_or(Value::Null)
}
