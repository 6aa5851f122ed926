//! Table definition DSL.

use super::column::{
    ColumnDefinition, ColumnType, ForeignKeyDefinition, IndexDefinition, IndexKind,
};
use crate::error::ValidationError;
use crate::ident::Ident;
use crate::value::Value;

/// Validate a plain (undotted) column name.
pub(crate) fn column_name(name: &str) -> Result<String, ValidationError> {
    let ident = Ident::parse(name)?;
    if ident.parts().len() != 1 || ident.name() == "*" {
        return Err(ValidationError::identifier(name, "expected a plain column name"));
    }
    Ok(ident.name().to_string())
}

/// Validate a table name, optionally schema-qualified.
pub(crate) fn table_name(name: &str) -> Result<String, ValidationError> {
    let ident = Ident::parse(name)?;
    if ident.parts().len() > 2 || ident.parts().iter().any(|p| p == "*") {
        return Err(ValidationError::identifier(name, "expected a table name"));
    }
    Ok(ident.parts().join("."))
}

/// Columns, indexes and foreign keys for one table.
///
/// Only the typed builder methods add columns; there is no way to pass a raw
/// column definition. Invalid names are remembered and reported when the
/// blueprint is compiled.
///
/// ```ignore
/// schema.create("posts", |t| {
///     t.increments("id");
///     t.foreign_id("user_id");
///     t.string("title", 200);
///     t.text("body").nullable();
///     t.boolean("published").default(false);
///     t.timestamps();
///     t.foreign("user_id").on("users").cascade_on_delete();
///     t.index(&["user_id", "published"]);
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct Blueprint {
    table: String,
    pub(crate) columns: Vec<ColumnDefinition>,
    pub(crate) indexes: Vec<IndexDefinition>,
    pub(crate) foreign_keys: Vec<ForeignKeyDefinition>,
    pub(crate) drop_columns: Vec<String>,
    pub(crate) rename_columns: Vec<(String, String)>,
    pub(crate) drop_indexes: Vec<String>,
    error: Option<ValidationError>,
}

impl Blueprint {
    pub fn new(table: &str) -> Self {
        let mut bp = Self {
            table: String::new(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            drop_columns: Vec::new(),
            rename_columns: Vec::new(),
            drop_indexes: Vec::new(),
            error: None,
        };
        match table_name(table) {
            Ok(name) => bp.table = name,
            Err(e) => {
                bp.table = table.to_string();
                bp.error = Some(e);
            }
        }
        bp
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// First validation failure across the blueprint, its column defaults and
    /// its foreign keys.
    pub(crate) fn validation_error(&self) -> Option<ValidationError> {
        self.error
            .clone()
            .or_else(|| {
                self.columns.iter().find_map(|c| match c.default {
                    Some(Value::Float(f)) if !f.is_finite() => Some(ValidationError::argument(format!(
                        "default for column '{}' must be a finite number, got {f}",
                        c.name
                    ))),
                    _ => None,
                })
            })
            .or_else(|| self.foreign_keys.iter().find_map(|fk| fk.error.clone()))
            .or_else(|| {
                self.foreign_keys
                    .iter()
                    .find(|fk| fk.on.is_empty())
                    .map(|fk| ValidationError::argument(format!("foreign key '{}' has no referenced table", fk.name)))
            })
    }

    fn remember(&mut self, e: ValidationError) {
        self.error.get_or_insert(e);
    }

    fn checked_column(&mut self, name: &str) -> String {
        match column_name(name) {
            Ok(n) => n,
            Err(e) => {
                self.remember(e);
                name.to_string()
            }
        }
    }

    fn checked_columns(&mut self, columns: &[&str]) -> Vec<String> {
        if columns.is_empty() {
            self.remember(ValidationError::argument("index requires at least one column"));
        }
        columns.iter().map(|c| self.checked_column(c)).collect()
    }

    /// `{table}_{col1}_{col2}_{suffix}`
    fn index_name(&self, columns: &[String], suffix: &str) -> String {
        format!(
            "{}_{}_{}",
            self.table.replace('.', "_"),
            columns.join("_"),
            suffix
        )
        .to_lowercase()
    }

    /// Add a column of the given type.
    pub fn add_column(&mut self, name: &str, ty: ColumnType) -> &mut ColumnDefinition {
        let name = self.checked_column(name);
        self.columns.push(ColumnDefinition::new(name, ty));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    // ==================== column types ====================

    /// Auto-incrementing integer primary key.
    pub fn increments(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Increments)
    }

    pub fn big_increments(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::BigIncrements)
    }

    /// Shorthand for `big_increments("id")`.
    pub fn id(&mut self) -> &mut ColumnDefinition {
        self.big_increments("id")
    }

    pub fn integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::BigInteger)
    }

    pub fn small_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::SmallInteger)
    }

    /// `VARCHAR(len)`
    pub fn string(&mut self, name: &str, len: u32) -> &mut ColumnDefinition {
        if len == 0 {
            self.remember(ValidationError::argument(format!("string column '{name}' needs a length")));
        }
        self.add_column(name, ColumnType::String(len))
    }

    pub fn text(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Text)
    }

    pub fn boolean(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Boolean)
    }

    pub fn float(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Float)
    }

    pub fn double(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Double)
    }

    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> &mut ColumnDefinition {
        if precision == 0 || scale > precision {
            self.remember(ValidationError::argument(format!(
                "decimal column '{name}': invalid precision {precision}, scale {scale}"
            )));
        }
        self.add_column(name, ColumnType::Decimal(precision, scale))
    }

    pub fn date(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Date)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Timestamp)
    }

    /// Nullable `created_at` and `updated_at`.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    pub fn json(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Json)
    }

    pub fn binary(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Binary)
    }

    /// Unsigned big integer for referencing a `big_increments` key.
    pub fn foreign_id(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::BigInteger).unsigned()
    }

    // ==================== indexes ====================

    fn push_index(&mut self, columns: &[&str], kind: IndexKind) {
        let columns = self.checked_columns(columns);
        let name = self.index_name(&columns, kind.suffix());
        self.indexes.push(IndexDefinition {
            name,
            kind,
            columns,
        });
    }

    pub fn index(&mut self, columns: &[&str]) {
        self.push_index(columns, IndexKind::Index);
    }

    pub fn unique(&mut self, columns: &[&str]) {
        self.push_index(columns, IndexKind::Unique);
    }

    /// Composite primary key.
    pub fn primary(&mut self, columns: &[&str]) {
        self.push_index(columns, IndexKind::Primary);
    }

    /// Foreign key from `column` (references `id` unless changed).
    pub fn foreign(&mut self, column: &str) -> &mut ForeignKeyDefinition {
        let columns = vec![self.checked_column(column)];
        let name = self.index_name(&columns, "foreign");
        self.foreign_keys.push(ForeignKeyDefinition::new(name, columns));
        let last = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[last]
    }

    // ==================== alterations ====================

    pub fn drop_column(&mut self, name: &str) {
        let name = self.checked_column(name);
        self.drop_columns.push(name);
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        let from = self.checked_column(from);
        let to = self.checked_column(to);
        self.rename_columns.push((from, to));
    }

    /// Drop an index by name, as generated by [`index`](Self::index) or [`unique`](Self::unique).
    pub fn drop_index(&mut self, name: &str) {
        let name = self.checked_column(name);
        self.drop_indexes.push(name);
    }

    /// Indexes requested on columns plus the explicit ones.
    pub(crate) fn all_indexes(&self) -> Vec<IndexDefinition> {
        let mut out = Vec::new();
        for col in &self.columns {
            for (flag, kind) in [(col.unique, IndexKind::Unique), (col.index, IndexKind::Index)] {
                if flag {
                    let columns = vec![col.name.clone()];
                    out.push(IndexDefinition {
                        name: self.index_name(&columns, kind.suffix()),
                        kind,
                        columns,
                    });
                }
            }
        }
        out.extend(self.indexes.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_columns_with_modifiers() {
        let mut t = Blueprint::new("users");
        t.increments("id");
        t.string("email", 255).unique();
        t.integer("age").nullable().default(18);
        assert_eq!(t.columns().len(), 3);
        assert!(t.columns()[1].unique);
        assert!(t.columns()[2].nullable);
        assert_eq!(t.columns()[2].default, Some(crate::Value::Int(18)));
        assert!(t.validation_error().is_none());
    }

    #[test]
    fn index_names_follow_table_and_columns() {
        let mut t = Blueprint::new("app.posts");
        t.string("slug", 100).unique();
        t.index(&["user_id", "published"]);
        let names: Vec<_> = t.all_indexes().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["app_posts_slug_unique", "app_posts_user_id_published_index"]);
    }

    #[test]
    fn invalid_names_are_reported() {
        let mut t = Blueprint::new("users");
        t.string("email; DROP TABLE users", 10);
        assert!(matches!(
            t.validation_error(),
            Some(ValidationError::InvalidIdentifier { .. })
        ));

        let mut t = Blueprint::new("users");
        t.integer("a.b");
        assert!(t.validation_error().is_some());

        assert!(Blueprint::new("bad table!").validation_error().is_some());
    }

    #[test]
    fn non_finite_float_defaults_are_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut t = Blueprint::new("prices");
            t.double("amount").default(bad);
            assert!(
                matches!(t.validation_error(), Some(ValidationError::InvalidArgument(_))),
                "{bad}"
            );
        }
        let mut t = Blueprint::new("prices");
        t.double("amount").default(1.5);
        assert!(t.validation_error().is_none());
    }

    #[test]
    fn foreign_key_requires_table() {
        let mut t = Blueprint::new("posts");
        t.foreign_id("user_id");
        t.foreign("user_id");
        assert!(matches!(
            t.validation_error(),
            Some(ValidationError::InvalidArgument(_))
        ));

        let mut t = Blueprint::new("posts");
        t.foreign("user_id").references("id").on("users");
        assert!(t.validation_error().is_none());
        assert_eq!(t.foreign_keys[0].name, "posts_user_id_foreign");
    }
}
