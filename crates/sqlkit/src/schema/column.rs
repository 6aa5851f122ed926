//! Column, index and foreign-key definitions collected by a [`Blueprint`](super::Blueprint).

use crate::value::Value;

/// Abstract column type; the grammar maps it per dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key
    Increments,
    /// Auto-incrementing 64-bit primary key
    BigIncrements,
    Integer,
    BigInteger,
    SmallInteger,
    /// `VARCHAR(len)`
    String(u32),
    Text,
    Boolean,
    Float,
    Double,
    /// `DECIMAL(precision, scale)`
    Decimal(u8, u8),
    Date,
    Timestamp,
    Json,
    Binary,
}

impl ColumnType {
    pub fn is_auto_increment(self) -> bool {
        matches!(self, ColumnType::Increments | ColumnType::BigIncrements)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::BigInteger | ColumnType::SmallInteger
        )
    }
}

/// One column of a table being created or altered.
///
/// Columns are `NOT NULL` unless [`nullable`](Self::nullable) is called.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub use_current: bool,
    pub unsigned: bool,
    pub unique: bool,
    pub index: bool,
}

impl ColumnDefinition {
    pub(crate) fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
            use_current: false,
            unsigned: false,
            unique: false,
            index: false,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Default rendered as an escaped literal.
    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(value.into());
        self
    }

    /// `DEFAULT CURRENT_TIMESTAMP`
    pub fn use_current(&mut self) -> &mut Self {
        self.use_current = true;
        self
    }

    /// Only meaningful on MySQL; ignored elsewhere.
    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    /// Add a single-column unique index.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    /// Add a single-column index.
    pub fn index(&mut self) -> &mut Self {
        self.index = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Index,
    Unique,
    Primary,
}

impl IndexKind {
    pub(crate) fn suffix(self) -> &'static str {
        match self {
            IndexKind::Index => "index",
            IndexKind::Unique => "unique",
            IndexKind::Primary => "primary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<String>,
}

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// `FOREIGN KEY (columns) REFERENCES on (references)`.
///
/// ```ignore
/// t.foreign("user_id").references("id").on("users").on_delete(ForeignKeyAction::Cascade);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub references: Vec<String>,
    pub on: String,
    pub on_delete: Option<ForeignKeyAction>,
    pub on_update: Option<ForeignKeyAction>,
    /// First invalid name passed to a builder method.
    pub(crate) error: Option<crate::error::ValidationError>,
}

impl ForeignKeyDefinition {
    pub(crate) fn new(name: String, columns: Vec<String>) -> Self {
        Self {
            name,
            columns,
            references: vec!["id".to_string()],
            on: String::new(),
            on_delete: None,
            on_update: None,
            error: None,
        }
    }

    fn record(&mut self, result: Result<String, crate::error::ValidationError>) -> Option<String> {
        match result {
            Ok(name) => Some(name),
            Err(e) => {
                self.error.get_or_insert(e);
                None
            }
        }
    }

    /// Referenced column (defaults to `id`).
    pub fn references(&mut self, column: &str) -> &mut Self {
        if let Some(col) = self.record(super::blueprint::column_name(column)) {
            self.references = vec![col];
        }
        self
    }

    /// Referenced table.
    pub fn on(&mut self, table: &str) -> &mut Self {
        if let Some(table) = self.record(super::blueprint::table_name(table)) {
            self.on = table;
        }
        self
    }

    pub fn on_delete(&mut self, action: ForeignKeyAction) -> &mut Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(&mut self, action: ForeignKeyAction) -> &mut Self {
        self.on_update = Some(action);
        self
    }

    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.on_delete(ForeignKeyAction::Cascade)
    }

    pub fn null_on_delete(&mut self) -> &mut Self {
        self.on_delete(ForeignKeyAction::SetNull)
    }
}
