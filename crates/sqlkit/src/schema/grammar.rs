//! DDL rendering per dialect.

use super::blueprint::Blueprint;
use super::column::{ColumnDefinition, ColumnType, ForeignKeyDefinition, IndexDefinition, IndexKind};
use crate::dialect::Dialect;
use crate::error::ValidationError;
use crate::value::Value;

/// Renders blueprints into statements for one dialect.
#[derive(Debug, Clone)]
pub struct Grammar {
    dialect: Dialect,
    charset: String,
}

impl Grammar {
    pub fn new(dialect: Dialect, charset: &str) -> Self {
        Self {
            dialect,
            charset: charset.to_string(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn quote_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `CREATE TABLE` followed by one `CREATE INDEX` per index.
    pub fn compile_create(&self, bp: &Blueprint) -> Result<Vec<String>, ValidationError> {
        self.check(bp)?;
        if bp.columns.is_empty() {
            return Err(ValidationError::argument(format!("table '{}' has no columns", bp.table())));
        }

        let mut parts: Vec<String> = bp.columns.iter().map(|c| self.column(c)).collect();
        let indexes = bp.all_indexes();
        for idx in indexes.iter().filter(|i| i.kind == IndexKind::Primary) {
            parts.push(format!("PRIMARY KEY ({})", self.quote_list(&idx.columns)));
        }
        for fk in &bp.foreign_keys {
            parts.push(self.foreign_key(fk));
        }

        let mut create = format!("CREATE TABLE {} ({})", self.quote(bp.table()), parts.join(", "));
        if self.dialect == Dialect::MySql {
            create.push_str(&format!(" ENGINE=InnoDB DEFAULT CHARSET={}", self.mysql_charset()?));
        }

        let mut out = vec![create];
        out.extend(
            indexes
                .iter()
                .filter(|i| i.kind != IndexKind::Primary)
                .map(|i| self.create_index(bp.table(), i)),
        );
        Ok(out)
    }

    /// Statements for altering an existing table.
    pub fn compile_alter(&self, bp: &Blueprint) -> Result<Vec<String>, ValidationError> {
        self.check(bp)?;
        let table = self.quote(bp.table());
        let mut out = Vec::new();

        for col in &bp.columns {
            if col.ty.is_auto_increment() && self.dialect == Dialect::Sqlite {
                return Err(ValidationError::argument(
                    "SQLite cannot add an auto-increment column to an existing table",
                ));
            }
            out.push(format!("ALTER TABLE {table} ADD COLUMN {}", self.column(col)));
        }
        for (from, to) in &bp.rename_columns {
            out.push(format!(
                "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                self.quote(from),
                self.quote(to)
            ));
        }
        for col in &bp.drop_columns {
            out.push(format!("ALTER TABLE {table} DROP COLUMN {}", self.quote(col)));
        }
        for name in &bp.drop_indexes {
            out.push(match self.dialect {
                Dialect::MySql => format!("DROP INDEX {} ON {table}", self.quote(name)),
                _ => format!("DROP INDEX {}", self.quote(name)),
            });
        }
        for idx in bp.all_indexes() {
            if idx.kind == IndexKind::Primary {
                if self.dialect == Dialect::Sqlite {
                    return Err(ValidationError::argument(
                        "SQLite cannot add a primary key to an existing table",
                    ));
                }
                out.push(format!(
                    "ALTER TABLE {table} ADD PRIMARY KEY ({})",
                    self.quote_list(&idx.columns)
                ));
            } else {
                out.push(self.create_index(bp.table(), &idx));
            }
        }
        for fk in &bp.foreign_keys {
            if self.dialect == Dialect::Sqlite {
                return Err(ValidationError::argument(
                    "SQLite cannot add a foreign key to an existing table",
                ));
            }
            out.push(format!("ALTER TABLE {table} ADD {}", self.foreign_key(fk)));
        }
        Ok(out)
    }

    pub fn compile_drop(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote(table))
    }

    pub fn compile_drop_if_exists(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    pub fn compile_rename(&self, from: &str, to: &str) -> String {
        match self.dialect {
            Dialect::MySql => format!("RENAME TABLE {} TO {}", self.quote(from), self.quote(to)),
            _ => format!("ALTER TABLE {} RENAME TO {}", self.quote(from), self.quote(to)),
        }
    }

    /// Query counting tables named `table`; the name is bound, never inlined.
    pub fn compile_has_table(&self, table: &str) -> (String, Vec<Value>) {
        let (schema, name) = split_schema(table);
        match self.dialect {
            Dialect::Sqlite => (
                "SELECT COUNT(*) AS \"aggregate\" FROM sqlite_master WHERE type = 'table' AND name = ?".to_string(),
                vec![name.into()],
            ),
            Dialect::Postgres => match schema {
                Some(schema) => (
                    "SELECT COUNT(*) AS \"aggregate\" FROM information_schema.tables WHERE table_schema = ? AND table_name = ?".to_string(),
                    vec![schema.into(), name.into()],
                ),
                None => (
                    "SELECT COUNT(*) AS \"aggregate\" FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = ?".to_string(),
                    vec![name.into()],
                ),
            },
            Dialect::MySql => match schema {
                Some(schema) => (
                    "SELECT COUNT(*) AS `aggregate` FROM information_schema.tables WHERE table_schema = ? AND table_name = ?".to_string(),
                    vec![schema.into(), name.into()],
                ),
                None => (
                    "SELECT COUNT(*) AS `aggregate` FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?".to_string(),
                    vec![name.into()],
                ),
            },
        }
    }

    /// Query counting columns named `column` on `table`.
    pub fn compile_has_column(&self, table: &str, column: &str) -> (String, Vec<Value>) {
        let (schema, name) = split_schema(table);
        match self.dialect {
            Dialect::Sqlite => (
                "SELECT COUNT(*) AS \"aggregate\" FROM pragma_table_info(?) WHERE name = ?".to_string(),
                vec![name.into(), column.into()],
            ),
            Dialect::Postgres | Dialect::MySql => {
                let agg = self.dialect.quote_segment("aggregate");
                let (schema_cond, mut bindings) = match (schema, self.dialect) {
                    (Some(s), _) => ("table_schema = ?", vec![Value::from(s)]),
                    (None, Dialect::Postgres) => ("table_schema = current_schema()", Vec::new()),
                    (None, _) => ("table_schema = DATABASE()", Vec::new()),
                };
                bindings.push(name.into());
                bindings.push(column.into());
                (
                    format!(
                        "SELECT COUNT(*) AS {agg} FROM information_schema.columns WHERE {schema_cond} AND table_name = ? AND column_name = ?"
                    ),
                    bindings,
                )
            }
        }
    }

    fn check(&self, bp: &Blueprint) -> Result<(), ValidationError> {
        match bp.validation_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn mysql_charset(&self) -> Result<&str, ValidationError> {
        let cs = self.charset.as_str();
        if cs.is_empty() || !cs.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ValidationError::argument(format!("invalid charset '{cs}'")));
        }
        Ok(cs)
    }

    fn create_index(&self, table: &str, idx: &IndexDefinition) -> String {
        let unique = if idx.kind == IndexKind::Unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {unique}INDEX {} ON {} ({})",
            self.quote(&idx.name),
            self.quote(table),
            self.quote_list(&idx.columns)
        )
    }

    fn foreign_key(&self, fk: &ForeignKeyDefinition) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote(&fk.name),
            self.quote_list(&fk.columns),
            self.quote(&fk.on),
            self.quote_list(&fk.references)
        );
        if let Some(action) = fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        if let Some(action) = fk.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.as_sql());
        }
        sql
    }

    /// `"name" TYPE [NOT NULL | NULL] [DEFAULT ...]`
    pub fn column(&self, col: &ColumnDefinition) -> String {
        let name = self.quote(&col.name);
        if col.ty.is_auto_increment() {
            return format!("{name} {}", self.auto_increment(col.ty));
        }

        let mut sql = format!("{name} {}", self.column_type(col));
        sql.push_str(if col.nullable { " NULL" } else { " NOT NULL" });
        if col.use_current {
            sql.push_str(" DEFAULT CURRENT_TIMESTAMP");
        } else if let Some(default) = &col.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_literal(col.ty, default));
        }
        sql
    }

    fn auto_increment(&self, ty: ColumnType) -> &'static str {
        let big = ty == ColumnType::BigIncrements;
        match (self.dialect, big) {
            (Dialect::MySql, false) => "INT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY",
            (Dialect::MySql, true) => "BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY",
            (Dialect::Postgres, false) => "SERIAL PRIMARY KEY",
            (Dialect::Postgres, true) => "BIGSERIAL PRIMARY KEY",
            // SQLite only auto-increments the INTEGER rowid alias.
            (Dialect::Sqlite, _) => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    fn column_type(&self, col: &ColumnDefinition) -> String {
        use ColumnType as T;
        let d = self.dialect;
        let base = match (col.ty, d) {
            (T::Increments | T::BigIncrements, _) => self.auto_increment(col.ty).to_string(),
            (T::Integer, Dialect::MySql) => "INT".to_string(),
            (T::Integer, _) => "INTEGER".to_string(),
            (T::BigInteger, Dialect::Sqlite) => "INTEGER".to_string(),
            (T::BigInteger, _) => "BIGINT".to_string(),
            (T::SmallInteger, Dialect::Sqlite) => "INTEGER".to_string(),
            (T::SmallInteger, _) => "SMALLINT".to_string(),
            (T::String(len), _) => format!("VARCHAR({len})"),
            (T::Text, _) => "TEXT".to_string(),
            (T::Boolean, Dialect::MySql) => "TINYINT(1)".to_string(),
            (T::Boolean, Dialect::Postgres) => "BOOLEAN".to_string(),
            (T::Boolean, Dialect::Sqlite) => "INTEGER".to_string(),
            (T::Float, Dialect::MySql) => "FLOAT".to_string(),
            (T::Float, _) => "REAL".to_string(),
            (T::Double, Dialect::MySql) => "DOUBLE".to_string(),
            (T::Double, Dialect::Postgres) => "DOUBLE PRECISION".to_string(),
            (T::Double, Dialect::Sqlite) => "REAL".to_string(),
            (T::Decimal(p, s), Dialect::Sqlite) => format!("NUMERIC({p}, {s})"),
            (T::Decimal(p, s), _) => format!("DECIMAL({p}, {s})"),
            (T::Date, _) => "DATE".to_string(),
            (T::Timestamp, Dialect::Sqlite) => "DATETIME".to_string(),
            (T::Timestamp, _) => "TIMESTAMP".to_string(),
            (T::Json, Dialect::MySql) => "JSON".to_string(),
            (T::Json, Dialect::Postgres) => "JSONB".to_string(),
            (T::Json, Dialect::Sqlite) => "TEXT".to_string(),
            (T::Binary, Dialect::Postgres) => "BYTEA".to_string(),
            (T::Binary, _) => "BLOB".to_string(),
        };
        if col.unsigned && d == Dialect::MySql && (col.ty.is_integer() || matches!(col.ty, T::Decimal(..))) {
            format!("{base} UNSIGNED")
        } else {
            base
        }
    }

    fn default_literal(&self, ty: ColumnType, value: &Value) -> String {
        match (value, self.dialect, ty) {
            (Value::Bool(b), Dialect::Postgres, ColumnType::Boolean) => {
                if *b { "TRUE" } else { "FALSE" }.to_string()
            }
            // MySQL TEXT/BLOB/JSON defaults must be parenthesized expressions.
            (v, Dialect::MySql, ColumnType::Text | ColumnType::Json | ColumnType::Binary) if !v.is_null() => {
                format!("({})", v.to_sql_literal())
            }
            (Value::Bytes(b), Dialect::Postgres, _) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                format!("'\\x{hex}'::bytea")
            }
            (v, _, _) => v.to_sql_literal(),
        }
    }
}

fn split_schema(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForeignKeyAction;

    fn users() -> Blueprint {
        let mut t = Blueprint::new("users");
        t.increments("id");
        t.string("email", 255).unique();
        t.boolean("active").default(true);
        t.text("bio").nullable();
        t.timestamp("created_at").use_current();
        t
    }

    #[test]
    fn create_table_per_dialect() {
        let bp = users();

        let sqlite = Grammar::new(Dialect::Sqlite, "utf8").compile_create(&bp).unwrap();
        assert_eq!(
            sqlite,
            vec![
                "CREATE TABLE \"users\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"email\" VARCHAR(255) NOT NULL, \
                 \"active\" INTEGER NOT NULL DEFAULT 1, \"bio\" TEXT NULL, \"created_at\" DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP)"
                    .to_string(),
                "CREATE UNIQUE INDEX \"users_email_unique\" ON \"users\" (\"email\")".to_string(),
            ]
        );

        let pg = Grammar::new(Dialect::Postgres, "utf8").compile_create(&bp).unwrap();
        assert!(pg[0].contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(pg[0].contains("\"active\" BOOLEAN NOT NULL DEFAULT TRUE"));

        let mysql = Grammar::new(Dialect::MySql, "utf8mb4").compile_create(&bp).unwrap();
        assert!(mysql[0].starts_with("CREATE TABLE `users` (`id` INT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY"));
        assert!(mysql[0].ends_with(") ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));
        assert_eq!(mysql[1], "CREATE UNIQUE INDEX `users_email_unique` ON `users` (`email`)");
    }

    #[test]
    fn foreign_keys_and_composite_keys() {
        let mut t = Blueprint::new("role_user");
        t.foreign_id("user_id");
        t.integer("role_id");
        t.primary(&["user_id", "role_id"]);
        t.foreign("user_id").on("users").on_delete(ForeignKeyAction::Cascade);

        let mysql = Grammar::new(Dialect::MySql, "utf8mb4").compile_create(&t).unwrap();
        assert!(mysql[0].contains("`user_id` BIGINT UNSIGNED NOT NULL"));
        assert!(mysql[0].contains("PRIMARY KEY (`user_id`, `role_id`)"));
        assert!(mysql[0].contains(
            "CONSTRAINT `role_user_user_id_foreign` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`) ON DELETE CASCADE"
        ));

        let pg = Grammar::new(Dialect::Postgres, "utf8").compile_create(&t).unwrap();
        assert!(pg[0].contains("\"user_id\" BIGINT NOT NULL"));
        assert_eq!(pg.len(), 1);
    }

    #[test]
    fn defaults_are_escaped_literals() {
        let mut t = Blueprint::new("t");
        t.string("name", 50).default("O'Brien");
        let sql = Grammar::new(Dialect::Sqlite, "utf8").compile_create(&t).unwrap();
        assert!(sql[0].contains("DEFAULT 'O''Brien'"));
    }

    #[test]
    fn alter_table_statements() {
        let mut t = Blueprint::new("users");
        t.string("nickname", 50).nullable().index();
        t.rename_column("bio", "about");
        t.drop_column("legacy");

        let sql = Grammar::new(Dialect::Sqlite, "utf8").compile_alter(&t).unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ADD COLUMN \"nickname\" VARCHAR(50) NULL",
                "ALTER TABLE \"users\" RENAME COLUMN \"bio\" TO \"about\"",
                "ALTER TABLE \"users\" DROP COLUMN \"legacy\"",
                "CREATE INDEX \"users_nickname_index\" ON \"users\" (\"nickname\")",
            ]
        );

        let mut fk = Blueprint::new("posts");
        fk.foreign("user_id").on("users");
        assert!(Grammar::new(Dialect::Sqlite, "utf8").compile_alter(&fk).is_err());
        let pg = Grammar::new(Dialect::Postgres, "utf8").compile_alter(&fk).unwrap();
        assert_eq!(
            pg[0],
            "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_user_id_foreign\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\")"
        );
    }

    #[test]
    fn rename_and_drop() {
        let mysql = Grammar::new(Dialect::MySql, "utf8mb4");
        assert_eq!(mysql.compile_rename("a", "b"), "RENAME TABLE `a` TO `b`");
        let pg = Grammar::new(Dialect::Postgres, "utf8");
        assert_eq!(pg.compile_rename("a", "b"), "ALTER TABLE \"a\" RENAME TO \"b\"");
        assert_eq!(pg.compile_drop_if_exists("a"), "DROP TABLE IF EXISTS \"a\"");
    }

    #[test]
    fn has_table_binds_names() {
        let (sql, bindings) = Grammar::new(Dialect::Postgres, "utf8").compile_has_table("app.users");
        assert!(sql.contains("table_schema = ? AND table_name = ?"));
        assert_eq!(bindings, vec![Value::from("app"), Value::from("users")]);
    }

    #[test]
    fn rejects_bad_charset_and_empty_tables() {
        let bp = users();
        assert!(Grammar::new(Dialect::MySql, "utf8; DROP").compile_create(&bp).is_err());
        assert!(Grammar::new(Dialect::Sqlite, "").compile_create(&Blueprint::new("empty")).is_err());
    }

    #[test]
    fn non_finite_default_never_reaches_ddl() {
        let mut bp = Blueprint::new("rates");
        bp.double("value").default(f64::NAN);
        for dialect in [Dialect::MySql, Dialect::Postgres, Dialect::Sqlite] {
            let grammar = Grammar::new(dialect, "utf8mb4");
            assert!(grammar.compile_create(&bp).is_err(), "{dialect}");
            assert!(grammar.compile_alter(&bp).is_err(), "{dialect}");
        }
    }
}
