//! SQL-file migrations on disk.
//!
//! Supported file names:
//! - `0001_create_users.sql` (up only)
//! - `0002_add_posts.up.sql` (up)
//! - `0002_add_posts.down.sql` (down)

use super::Migration;
use crate::error::{SqlError, SqlResult};
use crate::schema::Schema;
use heck::{ToSnakeCase, ToUpperCamelCase};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)_([a-z0-9_]+)$").expect("invalid built-in migration name regex"))
}

/// Whether `name` looks like `<sequence>_<snake_case_description>`.
pub fn is_valid_name(name: &str) -> bool {
    name_regex().is_match(name)
}

/// Deterministic class-style name: `0001_create_users_table` -> `CreateUsersTable`.
pub fn class_name(migration: &str) -> String {
    let description = match name_regex().captures(migration) {
        Some(caps) => caps.get(2).map_or(migration, |m| m.as_str()),
        None => migration.trim_start_matches(|c: char| c.is_ascii_digit() || c == '_'),
    };
    description.to_upper_camel_case()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Up,
    Down,
}

fn parse_file_name(file_name: &str) -> Option<(String, FileKind)> {
    let (stem, kind) = if let Some(stem) = file_name.strip_suffix(".down.sql") {
        (stem, FileKind::Down)
    } else if let Some(stem) = file_name.strip_suffix(".up.sql") {
        (stem, FileKind::Up)
    } else {
        (file_name.strip_suffix(".sql")?, FileKind::Up)
    };
    Some((stem.to_string(), kind))
}

/// A migration backed by SQL scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    pub name: String,
    pub up_path: PathBuf,
    pub down_path: Option<PathBuf>,
    pub up_sql: String,
    pub down_sql: Option<String>,
}

impl SqlMigration {
    /// In-memory migration, mostly for tests.
    pub fn new(name: impl Into<String>, up_sql: impl Into<String>, down_sql: Option<String>) -> Self {
        Self {
            name: name.into(),
            up_path: PathBuf::new(),
            down_path: None,
            up_sql: up_sql.into(),
            down_sql,
        }
    }

    pub fn class_name(&self) -> String {
        class_name(&self.name)
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, schema: &Schema<'_>) -> SqlResult<()> {
        schema.unprepared(&self.up_sql)
    }

    fn down(&self, schema: &Schema<'_>) -> SqlResult<()> {
        match &self.down_sql {
            Some(sql) => schema.unprepared(sql),
            None => Err(SqlError::Config(format!(
                "migration '{}' has no down script (.down.sql)",
                self.name
            ))),
        }
    }

    fn reversible(&self) -> bool {
        self.down_sql.is_some()
    }
}

#[derive(Debug, Default)]
struct Partial {
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

/// Load every migration in `dir`, sorted by name.
///
/// Non-`.sql` files are ignored. A `.sql` file whose name does not match
/// `<digits>_<snake_case>` is an error, as is a down script without an up.
pub fn load_dir(dir: impl AsRef<Path>) -> SqlResult<Vec<SqlMigration>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| {
        SqlError::Config(format!("failed to read migrations dir {}: {e}", dir.display()))
    })?;

    let mut by_name: BTreeMap<String, Partial> = BTreeMap::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((name, kind)) = parse_file_name(file_name) else {
            continue;
        };
        if !is_valid_name(&name) {
            return Err(SqlError::Config(format!(
                "invalid migration file name '{file_name}': expected <sequence>_<snake_case>.sql"
            )));
        }

        let slot = by_name.entry(name.clone()).or_default();
        let target = match kind {
            FileKind::Up => &mut slot.up,
            FileKind::Down => &mut slot.down,
        };
        if target.is_some() {
            return Err(SqlError::Config(format!(
                "duplicate {} script for migration {name}",
                if kind == FileKind::Up { "up" } else { "down" }
            )));
        }
        *target = Some(path);
    }

    let mut out = Vec::with_capacity(by_name.len());
    for (name, partial) in by_name {
        let Some(up_path) = partial.up else {
            return Err(SqlError::Config(format!(
                "migration {name} has a down script but no up script"
            )));
        };
        let up_sql = fs::read_to_string(&up_path)?;
        let down_sql = partial.down.as_ref().map(fs::read_to_string).transpose()?;
        out.push(SqlMigration {
            name,
            up_path,
            down_path: partial.down,
            up_sql,
            down_sql,
        });
    }
    tracing::debug!(target: "sqlkit.migrate", dir = %dir.display(), count = out.len(), "loaded migrations");
    Ok(out)
}

/// Create `<next>_<name>.up.sql` (and `.down.sql` unless `with_down` is
/// false) in `dir`. The sequence is one more than the highest on disk,
/// zero-padded to four digits.
pub fn create_migration_files(dir: impl AsRef<Path>, name: &str, with_down: bool) -> SqlResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let description = name.to_snake_case();
    if description.is_empty() || !description.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SqlError::Config(format!("invalid migration name '{name}'")));
    }
    fs::create_dir_all(dir)?;

    let mut next = 1u64;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some((stem, _)) = parse_file_name(file_name)
            && let Some(caps) = name_regex().captures(&stem)
        {
            let following = caps[1].parse::<u64>().ok().and_then(|seq| seq.checked_add(1));
            let Some(following) = following else {
                return Err(SqlError::Config(format!(
                    "migration sequence exhausted by {file_name}"
                )));
            };
            next = next.max(following);
        }
    }

    let stem = format!("{next:04}_{description}");
    let up = dir.join(format!("{stem}.up.sql"));
    fs::write(&up, format!("-- {}: up\n", class_name(&stem)))?;
    let mut created = vec![up];
    if with_down {
        let down = dir.join(format!("{stem}.down.sql"));
        fs::write(&down, format!("-- {}: down\n", class_name(&stem)))?;
        created.push(down);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_are_derived_from_file_names() {
        assert_eq!(class_name("0001_create_users_table"), "CreateUsersTable");
        assert_eq!(class_name("20240101120000_add_index"), "AddIndex");
        assert!(is_valid_name("0002_add_posts"));
        assert!(!is_valid_name("add_posts"));
        assert!(!is_valid_name("0002_Add-Posts"));
    }

    #[test]
    fn parses_file_kinds() {
        assert_eq!(parse_file_name("0001_a.up.sql"), Some(("0001_a".to_string(), FileKind::Up)));
        assert_eq!(parse_file_name("0001_a.down.sql"), Some(("0001_a".to_string(), FileKind::Down)));
        assert_eq!(parse_file_name("0001_a.sql"), Some(("0001_a".to_string(), FileKind::Up)));
        assert_eq!(parse_file_name("README.md"), None);
    }

    #[test]
    fn loads_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0002_b.up.sql"), "CREATE TABLE b (id INTEGER)").unwrap();
        fs::write(dir.path().join("0002_b.down.sql"), "DROP TABLE b").unwrap();
        fs::write(dir.path().join("0001_a.sql"), "CREATE TABLE a (id INTEGER)").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let migrations = load_dir(dir.path()).unwrap();
        let names: Vec<_> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["0001_a", "0002_b"]);
        assert!(!migrations[0].reversible());
        assert_eq!(migrations[1].down_sql.as_deref(), Some("DROP TABLE b"));
    }

    #[test]
    fn rejects_orphan_down_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001_a.down.sql"), "DROP TABLE a").unwrap();
        assert!(load_dir(dir.path()).is_err());

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("create users.sql"), "").unwrap();
        assert!(load_dir(dir.path()).is_err());
    }

    #[test]
    fn creates_next_sequence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0007_old.sql"), "").unwrap();
        let created = create_migration_files(dir.path(), "AddUsersTable", true).unwrap();
        let names: Vec<_> = created
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["0008_add_users_table.up.sql", "0008_add_users_table.down.sql"]);

        let created = create_migration_files(dir.path(), "seed", false).unwrap();
        assert_eq!(created.len(), 1);
        assert!(created[0].ends_with("0009_seed.up.sql"));
    }

    #[test]
    fn refuses_to_overflow_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(format!("{}_last.sql", u64::MAX)), "").unwrap();
        let err = create_migration_files(dir.path(), "next", true).unwrap_err();
        assert!(matches!(err, SqlError::Config(_)), "{err}");

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("99999999999999999999999_huge.sql"), "").unwrap();
        assert!(create_migration_files(dir.path(), "next", true).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
