use crate::cli::{MigrateCommand, MigrateNewArgs, MigrateRollbackArgs, MigrateRunArgs, ProjectArgs};
use crate::config::ProjectConfig;
use anyhow::Context;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use sqlkit::migrate::{
    DEFAULT_MIGRATION_TABLE, MigrationStatus, Migrator, RunOptions, SqlMigration,
    create_migration_files, load_dir,
};
use sqlkit::{Connection, ConnectionConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub fn run(cmd: MigrateCommand) -> anyhow::Result<()> {
    match cmd {
        MigrateCommand::Install(args) => run_install(args),
        MigrateCommand::Run(args) => run_run(args),
        MigrateCommand::Rollback(args) => run_rollback(args),
        MigrateCommand::Reset(args) => run_reset(args),
        MigrateCommand::Refresh(args) => run_refresh(args),
        MigrateCommand::Status(args) => run_status(args),
        MigrateCommand::New(args) => run_new(args),
    }
}

/// An open connection plus everything needed to build a [`Migrator`].
struct Project {
    conn: Connection,
    dir: PathBuf,
    table: String,
    transactional: bool,
    migrations: Vec<SqlMigration>,
}

impl Project {
    fn open(args: ProjectArgs) -> anyhow::Result<Self> {
        let cfg = resolve_config(&args.config)?;
        let dir = resolve_dir(cfg.as_ref(), args.dir);
        let db = resolve_database(&args.config, cfg.as_ref(), args.database)?;

        let conn = Connection::open(&db).with_context(|| {
            format!("failed to connect to {} database {}", db.driver, db.database)
        })?;

        let migrations = if dir.exists() {
            load_dir(&dir).with_context(|| format!("failed to load migrations from {}", dir.display()))?
        } else {
            tracing::debug!(dir = %dir.display(), "migrations dir does not exist");
            Vec::new()
        };

        let (table, transactional) = match &cfg {
            Some(c) => (c.file.migrations.table.clone(), c.file.migrations.transactional),
            None => (DEFAULT_MIGRATION_TABLE.to_string(), false),
        };

        Ok(Self {
            conn,
            dir,
            table,
            transactional,
            migrations,
        })
    }

    fn migrator(&self) -> anyhow::Result<Migrator<'_>> {
        Ok(Migrator::new(&self.conn)
            .with_table(&self.table)?
            .transactional(self.transactional)
            .with_migrations(self.migrations.iter().cloned()))
    }
}

fn resolve_config(config: &Path) -> anyhow::Result<Option<ProjectConfig>> {
    if config.exists() {
        Ok(Some(ProjectConfig::load(config)?))
    } else {
        Ok(None)
    }
}

fn resolve_dir(config: Option<&ProjectConfig>, dir: Option<PathBuf>) -> PathBuf {
    match dir {
        Some(path) => path,
        None => config
            .map(|c| c.resolve_path(&c.file.migrations.dir))
            .unwrap_or_else(|| PathBuf::from("migrations")),
    }
}

/// Connection settings from the config file, with `--database` replacing the
/// database name. Without a config file `--database` is a SQLite path.
fn resolve_database(
    config_path: &Path,
    config: Option<&ProjectConfig>,
    database: Option<String>,
) -> anyhow::Result<ConnectionConfig> {
    match (config, database) {
        (Some(cfg), Some(db)) => {
            let mut conn = cfg.connection();
            conn.database = db;
            Ok(conn)
        }
        (Some(cfg), None) => Ok(cfg.connection()),
        (None, Some(db)) => Ok(ConnectionConfig::sqlite(db)),
        (None, None) => anyhow::bail!(
            "database is required: pass --database or provide {}",
            config_path.display()
        ),
    }
}

fn print_names(done: &str, nothing: &str, names: &[String]) {
    if names.is_empty() {
        println!("{}", nothing.dimmed());
        return;
    }
    println!("{} {} migration(s)", done.green().bold(), names.len());
    for name in names {
        println!("  {} {}", "✓".green(), name);
    }
}

fn run_install(args: ProjectArgs) -> anyhow::Result<()> {
    let project = Project::open(args)?;
    let migrator = project.migrator()?;
    let existed = migrator.repository_exists()?;
    migrator.install()?;
    if existed {
        println!("migration table already exists: {}", project.table);
    } else {
        println!("{} migration table {}", "created".green().bold(), project.table);
    }
    Ok(())
}

fn run_run(args: MigrateRunArgs) -> anyhow::Result<()> {
    let project = Project::open(args.project)?;
    let migrator = project.migrator()?;

    if args.dry_run {
        let plan = migrator.pretend()?;
        if plan.is_empty() {
            println!("{}", "no pending migrations".dimmed());
            return Ok(());
        }
        println!("pending migrations (dry-run):");
        for (name, statements) in plan {
            println!("\n{}", format!("-- {name}").cyan().bold());
            for sql in statements {
                println!("{}", sql.trim_end());
            }
        }
        return Ok(());
    }

    let applied = migrator.run_with(RunOptions { step: args.step })?;
    print_names("applied", "no pending migrations", &applied);
    Ok(())
}

fn run_rollback(args: MigrateRollbackArgs) -> anyhow::Result<()> {
    let project = Project::open(args.project)?;
    let migrator = project.migrator()?;

    if args.dry_run {
        let repo = migrator.repository();
        let candidates = if !repo.exists()? {
            Vec::new()
        } else {
            match args.steps {
                Some(n) => repo.last_n(n)?,
                None => repo.last_batch()?,
            }
        };
        if candidates.is_empty() {
            println!("{}", "no migrations to roll back".dimmed());
        } else {
            println!("rollback migrations (dry-run):");
            for record in candidates {
                println!("  {} (batch {})", record.migration, record.batch);
            }
        }
        return Ok(());
    }

    let reverted = migrator.rollback(args.steps)?;
    print_names("rolled back", "no migrations to roll back", &reverted);
    Ok(())
}

fn run_reset(args: ProjectArgs) -> anyhow::Result<()> {
    let project = Project::open(args)?;
    let reverted = project.migrator()?.reset()?;
    print_names("rolled back", "no migrations to roll back", &reverted);
    Ok(())
}

fn run_refresh(args: ProjectArgs) -> anyhow::Result<()> {
    let project = Project::open(args)?;
    let applied = project.migrator()?.refresh()?;
    print_names("re-applied", "no migrations to apply", &applied);
    Ok(())
}

fn run_status(args: ProjectArgs) -> anyhow::Result<()> {
    let project = Project::open(args)?;
    let migrator = project.migrator()?;
    let status = migrator.status()?;
    let local: HashSet<&str> = migrator.names().into_iter().collect();

    println!("migrations dir: {}", project.dir.display());
    if status.is_empty() {
        println!("{}", "no migrations found".dimmed());
        return Ok(());
    }
    println!("{}", status_table(&status, &local));

    let pending = status.iter().filter(|s| !s.is_applied()).count();
    let missing = status.iter().filter(|s| !local.contains(s.name.as_str())).count();
    println!(
        "applied: {}  pending: {}",
        status.len() - pending,
        if pending > 0 {
            pending.to_string().yellow()
        } else {
            pending.to_string().normal()
        }
    );
    if missing > 0 {
        println!(
            "{} {missing} applied migration(s) have no file on disk",
            "warning:".yellow().bold()
        );
    }
    Ok(())
}

fn status_table(status: &[MigrationStatus], local: &HashSet<&str>) -> Table {
    let header = |s: &str| Cell::new(s).add_attribute(Attribute::Bold).fg(Color::Cyan);
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header("Migration"),
            header("Class"),
            header("Batch"),
            header("Executed at"),
            header("Status"),
        ]);

    for s in status {
        let state = match (s.is_applied(), local.contains(s.name.as_str())) {
            (true, true) => Cell::new("applied").fg(Color::Green),
            (true, false) => Cell::new("missing file").fg(Color::Red),
            (false, _) => Cell::new("pending").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(&s.name),
            Cell::new(&s.class_name).fg(Color::DarkGrey),
            Cell::new(s.batch.map(|b| b.to_string()).unwrap_or_default()),
            Cell::new(s.executed_at.as_deref().unwrap_or("")),
            state,
        ]);
    }
    table
}

fn run_new(args: MigrateNewArgs) -> anyhow::Result<()> {
    let cfg = resolve_config(&args.project.config)?;
    let dir = resolve_dir(cfg.as_ref(), args.project.dir);
    let created = create_migration_files(&dir, &args.name, args.with_down)
        .with_context(|| format!("failed to create migration in {}", dir.display()))?;
    for path in created {
        println!("{} {}", "created".green(), path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project(root: &Path) -> ProjectArgs {
        let config = root.join("sqlkit.toml");
        fs::write(
            &config,
            "[database]\ndriver = \"sqlite\"\ndatabase = \"app.db\"\n\n[migrations]\ndir = \"migrations\"\ntable = \"schema_migrations\"\n",
        )
        .unwrap();
        ProjectArgs {
            config,
            database: None,
            dir: None,
        }
    }

    fn has_table(root: &Path, table: &str) -> bool {
        let conn = Connection::open(&ConnectionConfig::sqlite(root.join("app.db").to_string_lossy())).unwrap();
        conn.schema().has_table(table).unwrap()
    }

    #[test]
    fn new_run_status_rollback() {
        let root = tempfile::tempdir().unwrap();
        let args = project(root.path());

        run_new(MigrateNewArgs {
            project: args.clone(),
            name: "Create users".to_string(),
            with_down: true,
        })
        .unwrap();
        let dir = root.path().join("migrations");
        assert!(dir.join("0001_create_users.up.sql").exists());
        fs::write(dir.join("0001_create_users.up.sql"), "CREATE TABLE users (id INTEGER);").unwrap();
        fs::write(dir.join("0001_create_users.down.sql"), "DROP TABLE users;").unwrap();

        run_run(MigrateRunArgs {
            project: args.clone(),
            step: false,
            dry_run: true,
        })
        .unwrap();
        assert!(!has_table(root.path(), "users"));

        run_run(MigrateRunArgs {
            project: args.clone(),
            step: false,
            dry_run: false,
        })
        .unwrap();
        assert!(has_table(root.path(), "users"));
        assert!(has_table(root.path(), "schema_migrations"));

        run_status(args.clone()).unwrap();

        run_rollback(MigrateRollbackArgs {
            project: args.clone(),
            steps: None,
            dry_run: false,
        })
        .unwrap();
        assert!(!has_table(root.path(), "users"));
    }

    #[test]
    fn database_override_without_config_is_a_sqlite_path() {
        let missing = Path::new("definitely/not/here/sqlkit.toml");
        let db = resolve_database(missing, None, Some("x.db".to_string())).unwrap();
        assert_eq!(db.driver, sqlkit::Dialect::Sqlite);
        assert_eq!(db.database, "x.db");
        assert!(resolve_database(missing, None, None).is_err());
    }
}
