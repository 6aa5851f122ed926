//! Versioned migrations with batch tracking.
//!
//! Each [`run`](Migrator::run) applies every pending migration in ascending
//! name order and records them under one new batch number;
//! [`rollback`](Migrator::rollback) reverts the most recent batch (or the
//! last N migrations) newest first.
//!
//! DDL auto-commits on MySQL, so a migration that fails halfway leaves its
//! earlier statements applied. The failing migration is not recorded, the
//! ones before it in the batch are, and the error is returned wrapped in
//! [`SqlError::Migration`]. On Postgres and SQLite each migration can be run
//! inside a transaction with [`Migrator::transactional`].
//!
//! # Example
//!
//! ```ignore
//! use sqlkit::migrate::{Migrator, load_dir};
//!
//! let migrator = Migrator::new(&conn).with_migrations(load_dir("migrations")?);
//! let applied = migrator.run()?;
//! migrator.rollback(None)?;
//! ```

mod repository;
mod source;

pub use repository::{DEFAULT_MIGRATION_TABLE, MigrationRecord, MigrationRepository};
pub use source::{SqlMigration, class_name, create_migration_files, is_valid_name, load_dir};

use crate::connection::Connection;
use crate::error::{SqlError, SqlResult, ValidationError};
use crate::schema::Schema;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// One reversible schema change.
pub trait Migration {
    /// Unique name; sorting by name gives application order.
    fn name(&self) -> &str;

    fn up(&self, schema: &Schema<'_>) -> SqlResult<()>;

    fn down(&self, schema: &Schema<'_>) -> SqlResult<()>;

    /// Whether [`down`](Self::down) can run. Rollback checks this for every
    /// migration it is about to revert before reverting any.
    fn reversible(&self) -> bool {
        true
    }
}

/// Options for [`Migrator::run_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Give every migration its own batch so each can be rolled back alone.
    pub step: bool,
}

/// Applied/pending state of one known migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    pub class_name: String,
    pub batch: Option<i64>,
    pub executed_at: Option<String>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.batch.is_some()
    }
}

/// Applies and reverts migrations against one connection.
pub struct Migrator<'c> {
    conn: &'c Connection,
    repository: MigrationRepository<'c>,
    migrations: BTreeMap<String, Box<dyn Migration + 'c>>,
    duplicate: Option<String>,
    transactional: bool,
}

impl std::fmt::Debug for Migrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("table", &self.repository.table())
            .field("migrations", &self.migrations.keys().collect::<Vec<_>>())
            .field("transactional", &self.transactional)
            .finish()
    }
}

impl<'c> Migrator<'c> {
    /// Migrator using the default `migrations` tracking table.
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            repository: MigrationRepository::new(conn, DEFAULT_MIGRATION_TABLE.to_string()),
            migrations: BTreeMap::new(),
            duplicate: None,
            transactional: false,
        }
    }

    /// Use a different tracking table.
    pub fn with_table(mut self, table: &str) -> SqlResult<Self> {
        let ident = crate::ident::Ident::parse(table)?;
        if ident.parts().len() > 2 {
            return Err(ValidationError::identifier(table, "expected a table name").into());
        }
        self.repository = MigrationRepository::new(self.conn, ident.parts().join("."));
        Ok(self)
    }

    /// Run each migration inside a transaction where the dialect supports
    /// transactional DDL. Ignored, with a warning, on MySQL.
    pub fn transactional(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    pub fn add(mut self, migration: impl Migration + 'c) -> Self {
        self.push(Box::new(migration));
        self
    }

    pub fn with_migrations<M: Migration + 'c>(mut self, migrations: impl IntoIterator<Item = M>) -> Self {
        for m in migrations {
            self.push(Box::new(m));
        }
        self
    }

    fn push(&mut self, migration: Box<dyn Migration + 'c>) {
        let name = migration.name().to_string();
        if self.migrations.contains_key(&name) {
            self.duplicate.get_or_insert(name);
            return;
        }
        self.migrations.insert(name, migration);
    }

    pub fn repository(&self) -> &MigrationRepository<'c> {
        &self.repository
    }

    /// Known migration names in application order.
    pub fn names(&self) -> Vec<&str> {
        self.migrations.keys().map(String::as_str).collect()
    }

    fn check_unique(&self) -> SqlResult<()> {
        match &self.duplicate {
            Some(name) => Err(ValidationError::argument(format!("duplicate migration name '{name}'")).into()),
            None => Ok(()),
        }
    }

    // ==================== repository ====================

    pub fn repository_exists(&self) -> SqlResult<bool> {
        self.repository.exists()
    }

    /// Create the tracking table if it does not exist.
    pub fn install(&self) -> SqlResult<()> {
        if self.repository.exists()? {
            return Ok(());
        }
        self.repository.create()?;
        tracing::info!(target: "sqlkit.migrate", table = self.repository.table(), "migration table created");
        Ok(())
    }

    fn ran(&self) -> SqlResult<HashSet<String>> {
        if !self.repository.exists()? {
            return Ok(HashSet::new());
        }
        Ok(self.repository.ran()?.into_iter().collect())
    }

    /// Names of migrations not yet applied, in application order.
    pub fn pending(&self) -> SqlResult<Vec<String>> {
        self.check_unique()?;
        let ran = self.ran()?;
        Ok(self
            .migrations
            .keys()
            .filter(|name| !ran.contains(*name))
            .cloned()
            .collect())
    }

    /// Every known migration plus any recorded one that is no longer known.
    pub fn status(&self) -> SqlResult<Vec<MigrationStatus>> {
        let records = if self.repository.exists()? {
            self.repository.records()?
        } else {
            Vec::new()
        };
        let mut by_name: BTreeMap<String, MigrationStatus> = self
            .migrations
            .keys()
            .map(|name| {
                (
                    name.clone(),
                    MigrationStatus {
                        name: name.clone(),
                        class_name: class_name(name),
                        batch: None,
                        executed_at: None,
                    },
                )
            })
            .collect();
        for record in records {
            let entry = by_name
                .entry(record.migration.clone())
                .or_insert_with(|| MigrationStatus {
                    class_name: class_name(&record.migration),
                    name: record.migration.clone(),
                    batch: None,
                    executed_at: None,
                });
            entry.batch = Some(record.batch);
            entry.executed_at = record.executed_at;
        }
        Ok(by_name.into_values().collect())
    }

    // ==================== run ====================

    /// Apply all pending migrations under one new batch number.
    ///
    /// Returns the names applied, in order.
    #[track_caller]
    pub fn run(&self) -> SqlResult<Vec<String>> {
        self.run_with(RunOptions::default())
    }

    #[track_caller]
    pub fn run_with(&self, options: RunOptions) -> SqlResult<Vec<String>> {
        self.check_unique()?;
        self.install()?;
        let pending = self.pending()?;
        if pending.is_empty() {
            tracing::info!(target: "sqlkit.migrate", "nothing to migrate");
            return Ok(Vec::new());
        }

        let transactional = self.use_transactions();
        let mut batch = self.repository.next_batch_number()?;
        tracing::info!(target: "sqlkit.migrate", batch, count = pending.len(), "running migrations");

        let mut applied = Vec::with_capacity(pending.len());
        for name in pending {
            let Some(migration) = self.migrations.get(&name) else {
                continue;
            };
            self.apply(migration.as_ref(), batch, transactional)?;
            applied.push(name);
            if options.step {
                batch += 1;
            }
        }
        Ok(applied)
    }

    /// Statements each pending migration would run, without running them.
    ///
    /// Uses a pretend [`Schema`]; migrations that read from the database
    /// still do so.
    pub fn pretend(&self) -> SqlResult<Vec<(String, Vec<String>)>> {
        let mut out = Vec::new();
        for name in self.pending()? {
            let Some(migration) = self.migrations.get(&name) else {
                continue;
            };
            let schema = Schema::pretend(self.conn);
            migration.up(&schema).map_err(|e| SqlError::migration(&name, e))?;
            out.push((name, schema.recorded()));
        }
        Ok(out)
    }

    fn use_transactions(&self) -> bool {
        if !self.transactional {
            return false;
        }
        if self.conn.dialect().supports_transactional_ddl() {
            return true;
        }
        tracing::warn!(
            target: "sqlkit.migrate",
            dialect = %self.conn.dialect(),
            "transactional migrations requested but DDL auto-commits on this dialect; running without a transaction"
        );
        false
    }

    #[track_caller]
    fn apply(&self, migration: &dyn Migration, batch: i64, transactional: bool) -> SqlResult<()> {
        let name = migration.name();
        tracing::info!(target: "sqlkit.migrate", migration = name, batch, "migrating");
        let result = if transactional {
            self.conn.transaction(|conn| {
                migration.up(&Schema::new(conn))?;
                self.repository.log(name, batch)
            })
        } else {
            migration
                .up(&Schema::new(self.conn))
                .and_then(|()| self.repository.log(name, batch))
        };
        match result {
            Ok(()) => {
                tracing::info!(target: "sqlkit.migrate", migration = name, "migrated");
                Ok(())
            }
            Err(e) => {
                tracing::error!(target: "sqlkit.migrate", migration = name, error = %e, "migration failed");
                Err(SqlError::migration(name, e))
            }
        }
    }

    // ==================== rollback ====================

    /// Revert the last batch (`None`) or the last `steps` migrations.
    ///
    /// Returns the names reverted, newest first. Fails before reverting
    /// anything if a recorded migration is unknown or irreversible.
    #[track_caller]
    pub fn rollback(&self, steps: Option<usize>) -> SqlResult<Vec<String>> {
        if !self.repository.exists()? {
            return Ok(Vec::new());
        }
        let records = match steps {
            Some(0) => return Ok(Vec::new()),
            Some(n) => self.repository.last_n(n)?,
            None => self.repository.last_batch()?,
        };
        self.revert(records.into_iter().map(|r| r.migration).collect())
    }

    /// Revert every applied migration, newest first.
    #[track_caller]
    pub fn reset(&self) -> SqlResult<Vec<String>> {
        if !self.repository.exists()? {
            return Ok(Vec::new());
        }
        let mut names = self.repository.ran()?;
        names.reverse();
        self.revert(names)
    }

    /// [`reset`](Self::reset) followed by [`run`](Self::run). Returns the
    /// names applied by the run.
    #[track_caller]
    pub fn refresh(&self) -> SqlResult<Vec<String>> {
        self.reset()?;
        self.run()
    }

    #[track_caller]
    fn revert(&self, names: Vec<String>) -> SqlResult<Vec<String>> {
        if names.is_empty() {
            tracing::info!(target: "sqlkit.migrate", "nothing to roll back");
            return Ok(names);
        }
        let mut targets = Vec::with_capacity(names.len());
        for name in &names {
            let Some(migration) = self.migrations.get(name) else {
                return Err(SqlError::migration(
                    name,
                    SqlError::not_found(format!("migration '{name}' is recorded but not loaded")),
                ));
            };
            if !migration.reversible() {
                return Err(SqlError::migration(
                    name,
                    SqlError::Config(format!("migration '{name}' cannot be reverted")),
                ));
            }
            targets.push(migration.as_ref());
        }

        let transactional = self.use_transactions();
        tracing::info!(target: "sqlkit.migrate", count = targets.len(), "rolling back");
        for migration in targets {
            let name = migration.name();
            tracing::info!(target: "sqlkit.migrate", migration = name, "rolling back");
            let result = if transactional {
                self.conn.transaction(|conn| {
                    migration.down(&Schema::new(conn))?;
                    self.repository.delete(name)
                })
            } else {
                migration
                    .down(&Schema::new(self.conn))
                    .and_then(|()| self.repository.delete(name))
            };
            if let Err(e) = result {
                tracing::error!(target: "sqlkit.migrate", migration = name, error = %e, "rollback failed");
                return Err(SqlError::migration(name, e));
            }
        }
        Ok(names)
    }
}
