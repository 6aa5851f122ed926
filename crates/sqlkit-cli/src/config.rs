use serde::Deserialize;
use sqlkit::{ConnectionConfig, Dialect};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub config_dir: PathBuf,
    pub file: ConfigFile,
}

impl ProjectConfig {
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let config_dir = config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let raw = std::fs::read_to_string(config_path).map_err(|e| {
            anyhow::anyhow!(
                "failed to read config file {}: {e}",
                config_path.display()
            )
        })?;

        let mut file: ConfigFile = toml::from_str(&raw).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse config file {}: {e}",
                config_path.display()
            )
        })?;

        file.expand_env()?;
        file.validate()?;

        Ok(Self { config_dir, file })
    }

    pub fn resolve_path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir.join(p)
        }
    }

    /// The connection settings, with a relative SQLite path resolved against
    /// the config file's directory.
    pub fn connection(&self) -> ConnectionConfig {
        let mut db = self.file.database.clone();
        if db.driver == Dialect::Sqlite && db.database != ":memory:" {
            db.database = self.resolve_path(&db.database).to_string_lossy().into_owned();
        }
        db
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub database: ConnectionConfig,

    #[serde(default)]
    pub migrations: MigrationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub dir: String,
    pub table: String,
    pub transactional: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: "migrations".to_string(),
            table: sqlkit::migrate::DEFAULT_MIGRATION_TABLE.to_string(),
            transactional: false,
        }
    }
}

impl ConfigFile {
    fn expand_env(&mut self) -> anyhow::Result<()> {
        let db = &mut self.database;
        for s in [
            &mut db.host,
            &mut db.database,
            &mut db.username,
            &mut db.password,
            &mut db.charset,
        ] {
            *s = expand_env_vars(s)?;
        }

        self.migrations.dir = expand_env_vars(&self.migrations.dir)?;
        self.migrations.table = expand_env_vars(&self.migrations.table)?;
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.database.database.trim().is_empty() {
            anyhow::bail!("database.database must not be empty");
        }
        self.database
            .effective_charset()
            .map_err(|e| anyhow::anyhow!("invalid database.charset: {e}"))?;
        if self.migrations.dir.trim().is_empty() {
            anyhow::bail!("migrations.dir must not be empty");
        }
        sqlkit::Ident::parse(&self.migrations.table)
            .map_err(|e| anyhow::anyhow!("invalid migrations.table: {e}"))?;
        Ok(())
    }
}

fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                anyhow::bail!("unterminated env var reference: ${{{key}}}");
            }
            if key.is_empty() {
                anyhow::bail!("invalid env var reference: ${{}}");
            }

            let v = std::env::var(&key)
                .map_err(|_| anyhow::anyhow!("missing env var for config expansion: {key}"))?;
            out.push_str(&v);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}
