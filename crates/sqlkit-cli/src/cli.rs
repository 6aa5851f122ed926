use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Migrate,
    MigrateInstall,
    MigrateRun,
    MigrateRollback,
    MigrateReset,
    MigrateRefresh,
    MigrateStatus,
    MigrateNew,
}

/// Parsed command line: global flags plus the command to run.
#[derive(Debug, Clone)]
pub struct Cli {
    pub verbose: bool,
    pub command: Command,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Migrate(MigrateCommand),
}

#[derive(Debug, Clone)]
pub enum MigrateCommand {
    Install(ProjectArgs),
    Run(MigrateRunArgs),
    Rollback(MigrateRollbackArgs),
    Reset(ProjectArgs),
    Refresh(ProjectArgs),
    Status(ProjectArgs),
    New(MigrateNewArgs),
}

/// Where the project config, database and migrations live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectArgs {
    pub config: PathBuf,
    pub database: Option<String>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MigrateRunArgs {
    pub project: ProjectArgs,
    pub step: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct MigrateRollbackArgs {
    pub project: ProjectArgs,
    pub steps: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct MigrateNewArgs {
    pub project: ProjectArgs,
    pub name: String,
    pub with_down: bool,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Cli> {
    let mut verbose = false;
    let rest: Vec<&str> = args
        .iter()
        .skip(1)
        .map(|s| s.as_str())
        .filter(|s| {
            let flag = matches!(*s, "-v" | "--verbose");
            verbose |= flag;
            !flag
        })
        .collect();

    let mut it = rest.into_iter();
    let command = match it.next() {
        None | Some("-h" | "--help" | "help") => Command::Help(HelpTopic::Root),
        Some("migrate") => parse_migrate(it)?,
        Some(other) => anyhow::bail!("unknown command: {other}"),
    };
    Ok(Cli { verbose, command })
}

fn parse_migrate<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut subcmd: Option<&str> = None;

    let mut config = PathBuf::from("sqlkit.toml");
    let mut database: Option<String> = None;
    let mut dir: Option<PathBuf> = None;
    let mut steps: Option<usize> = None;
    let mut step = false;
    let mut dry_run = false;
    let mut with_down = true;
    let mut new_name: Option<String> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => {
                return Ok(Command::Help(match subcmd {
                    None => HelpTopic::Migrate,
                    Some("install") => HelpTopic::MigrateInstall,
                    Some("run") => HelpTopic::MigrateRun,
                    Some("rollback") => HelpTopic::MigrateRollback,
                    Some("reset") => HelpTopic::MigrateReset,
                    Some("refresh") => HelpTopic::MigrateRefresh,
                    Some("status") => HelpTopic::MigrateStatus,
                    Some("new") => HelpTopic::MigrateNew,
                    Some(other) => anyhow::bail!("unknown subcommand: {other}"),
                }));
            }
            "install" | "run" | "rollback" | "reset" | "refresh" | "status" | "new"
                if subcmd.is_none() =>
            {
                subcmd = Some(token);
            }
            "--config" => config = PathBuf::from(value(&mut it, "--config")?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            "--database" => database = Some(value(&mut it, "--database")?.to_string()),
            _ if token.starts_with("--database=") => {
                database = Some(token.trim_start_matches("--database=").to_string());
            }
            "--dir" => dir = Some(PathBuf::from(value(&mut it, "--dir")?)),
            _ if token.starts_with("--dir=") => {
                dir = Some(PathBuf::from(token.trim_start_matches("--dir=")));
            }
            "--steps" => steps = Some(parse_steps(value(&mut it, "--steps")?)?),
            _ if token.starts_with("--steps=") => {
                steps = Some(parse_steps(token.trim_start_matches("--steps="))?);
            }
            "--step" => step = true,
            "--dry-run" => dry_run = true,
            "--no-down" => with_down = false,
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => {
                if matches!(subcmd, Some("new")) && new_name.is_none() {
                    new_name = Some(other.to_string());
                } else {
                    anyhow::bail!("unexpected positional argument: {other}");
                }
            }
        }
    }

    let project = ProjectArgs {
        config,
        database,
        dir,
    };
    let Some(subcmd) = subcmd else {
        return Ok(Command::Help(HelpTopic::Migrate));
    };

    if subcmd != "run" && step {
        anyhow::bail!("--step is only valid for `migrate run`");
    }
    if subcmd != "rollback" && steps.is_some() {
        anyhow::bail!("--steps is only valid for `migrate rollback`");
    }
    if !matches!(subcmd, "run" | "rollback") && dry_run {
        anyhow::bail!("--dry-run is only valid for `migrate run` and `migrate rollback`");
    }
    if subcmd != "new" && !with_down {
        anyhow::bail!("--no-down is only valid for `migrate new`");
    }

    let cmd = match subcmd {
        "install" => MigrateCommand::Install(project),
        "run" => MigrateCommand::Run(MigrateRunArgs {
            project,
            step,
            dry_run,
        }),
        "rollback" => MigrateCommand::Rollback(MigrateRollbackArgs {
            project,
            steps,
            dry_run,
        }),
        "reset" => MigrateCommand::Reset(project),
        "refresh" => MigrateCommand::Refresh(project),
        "status" => MigrateCommand::Status(project),
        "new" => {
            let Some(name) = new_name else {
                anyhow::bail!("missing migration name: usage `sqlkit migrate new <name>`");
            };
            MigrateCommand::New(MigrateNewArgs {
                project,
                name,
                with_down,
            })
        }
        other => anyhow::bail!("unknown subcommand: {other}"),
    };
    Ok(Command::Migrate(cmd))
}

fn value<'a>(it: &mut impl Iterator<Item = &'a str>, flag: &str) -> anyhow::Result<&'a str> {
    it.next()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn parse_steps(raw: &str) -> anyhow::Result<usize> {
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => anyhow::bail!("invalid --steps value: {raw}"),
        Ok(n) => Ok(n),
    }
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
sqlkit - migration CLI for sqlkit

USAGE:
  sqlkit [-v] <COMMAND> [OPTIONS]

COMMANDS:
  migrate       Migration workflow (install/run/rollback/reset/refresh/status/new)

GLOBAL OPTIONS:
  -v, --verbose         Debug logging (RUST_LOG overrides)
  -h, --help            Print help

Run `sqlkit <command> --help` for more."
            );
        }
        HelpTopic::Migrate => {
            println!(
                "\
USAGE:
  sqlkit migrate install [OPTIONS]
  sqlkit migrate run [--step] [--dry-run] [OPTIONS]
  sqlkit migrate rollback [--steps <N>] [--dry-run] [OPTIONS]
  sqlkit migrate reset [OPTIONS]
  sqlkit migrate refresh [OPTIONS]
  sqlkit migrate status [OPTIONS]
  sqlkit migrate new <NAME> [--no-down] [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: sqlkit.toml)
  --database <NAME>     Override database.database from config
  --dir <DIR>           Migrations directory (default: migrations.dir or ./migrations)
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrateInstall => {
            println!(
                "\
USAGE:
  sqlkit migrate install [OPTIONS]

Create the migration tracking table if it does not exist.

OPTIONS:
  --config <FILE>       Config file path (default: sqlkit.toml)
  --database <NAME>     Override database.database from config
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrateRun => {
            println!(
                "\
USAGE:
  sqlkit migrate run [OPTIONS]

Apply every pending migration as one batch.

OPTIONS:
  --config <FILE>       Config file path (default: sqlkit.toml)
  --database <NAME>     Override database.database from config
  --dir <DIR>           Migrations directory
  --step                Give each migration its own batch
  --dry-run             Print the SQL that would run
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrateRollback => {
            println!(
                "\
USAGE:
  sqlkit migrate rollback [OPTIONS]

Revert the last batch, or the last N migrations with --steps.

OPTIONS:
  --config <FILE>       Config file path (default: sqlkit.toml)
  --database <NAME>     Override database.database from config
  --dir <DIR>           Migrations directory
  --steps <N>           Number of migrations to revert
  --dry-run             List what would be reverted
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrateReset => {
            println!(
                "\
USAGE:
  sqlkit migrate reset [OPTIONS]

Revert every applied migration, newest first.

OPTIONS:
  --config <FILE>       Config file path (default: sqlkit.toml)
  --database <NAME>     Override database.database from config
  --dir <DIR>           Migrations directory
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrateRefresh => {
            println!(
                "\
USAGE:
  sqlkit migrate refresh [OPTIONS]

Reset, then run every migration again.

OPTIONS:
  --config <FILE>       Config file path (default: sqlkit.toml)
  --database <NAME>     Override database.database from config
  --dir <DIR>           Migrations directory
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrateStatus => {
            println!(
                "\
USAGE:
  sqlkit migrate status [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: sqlkit.toml)
  --database <NAME>     Override database.database from config
  --dir <DIR>           Migrations directory
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrateNew => {
            println!(
                "\
USAGE:
  sqlkit migrate new <NAME> [OPTIONS]

Create <next>_<name>.up.sql and <next>_<name>.down.sql.

OPTIONS:
  --dir <DIR>           Migrations directory
  --config <FILE>       Config file used to locate migrations.dir
  --no-down             Only create the up script
  -h, --help            Print help"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sqlkit")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_migrate_new() {
        let cli = parse_args(&args(&["migrate", "new", "add_users", "--dir", "db/migrations"])).unwrap();
        let Command::Migrate(MigrateCommand::New(m)) = cli.command else {
            panic!("expected migrate new");
        };
        assert_eq!(m.name, "add_users");
        assert_eq!(m.project.dir, Some(PathBuf::from("db/migrations")));
        assert!(m.with_down);
        assert!(!cli.verbose);
    }

    #[test]
    fn parse_migrate_rollback_steps() {
        let cli = parse_args(&args(&["-v", "migrate", "rollback", "--steps=3", "--dry-run"])).unwrap();
        let Command::Migrate(MigrateCommand::Rollback(m)) = cli.command else {
            panic!("expected migrate rollback");
        };
        assert_eq!(m.steps, Some(3));
        assert!(m.dry_run);
        assert!(cli.verbose);
        assert_eq!(m.project.config, PathBuf::from("sqlkit.toml"));
    }

    #[test]
    fn parse_migrate_run_options() {
        let cli = parse_args(&args(&[
            "migrate",
            "run",
            "--step",
            "--config=conf/sqlkit.toml",
            "--database",
            "app.db",
            "--verbose",
        ]))
        .unwrap();
        let Command::Migrate(MigrateCommand::Run(m)) = cli.command else {
            panic!("expected migrate run");
        };
        assert!(m.step);
        assert!(!m.dry_run);
        assert_eq!(m.project.config, PathBuf::from("conf/sqlkit.toml"));
        assert_eq!(m.project.database.as_deref(), Some("app.db"));
        assert!(cli.verbose);
    }

    #[test]
    fn help_topics() {
        assert!(matches!(
            parse_args(&args(&[])).unwrap().command,
            Command::Help(HelpTopic::Root)
        ));
        assert!(matches!(
            parse_args(&args(&["migrate"])).unwrap().command,
            Command::Help(HelpTopic::Migrate)
        ));
        assert!(matches!(
            parse_args(&args(&["migrate", "status", "--help"])).unwrap().command,
            Command::Help(HelpTopic::MigrateStatus)
        ));
    }

    #[test]
    fn rejects_misplaced_options() {
        assert!(parse_args(&args(&["migrate", "status", "--steps", "2"])).is_err());
        assert!(parse_args(&args(&["migrate", "rollback", "--step"])).is_err());
        assert!(parse_args(&args(&["migrate", "reset", "--dry-run"])).is_err());
        assert!(parse_args(&args(&["migrate", "run", "--no-down"])).is_err());
        assert!(parse_args(&args(&["migrate", "rollback", "--steps=0"])).is_err());
        assert!(parse_args(&args(&["migrate", "rollback", "--steps"])).is_err());
        assert!(parse_args(&args(&["migrate", "new"])).is_err());
        assert!(parse_args(&args(&["migrate", "run", "extra"])).is_err());
        assert!(parse_args(&args(&["gen"])).is_err());
    }
}
