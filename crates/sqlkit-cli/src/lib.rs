mod cli;
mod config;
mod migrate_cmd;

pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cli = cli::parse_args(&args)?;
    init_logging(cli.verbose);
    // `${VAR}` references in sqlkit.toml may come from a local .env file.
    dotenvy::dotenv().ok();

    match cli.command {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Migrate(cmd) => migrate_cmd::run(cmd),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default = if verbose {
        "warn,sqlkit=debug,sqlkit_cli=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}
