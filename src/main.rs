//! offsync CLI entry point.

use clap::Parser;
use offsync::cli::commands;
use offsync::cli::{Cli, Commands};
use offsync::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    // JSON when asked for, or when stdout is not a terminal
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // RUST_LOG wins over -v
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_deref();

    match &cli.command {
        Commands::Init { force } => commands::init::execute(db, *force, json),
        Commands::Put { entity, data } => commands::records::execute_put(db, entity, data, json),
        Commands::Delete { entity, id } => commands::records::execute_delete(db, entity, id, json),
        Commands::Get {
            entity,
            id,
            all,
            filter,
        } => commands::records::execute_get(
            db,
            entity,
            id.as_deref(),
            *all,
            filter.as_deref(),
            json,
        ),
        Commands::Sync { command } => {
            commands::sync::execute(command.as_ref(), db, cli.offline, json)
        }
        Commands::Status => commands::status::execute(db, cli.offline, json),
        Commands::Queue { command } => commands::queue::execute(command, db, json),
        Commands::Watch { tables } => commands::watch::execute(tables, db, cli.offline, json),
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(json),
    }
}
