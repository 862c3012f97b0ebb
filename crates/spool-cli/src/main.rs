//! Spool CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use spool_cli::cli::{Cli, Commands};
use spool_cli::commands::{DecodeCommand, FilesCommand, TrimCommand};
use spool_cli::output::OutputFormat;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), spool_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Decode(args) => DecodeCommand::new().execute(&mut stdout, &format, &args),
        Commands::Files(args) => FilesCommand::new().execute(&mut stdout, &format, &args),
        Commands::Trim(args) => TrimCommand::new().execute(&mut stdout, &format, &args),
    }
}
