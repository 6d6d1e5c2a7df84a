//! Command line interface for inspecting and maintaining OpenSSH known_hosts files.

use std::{io::stdout, process::ExitCode};

use clap::Parser;
use knownhosts_cli::{Error, ExitStatus, cli::Cli, commands::run, config::Config};
use knownhosts_common::logging::setup_logging;
use log::error;

fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(error) = setup_logging(args.verbosity) {
        eprintln!("{error}");
        return ExitCode::FAILURE;
    }

    let result = Config::new(args.config.as_deref())
        .map_err(Error::from)
        .and_then(|config| run(args, &config, &mut stdout().lock()));

    match result {
        Ok(status) => ExitCode::from(status as u8),
        Err(error) => {
            error!(error:err; "Running command failed: {error}");
            ExitCode::from(ExitStatus::Error as u8)
        }
    }
}
