//! Logging for the knownhosts tools.
//!
//! Messages go to the systemd journal if stderr of the process is connected to it (e.g. when run
//! from a unit), otherwise they are printed to stderr, so that they never mix with the output of a
//! command.

use log::{LevelFilter, Log};
use simplelog::{ColorChoice, Config, ConfigBuilder, TermLogger, TerminalMode};
use systemd_journal_logger::{JournalLog, connected_to_journal};

/// The syslog identifier of journal entries.
const SYSLOG_IDENTIFIER: &str = "knownhosts";

/// An error that may occur when setting up logging.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another logger has already been installed for this process.
    #[error("Unable to install the knownhosts logger: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

/// Returns a logger for the systemd journal, if stderr is connected to it.
fn journal_logger() -> Option<Box<dyn Log>> {
    if !connected_to_journal() {
        return None;
    }
    let log = JournalLog::new().ok()?;
    Some(Box::new(
        log.with_syslog_identifier(SYSLOG_IDENTIFIER.to_string())
            .with_extra_fields(vec![("VERSION", env!("CARGO_PKG_VERSION"))]),
    ))
}

/// Returns the format of messages printed to stderr.
///
/// Timestamps are left out, as the messages accompany interactive commands.
fn terminal_config() -> Config {
    ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build()
}

/// Installs the logger of the knownhosts tools with `max_level`.
///
/// # Errors
///
/// Returns an error if a logger has already been installed.
pub fn setup_logging(max_level: impl Into<LevelFilter>) -> Result<(), Error> {
    let max_level = max_level.into();

    if let Some(log) = journal_logger() {
        log::set_boxed_logger(log)?;
        log::set_max_level(max_level);
        return Ok(());
    }
    // simplelog writes to stdout unless told otherwise
    TermLogger::init(
        max_level,
        terminal_config(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;
    Ok(())
}
