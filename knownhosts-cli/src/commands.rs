//! Execution of commands.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use knownhosts::{
    KnownHosts,
    Verdict,
    codec::decode_public_key,
    entry::KnownHostEntry,
    file::{load, load_many},
    fingerprint::Fingerprint,
};
use log::{debug, warn};

use crate::{
    Error,
    cli::{AddCommand, CheckCommand, Cli, Command, HostArgs},
    config::Config,
};

/// The exit status of the known_hosts tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[repr(u8)]
pub enum ExitStatus {
    /// The command succeeded and a checked key is trusted.
    #[strum(to_string = "success")]
    Success = 0,

    /// The command failed.
    #[strum(to_string = "error")]
    Error = 1,

    /// No key is known for a host.
    #[strum(to_string = "not found")]
    NotFound = 2,

    /// A different key is known for a host.
    #[strum(to_string = "mismatch")]
    Mismatch = 3,

    /// A key is revoked for a host.
    #[strum(to_string = "revoked")]
    Revoked = 4,
}

impl From<&Verdict> for ExitStatus {
    fn from(verdict: &Verdict) -> Self {
        match verdict {
            Verdict::Match(_) => Self::Success,
            Verdict::NotFound => Self::NotFound,
            Verdict::Mismatch(_) => Self::Mismatch,
            Verdict::Revoked(_) => Self::Revoked,
            Verdict::Failure(_) => Self::Error,
        }
    }
}

/// Writes a line of output.
fn output(out: &mut impl Write, line: impl std::fmt::Display) -> Result<(), Error> {
    writeln!(out, "{line}").map_err(|source| Error::Io {
        context: "writing output",
        source,
    })
}

/// Writes `entry` followed by the SHA-256 fingerprint of its key.
fn output_entry(out: &mut impl Write, entry: &KnownHostEntry) -> Result<(), Error> {
    output(out, entry)?;
    output(out, format_args!("# {}", entry.fingerprint()))
}

/// Loads the known_hosts file to modify, treating a missing file as empty.
fn load_for_update(path: &Path) -> Result<KnownHosts, Error> {
    let loaded = load_many([path])?;
    if loaded.skipped_count() > 0 {
        warn!(
            "{} undecodable lines of {} are kept unchanged",
            loaded.skipped_count(),
            path.display()
        );
    }
    Ok(KnownHosts::from(loaded.store))
}

/// Loads the known_hosts file and the global known_hosts files for lookups.
fn load_for_lookup(path: PathBuf, config: &Config) -> Result<KnownHosts, Error> {
    let paths = std::iter::once(path).chain(config.global_known_hosts_files.iter().cloned());
    Ok(KnownHosts::from(load_many(paths)?.store))
}

/// Verifies the public key of a host and reports the verdict.
fn check(
    command: CheckCommand,
    path: PathBuf,
    config: &Config,
    out: &mut impl Write,
) -> Result<ExitStatus, Error> {
    let HostArgs { host, port } = command.target;
    let (algorithm, key) = decode_public_key(&command.key)?;
    let known_hosts = load_for_lookup(path, config)?;

    let verdict = known_hosts.check(&host, port, &key, &algorithm);
    output(
        out,
        format_args!(
            "{host}: {verdict} ({algorithm} {})",
            Fingerprint::sha256(&key)
        ),
    )?;

    if let Some(entry) = verdict.entry() {
        let entry = known_hosts.get(entry).map_err(knownhosts::Error::from)?;
        match verdict {
            Verdict::Mismatch(_) => {
                output(
                    out,
                    "WARNING: the host key has changed, someone could be eavesdropping!",
                )?;
                output(out, "The known key is:")?;
            }
            Verdict::Revoked(_) => output(out, "The key is revoked by:")?,
            _ => {}
        }
        output_entry(out, entry)?;
    }

    Ok(ExitStatus::from(&verdict))
}

/// Adds the public key of a host.
fn add(
    command: AddCommand,
    path: PathBuf,
    config: &Config,
    out: &mut impl Write,
) -> Result<ExitStatus, Error> {
    let HostArgs { host, port } = command.target;
    let (algorithm, key) = decode_public_key(&command.key)?;
    let mut known_hosts = load_for_update(&path)?;

    let entry = if command.hash || config.hash_known_hosts {
        known_hosts.add_hashed(&host, port, &key, algorithm, command.comment)?
    } else {
        known_hosts.add(&host, port, &key, algorithm, command.comment)?
    };
    known_hosts.save(&path)?;

    output_entry(
        out,
        known_hosts.get(entry).map_err(knownhosts::Error::from)?,
    )?;
    Ok(ExitStatus::Success)
}

/// Removes all keys of a host.
fn remove(target: HostArgs, path: PathBuf, out: &mut impl Write) -> Result<ExitStatus, Error> {
    let mut known_hosts = load_for_update(&path)?;

    let removed = known_hosts
        .remove_host(&target.host, target.port)
        .map_err(knownhosts::Error::from)?;
    if removed > 0 {
        known_hosts.save(&path)?;
    }
    output(
        out,
        format_args!(
            "Removed {removed} entries for {} from {}",
            target.host,
            path.display()
        ),
    )?;

    Ok(if removed > 0 {
        ExitStatus::Success
    } else {
        ExitStatus::NotFound
    })
}

/// Shows all entries matching a host.
fn find(
    target: HostArgs,
    path: PathBuf,
    config: &Config,
    out: &mut impl Write,
) -> Result<ExitStatus, Error> {
    let known_hosts = load_for_lookup(path, config)?;

    let found = known_hosts
        .find(&target.host, target.port)
        .map_err(knownhosts::Error::from)?;
    for (_, entry) in &found {
        output_entry(out, entry)?;
    }

    Ok(if found.is_empty() {
        ExitStatus::NotFound
    } else {
        ExitStatus::Success
    })
}

/// Shows all entries and the lines that could not be decoded.
fn list(path: PathBuf, out: &mut impl Write) -> Result<ExitStatus, Error> {
    if !path.exists() {
        return Err(Error::MissingFile { path });
    }
    let loaded = load(&path)?;

    for entry in loaded.store.entries() {
        output(out, entry)?;
    }
    for skipped in &loaded.skipped {
        output(
            out,
            format_args!("# skipped line {}: {}", skipped.line_number, skipped.error),
        )?;
    }

    Ok(ExitStatus::Success)
}

/// Hashes the host names of all plain entries.
fn hash(path: PathBuf, out: &mut impl Write) -> Result<ExitStatus, Error> {
    if !path.exists() {
        return Err(Error::MissingFile { path });
    }
    let mut known_hosts = load_for_update(&path)?;

    let hashed = known_hosts.hash_plain_entries()?;
    if hashed > 0 {
        known_hosts.save(&path)?;
    }
    output(
        out,
        format_args!("Hashed {hashed} entries of {}", path.display()),
    )?;

    Ok(ExitStatus::Success)
}

/// Runs the command of `cli` using `config`, writing all output to `out`.
///
/// # Errors
///
/// Returns an error if
/// - the known_hosts file can not be located, loaded or saved,
/// - a public key can not be decoded,
/// - an entry can not be added,
/// - or output can not be written.
pub fn run(cli: Cli, config: &Config, out: &mut impl Write) -> Result<ExitStatus, Error> {
    let path = config.known_hosts_file(cli.file.as_deref())?;
    debug!("Using known_hosts file {}", path.display());

    match cli.command {
        Command::Check(command) => check(command, path, config, out),
        Command::Add(command) => add(command, path, config, out),
        Command::Remove(target) => remove(target, path, out),
        Command::Find(target) => find(target, path, config, out),
        Command::List => list(path, out),
        Command::Hash => hash(path, out),
    }
}
