//! Command line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::Verbosity;

/// Inspects and maintains OpenSSH known_hosts files.
#[derive(Debug, Parser)]
#[command(about, version)]
pub struct Cli {
    /// The configuration file to use.
    #[arg(env = "KNOWNHOSTS_CONFIG", global = true, long)]
    pub config: Option<PathBuf>,

    /// The known_hosts file to operate on (defaults to ~/.ssh/known_hosts).
    #[arg(env = "KNOWNHOSTS_FILE", global = true, long, short)]
    pub file: Option<PathBuf>,

    /// Global processing log verbosity.
    #[command(flatten)]
    pub verbosity: Verbosity,

    /// The command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// The commands of the known_hosts tool.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verify the public key of a host.
    ///
    /// Exits with 0 if the key is known, 2 if no key is known for the host, 3 if a different key is
    /// known for the host and 4 if the key is revoked.
    Check(CheckCommand),

    /// Add the public key of a host.
    Add(AddCommand),

    /// Remove all keys of a host.
    Remove(HostArgs),

    /// Show all entries matching a host.
    Find(HostArgs),

    /// Show all entries.
    List,

    /// Hash the host names of all plain entries.
    Hash,
}

/// A host to look up.
#[derive(Debug, Args)]
pub struct HostArgs {
    /// The host name or IP address.
    #[arg(long)]
    pub host: String,

    /// The port of the SSH server.
    #[arg(long)]
    pub port: Option<u16>,
}

/// Parameters for verifying the public key of a host.
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// The host to verify.
    #[command(flatten)]
    pub target: HostArgs,

    /// The public key presented by the host, in the form "<type> <base64>".
    #[arg(long)]
    pub key: String,
}

/// Parameters for adding the public key of a host.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// The host to add.
    #[command(flatten)]
    pub target: HostArgs,

    /// The public key of the host, in the form "<type> <base64>".
    #[arg(long)]
    pub key: String,

    /// A comment for the entry.
    #[arg(long)]
    pub comment: Option<String>,

    /// Store the host name hashed.
    #[arg(long)]
    pub hash: bool,
}
