//! Error handling.

use std::path::PathBuf;

/// An error that may occur when running the known_hosts tool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::Error),

    /// A public key can not be decoded.
    #[error("Invalid public key: {0}")]
    Decode(#[from] knownhosts::codec::DecodeError),

    /// An error related to known_hosts entries occurred.
    #[error(transparent)]
    KnownHosts(#[from] knownhosts::Error),

    /// A known_hosts file can not be loaded.
    #[error(transparent)]
    Load(#[from] knownhosts::file::LoadError),

    /// A known_hosts file can not be saved.
    #[error(transparent)]
    Save(#[from] knownhosts::file::SaveError),

    /// Output can not be written.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "I/O error while ".
        context: &'static str,

        /// The source error.
        source: std::io::Error,
    },

    /// A known_hosts file is required but does not exist.
    #[error("The known_hosts file {path} does not exist")]
    MissingFile {
        /// The path of the missing file.
        path: PathBuf,
    },
}
