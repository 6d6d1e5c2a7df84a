//! Configuration of the known_hosts tool.

use std::path::{Path, PathBuf};

use knownhosts_common::ssh::{get_global_known_hosts_file, get_user_known_hosts_file};
use serde::{Deserialize, Serialize};

/// The application name under which the configuration is stored.
const APP_NAME: &str = "knownhosts";

/// The name of the configuration file.
const CONFIG_NAME: &str = "config";

/// Errors related to configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A config loading error.
    #[error("Config loading issue: {0}")]
    Load(#[source] confy::ConfyError),

    /// A config storing error.
    #[error("Config storing issue: {0}")]
    Store(#[source] confy::ConfyError),

    /// The default known_hosts file can not be located.
    #[error("Unable to locate the known_hosts file: {0}")]
    Locate(#[from] knownhosts_common::ssh::Error),
}

/// The configuration of the known_hosts tool.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// The known_hosts file to operate on.
    ///
    /// Defaults to `~/.ssh/known_hosts` if unset.
    pub known_hosts_file: Option<PathBuf>,

    /// Additional known_hosts files used when looking up hosts.
    ///
    /// These files are never modified.
    pub global_known_hosts_files: Vec<PathBuf>,

    /// Whether to hash the host names of added entries.
    pub hash_known_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            known_hosts_file: None,
            global_known_hosts_files: vec![get_global_known_hosts_file()],
            hash_known_hosts: false,
        }
    }
}

impl Config {
    /// Loads the configuration from `path` or the default location.
    ///
    /// The default location is `~/.config/knownhosts/config.toml` (on Linux).
    /// A default configuration file is created if none is found.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration can not be loaded.
    pub fn new(path: Option<&Path>) -> Result<Self, Error> {
        if let Some(path) = path {
            confy::load_path(path).map_err(Error::Load)
        } else {
            confy::load(APP_NAME, CONFIG_NAME).map_err(Error::Load)
        }
    }

    /// Writes the configuration to `path` or the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration can not be written.
    pub fn store(&self, path: Option<&Path>) -> Result<(), Error> {
        if let Some(path) = path {
            confy::store_path(path, self).map_err(Error::Store)
        } else {
            confy::store(APP_NAME, CONFIG_NAME, self).map_err(Error::Store)
        }
    }

    /// Returns the known_hosts file to operate on.
    ///
    /// `file` takes precedence over the configured file, which takes precedence over
    /// `~/.ssh/known_hosts`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is set and the home directory can not be determined.
    pub fn known_hosts_file(&self, file: Option<&Path>) -> Result<PathBuf, Error> {
        match file.or(self.known_hosts_file.as_deref()) {
            Some(path) => Ok(path.to_path_buf()),
            None => Ok(get_user_known_hosts_file()?),
        }
    }
}
