//! Default locations of OpenSSH known_hosts files.
//!
//! # Examples
//!
//! ```
//! use knownhosts_common::ssh::{get_global_known_hosts_file, get_user_known_hosts_file};
//!
//! // Get the path of the system-wide known_hosts file.
//! assert_eq!(
//!     get_global_known_hosts_file().to_str(),
//!     Some("/etc/ssh/ssh_known_hosts")
//! );
//!
//! // Get the path of the known_hosts file of the current user.
//! if let Ok(path) = get_user_known_hosts_file() {
//!     assert!(path.ends_with(".ssh/known_hosts"));
//! }
//! ```

use std::path::PathBuf;

/// The system-wide known_hosts file.
const GLOBAL_KNOWN_HOSTS_FILE: &str = "/etc/ssh/ssh_known_hosts";

/// The directory of per-user SSH files, relative to the home directory.
const USER_SSH_DIR: &str = ".ssh";

/// The name of the per-user known_hosts file.
const USER_KNOWN_HOSTS_FILE_NAME: &str = "known_hosts";

/// An error that may occur when locating SSH files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The home directory of the current user can not be determined.
    #[error("Unable to determine the home directory of the current user")]
    NoHomeDir,
}

/// Returns the path of the system-wide known_hosts file.
pub fn get_global_known_hosts_file() -> PathBuf {
    PathBuf::from(GLOBAL_KNOWN_HOSTS_FILE)
}

/// Returns the path of the known_hosts file of the current user (i.e. `~/.ssh/known_hosts`).
///
/// # Errors
///
/// Returns an error if the home directory of the current user can not be determined.
pub fn get_user_known_hosts_file() -> Result<PathBuf, Error> {
    let home = dirs::home_dir().ok_or(Error::NoHomeDir)?;
    Ok(home.join(USER_SSH_DIR).join(USER_KNOWN_HOSTS_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn user_known_hosts_file_is_below_home() -> TestResult {
        let Some(home) = dirs::home_dir() else {
            return Ok(());
        };
        assert_eq!(
            get_user_known_hosts_file()?,
            home.join(".ssh").join("known_hosts")
        );
        Ok(())
    }
}
