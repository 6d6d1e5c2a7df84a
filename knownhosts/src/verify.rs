//! Verification of host keys against known_hosts entries.
//!
//! [`KnownHosts`] owns an [`EntryStore`] and answers the question whether a host key presented by a
//! server is trusted.
//! Every call to [`KnownHosts::check`] only depends on the current content of the store.
//!
//! # Examples
//!
//! ```
//! use knownhosts::{algorithm::KeyAlgorithm, verify::{KnownHosts, Verdict}};
//!
//! # fn main() -> testresult::TestResult {
//! let mut known_hosts = KnownHosts::new();
//! let host = "gitlab.archlinux.org";
//! let key = [0, 0, 0, 11, 115, 115, 104];
//!
//! assert_eq!(known_hosts.check(host, None, &key, &KeyAlgorithm::SshEd25519), Verdict::NotFound);
//!
//! let entry = known_hosts.add(host, None, &key, KeyAlgorithm::SshEd25519, None)?;
//! assert_eq!(
//!     known_hosts.check(host, None, &key, &KeyAlgorithm::SshEd25519),
//!     Verdict::Match(entry)
//! );
//! assert_eq!(
//!     known_hosts.check(host, None, &[1, 2, 3], &KeyAlgorithm::SshEd25519),
//!     Verdict::Mismatch(entry)
//! );
//!
//! known_hosts.delete(entry)?;
//! assert_eq!(known_hosts.check(host, None, &key, &KeyAlgorithm::SshEd25519), Verdict::NotFound);
//! # Ok(())
//! # }
//! ```

use std::{fmt::Display, path::Path};

use log::{debug, info, warn};

use crate::{
    Error,
    algorithm::KeyAlgorithm,
    codec::{DecodeError, decode_line, encode_line},
    entry::{KnownHostEntry, Marker},
    file::{LoadError, LoadedFile, SaveError, SkippedLine, load, save},
    matcher::HostCandidate,
    pattern::{self, HostPattern, validate_host},
    store::{self, EntryRef, EntryStore},
};

/// The reason why a verification could not be carried out.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display, strum::IntoStaticStr)]
pub enum FailureReason {
    /// The host name is empty or contains whitespace.
    #[strum(to_string = "the host name is empty or contains whitespace")]
    InvalidHost,

    /// The key is empty.
    #[strum(to_string = "the key is empty")]
    EmptyKey,
}

/// The outcome of a host key verification.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Verdict {
    /// No entry for the host and algorithm exists.
    ///
    /// This is the routine case of a first contact with a host.
    NotFound,

    /// An entry for the host and algorithm exists and its key equals the presented key.
    Match(EntryRef),

    /// Entries for the host and algorithm exist, but none of them carries the presented key.
    ///
    /// Carries the first such entry.
    /// This may indicate an active attack.
    Mismatch(EntryRef),

    /// The presented key is marked as revoked for the host.
    Revoked(EntryRef),

    /// The verification could not be carried out.
    Failure(FailureReason),
}

impl Verdict {
    /// Returns the entry the verdict refers to, if any.
    pub fn entry(&self) -> Option<EntryRef> {
        match self {
            Self::Match(entry) | Self::Mismatch(entry) | Self::Revoked(entry) => Some(*entry),
            Self::NotFound | Self::Failure(_) => None,
        }
    }

    /// Returns `true` if the presented key is trusted.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Match(_))
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Match(_) => f.write_str("match"),
            Self::Mismatch(_) => f.write_str("mismatch"),
            Self::Revoked(_) => f.write_str("revoked"),
            Self::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}

/// A set of known hosts.
///
/// Wraps an [`EntryStore`] and provides verification, addition and removal of host keys.
#[derive(Debug, Default)]
pub struct KnownHosts {
    store: EntryStore,
}

impl KnownHosts {
    /// Creates a new, empty [`KnownHosts`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`KnownHosts`] from the file at `path`.
    ///
    /// Returns the skipped lines alongside.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can not be read.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<SkippedLine>), LoadError> {
        let LoadedFile { store, skipped } = load(path)?;
        Ok((Self { store }, skipped))
    }

    /// Atomically writes all entries and verbatim lines to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can not be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SaveError> {
        save(path, &self.store)
    }

    /// Returns the underlying [`EntryStore`].
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// Returns the underlying [`EntryStore`], consuming `self`.
    pub fn into_store(self) -> EntryStore {
        self.store
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns the entry referenced by `entry`.
    ///
    /// # Errors
    ///
    /// Returns an error if `entry` does not reference a live entry of this set.
    pub fn get(&self, entry: EntryRef) -> Result<&KnownHostEntry, store::Error> {
        self.store.get(entry)
    }

    /// Returns the reference of the entry following `cursor`.
    ///
    /// See [`EntryStore::get_next`].
    ///
    /// # Errors
    ///
    /// Returns an error if `cursor` belongs to another set.
    pub fn get_next(&self, cursor: Option<EntryRef>) -> Result<Option<EntryRef>, store::Error> {
        self.store.get_next(cursor)
    }

    /// Verifies `key` of type `key_algorithm`, presented by `host` on `port`.
    ///
    /// Only entries of the same algorithm whose pattern matches the host are considered:
    ///
    /// - a `@revoked` entry carrying `key` results in [`Verdict::Revoked`], regardless of any other
    ///   entry,
    /// - otherwise an entry carrying `key` results in [`Verdict::Match`],
    /// - otherwise the first entry carrying a different key results in [`Verdict::Mismatch`],
    /// - otherwise the result is [`Verdict::NotFound`].
    ///
    /// `@cert-authority` entries are never considered.
    /// Returns [`Verdict::Failure`] if `host` is empty or contains whitespace or if `key` is empty.
    pub fn check(
        &self,
        host: &str,
        port: Option<u16>,
        key: &[u8],
        key_algorithm: &KeyAlgorithm,
    ) -> Verdict {
        if validate_host(host).is_err() {
            return Verdict::Failure(FailureReason::InvalidHost);
        }
        if key.is_empty() {
            return Verdict::Failure(FailureReason::EmptyKey);
        }

        let candidate = HostCandidate::new(host, port);
        let mut matched = None;
        let mut mismatched = None;

        for (entry_ref, entry) in self.store.iter() {
            if entry.key_algorithm() != key_algorithm
                || entry.marker() == Some(Marker::CertAuthority)
                || !candidate.matches(entry.pattern())
            {
                continue;
            }

            let same_key = entry.key() == key;
            match entry.marker() {
                Some(Marker::Revoked) if same_key => {
                    warn!("The {key_algorithm} key of host {host} is revoked by {entry_ref}");
                    return Verdict::Revoked(entry_ref);
                }
                Some(_) => {}
                None if same_key => {
                    matched.get_or_insert(entry_ref);
                }
                None => {
                    mismatched.get_or_insert(entry_ref);
                }
            }
        }

        match (matched, mismatched) {
            (Some(entry_ref), _) => {
                debug!("The {key_algorithm} key of host {host} matches {entry_ref}");
                Verdict::Match(entry_ref)
            }
            (None, Some(entry_ref)) => {
                warn!(
                    "The {key_algorithm} key of host {host} does not match the key in {entry_ref}"
                );
                Verdict::Mismatch(entry_ref)
            }
            (None, None) => {
                debug!("No {key_algorithm} key is known for host {host}");
                Verdict::NotFound
            }
        }
    }

    /// Adds a plain entry for `host` on `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - `host` is empty or contains whitespace,
    /// - or no valid entry can be created from `key`, `key_algorithm` and `comment`.
    pub fn add(
        &mut self,
        host: &str,
        port: Option<u16>,
        key: &[u8],
        key_algorithm: KeyAlgorithm,
        comment: Option<String>,
    ) -> Result<EntryRef, Error> {
        let pattern = HostPattern::plain(host, port)?;
        self.add_with_pattern(pattern, key, key_algorithm, comment)
    }

    /// Adds an entry for `host` on `port` with a hashed host name.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - `host` is empty or contains whitespace,
    /// - or no valid entry can be created from `key`, `key_algorithm` and `comment`.
    pub fn add_hashed(
        &mut self,
        host: &str,
        port: Option<u16>,
        key: &[u8],
        key_algorithm: KeyAlgorithm,
        comment: Option<String>,
    ) -> Result<EntryRef, Error> {
        let pattern = HostPattern::hashed(host, port)?;
        self.add_with_pattern(pattern, key, key_algorithm, comment)
    }

    fn add_with_pattern(
        &mut self,
        pattern: HostPattern,
        key: &[u8],
        key_algorithm: KeyAlgorithm,
        comment: Option<String>,
    ) -> Result<EntryRef, Error> {
        let entry = KnownHostEntry::new(pattern, key_algorithm, key.to_vec(), comment)?;
        Ok(self.add_entry(entry))
    }

    /// Appends `entry`.
    pub fn add_entry(&mut self, entry: KnownHostEntry) -> EntryRef {
        let entry_ref = self.store.append(entry);
        debug!("Added {entry_ref}");
        entry_ref
    }

    /// Removes the entry referenced by `entry` and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if `entry` does not reference a live entry of this set.
    pub fn delete(&mut self, entry: EntryRef) -> Result<KnownHostEntry, store::Error> {
        let removed = self.store.remove(entry)?;
        debug!("Deleted {entry}");
        Ok(removed)
    }

    /// Returns all entries whose pattern matches `host` on `port`, in store order.
    ///
    /// Entries of all algorithms and with any marker are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is empty or contains whitespace.
    pub fn find(
        &self,
        host: &str,
        port: Option<u16>,
    ) -> Result<Vec<(EntryRef, &KnownHostEntry)>, pattern::Error> {
        validate_host(host)?;
        let candidate = HostCandidate::new(host, port);
        Ok(self
            .store
            .iter()
            .filter(|(_, entry)| candidate.matches(entry.pattern()))
            .collect())
    }

    /// Removes all entries whose pattern matches `host` on `port`.
    ///
    /// Entries carrying a [`Marker`] are kept.
    /// Returns the number of removed entries.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is empty or contains whitespace.
    /// Nothing is removed in this case.
    pub fn remove_host(&mut self, host: &str, port: Option<u16>) -> Result<usize, pattern::Error> {
        let matching: Vec<EntryRef> = self
            .find(host, port)?
            .into_iter()
            .filter(|(_, entry)| entry.marker().is_none())
            .map(|(entry_ref, _)| entry_ref)
            .collect();
        let removed = matching
            .into_iter()
            .filter(|entry_ref| self.store.remove(*entry_ref).is_ok())
            .count();
        info!("Removed {removed} entries for host {host}");
        Ok(removed)
    }

    /// Replaces the host names of all plain entries by hashed host names.
    ///
    /// An entry listing several host names is replaced by one entry per host name.
    /// Entries whose pattern contains wildcards, negations or networks are kept as they are, as
    /// are entries that are already hashed.
    ///
    /// The order of entries and verbatim lines is preserved, but all previously returned
    /// [`EntryRef`]s are invalidated.
    /// Returns the number of replaced entries.
    ///
    /// # Errors
    ///
    /// Returns an error if a host name can not be hashed.
    /// The entries are left unchanged in this case.
    pub fn hash_plain_entries(&mut self) -> Result<usize, Error> {
        let mut replaced = 0;

        let hashed = self
            .store
            .try_flat_map(|entry| -> Result<Vec<KnownHostEntry>, Error> {
                let Some(names) = entry.pattern().literal_names() else {
                    if matches!(entry.pattern(), HostPattern::Plain(_)) {
                        debug!("Not hashing the pattern {}", entry.pattern());
                    }
                    return Ok(vec![entry.clone()]);
                };

                let mut entries = Vec::with_capacity(names.len());
                for name in names {
                    let pattern = HostPattern::hashed(name, None)?;
                    entries.push(entry.clone().with_pattern(pattern));
                }
                replaced += 1;
                Ok(entries)
            })?;

        self.store = hashed;
        info!("Hashed the host names of {replaced} entries");
        Ok(replaced)
    }

    /// Decodes `line` and appends the resulting entry.
    ///
    /// Blank and comment lines are appended as verbatim lines and return [`None`].
    ///
    /// # Errors
    ///
    /// Returns an error if `line` can not be decoded.
    pub fn read_line(&mut self, line: &[u8]) -> Result<Option<EntryRef>, DecodeError> {
        match decode_line(line)? {
            Some(entry) => Ok(Some(self.add_entry(entry))),
            None => {
                self.store.append_verbatim(line);
                Ok(None)
            }
        }
    }

    /// Encodes the entry referenced by `entry` into `buf`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - `entry` does not reference a live entry of this set,
    /// - or `buf` is too small (see [`encode_line`]).
    pub fn write_line(&self, entry: EntryRef, buf: &mut [u8]) -> Result<usize, Error> {
        Ok(encode_line(self.store.get(entry)?, buf)?)
    }
}

impl From<EntryStore> for KnownHosts {
    fn from(store: EntryStore) -> Self {
        Self { store }
    }
}
