//! Host name field of known_hosts entries.

use std::{fmt::Display, str::FromStr};

use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::{algorithm::NameType, codec::DecodeError, matcher::HostCandidate};

/// The prefix of a hashed host name field.
pub const HASH_MAGIC: &str = "|1|";

/// The delimiter between salt and digest of a hashed host name field.
pub const HASH_DELIMITER: char = '|';

/// The length of the salt and of the digest of a hashed host name in bytes.
pub const SHA1_LEN: usize = 20;

/// HMAC-SHA1 as used for hashed host names.
pub(crate) type HmacSha1 = Hmac<Sha1>;

/// An error that may occur when creating a [`HostPattern`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A host name to be stored is empty.
    #[error("A host name must not be empty")]
    EmptyHost,

    /// A host name to be stored contains whitespace.
    #[error("The host name {host:?} must not contain whitespace")]
    Whitespace {
        /// The offending host name.
        host: String,
    },

    /// An HMAC can not be created from a salt.
    #[error("Unable to create HMAC-SHA1 from salt: {0}")]
    HmacKey(#[from] hmac::digest::InvalidLength),
}

/// The host name field of a known_hosts entry.
///
/// A [`HostPattern`] never exposes the plaintext host name of a [`HostPattern::Hashed`] entry.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum HostPattern {
    /// A comma-separated list of host name patterns.
    ///
    /// Each pattern may contain the wildcards `*` and `?`, may be prefixed with `!` to negate it,
    /// may be of the form `[host]:port` and may be an IP network in CIDR notation (e.g.
    /// `192.0.2.0/24`).
    Plain(String),

    /// A host name hashed using HMAC-SHA1 keyed with a random salt.
    Hashed {
        /// The salt used as HMAC key.
        salt: [u8; SHA1_LEN],

        /// The HMAC-SHA1 digest of the host name.
        digest: [u8; SHA1_LEN],
    },

    /// An opaque host token, which only matches a host name verbatim.
    Custom(String),
}

impl HostPattern {
    /// Creates a [`HostPattern::Plain`] for a single `host` and an optional `port`.
    ///
    /// The host name is lowercased.
    /// Unless `port` is [`None`] or the default SSH port, the pattern has the form `[host]:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is empty or contains whitespace.
    ///
    /// # Examples
    ///
    /// ```
    /// use knownhosts::pattern::HostPattern;
    ///
    /// # fn main() -> testresult::TestResult {
    /// assert_eq!(
    ///     HostPattern::plain("Example.ORG", None)?,
    ///     HostPattern::Plain("example.org".to_string())
    /// );
    /// assert_eq!(
    ///     HostPattern::plain("example.org", Some(2222))?,
    ///     HostPattern::Plain("[example.org]:2222".to_string())
    /// );
    /// # Ok(())
    /// # }
    /// ```
    pub fn plain(host: &str, port: Option<u16>) -> Result<Self, Error> {
        Ok(Self::Plain(host_label(host, port)?))
    }

    /// Creates a [`HostPattern::Hashed`] for a single `host` and an optional `port`, using a fresh
    /// random salt.
    ///
    /// The hashed name is the same one [`HostPattern::plain`] would store in plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is empty or contains whitespace.
    pub fn hashed(host: &str, port: Option<u16>) -> Result<Self, Error> {
        let mut salt = [0u8; SHA1_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::hashed_with_salt(host, port, salt)
    }

    /// Creates a [`HostPattern::Hashed`] for a single `host` and an optional `port`, using `salt`.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is empty or contains whitespace.
    pub fn hashed_with_salt(
        host: &str,
        port: Option<u16>,
        salt: [u8; SHA1_LEN],
    ) -> Result<Self, Error> {
        let label = host_label(host, port)?;
        let digest = hash_name(&salt, &label)?;
        Ok(Self::Hashed { salt, digest })
    }

    /// Returns the [`NameType`] of the pattern.
    pub fn name_type(&self) -> NameType {
        match self {
            Self::Plain(_) => NameType::Plain,
            Self::Hashed { .. } => NameType::Sha1,
            Self::Custom(_) => NameType::Custom,
        }
    }

    /// Returns `true` if the pattern matches `host` on `port`.
    ///
    /// See [`crate::matcher::matches`] for the matching rules.
    pub fn matches(&self, host: &str, port: Option<u16>) -> bool {
        HostCandidate::new(host, port).matches(self)
    }

    /// Returns the literal host names of a [`HostPattern::Plain`].
    ///
    /// Returns [`None`] if the pattern is not plain or if any of its comma-separated names contains
    /// a wildcard, a negation or a network mask.
    pub fn literal_names(&self) -> Option<Vec<&str>> {
        let Self::Plain(list) = self else {
            return None;
        };
        let names: Vec<&str> = list.split(',').collect();
        if names
            .iter()
            .any(|name| name.is_empty() || name.contains(['*', '?', '!', '/']))
        {
            return None;
        }
        Some(names)
    }

    /// Returns the length of the field in its known_hosts representation.
    pub(crate) fn encoded_len(&self) -> usize {
        match self {
            Self::Plain(list) => list.len(),
            Self::Hashed { .. } => {
                HASH_MAGIC.len() + 2 * Base64::encoded_len(&[0u8; SHA1_LEN]) + 1
            }
            Self::Custom(token) => token.len(),
        }
    }
}

impl Display for HostPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(list) => f.write_str(list),
            Self::Hashed { salt, digest } => write!(
                f,
                "{HASH_MAGIC}{}{HASH_DELIMITER}{}",
                Base64::encode_string(salt),
                Base64::encode_string(digest)
            ),
            Self::Custom(token) => f.write_str(token),
        }
    }
}

/// Decodes one base64 encoded part of a hashed host name field.
fn decode_hash_part(part: &str, field: &'static str) -> Result<[u8; SHA1_LEN], DecodeError> {
    let mut buf = [0u8; SHA1_LEN];
    let decoded_len = Base64::decode(part, &mut buf)
        .map_err(|source| DecodeError::BadBase64 { field, source })?
        .len();
    if decoded_len != SHA1_LEN {
        return Err(DecodeError::Malformed {
            reason: "hashed host name parts must be 20 bytes long",
        });
    }
    Ok(buf)
}

impl FromStr for HostPattern {
    type Err = DecodeError;

    /// Parses the host name field of a known_hosts line.
    ///
    /// Fields starting with `|1|` are hashed host names, any other field starting with `|` is kept
    /// as an opaque [`HostPattern::Custom`] token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DecodeError::Malformed {
                reason: "empty host name field",
            });
        }
        if s.contains(char::is_whitespace) {
            return Err(DecodeError::Malformed {
                reason: "whitespace in host name field",
            });
        }

        if let Some(hashed) = s.strip_prefix(HASH_MAGIC) {
            let Some((salt, digest)) = hashed.split_once(HASH_DELIMITER) else {
                return Err(DecodeError::Malformed {
                    reason: "hashed host name without digest",
                });
            };
            return Ok(Self::Hashed {
                salt: decode_hash_part(salt, "salt")?,
                digest: decode_hash_part(digest, "host name digest")?,
            });
        }

        if s.starts_with(HASH_DELIMITER) {
            return Ok(Self::Custom(s.to_string()));
        }

        Ok(Self::Plain(s.to_string()))
    }
}

/// Checks that `host` is usable as host name.
///
/// # Errors
///
/// Returns an error if `host` is empty or contains whitespace.
pub(crate) fn validate_host(host: &str) -> Result<(), Error> {
    if host.is_empty() {
        return Err(Error::EmptyHost);
    }
    if host.contains(char::is_whitespace) {
        return Err(Error::Whitespace {
            host: host.to_string(),
        });
    }
    Ok(())
}

/// Returns the name under which `host` on `port` is stored in a known_hosts file.
///
/// # Errors
///
/// Returns an error if `host` is empty or contains whitespace.
pub(crate) fn host_label(host: &str, port: Option<u16>) -> Result<String, Error> {
    validate_host(host)?;
    let host = host.to_ascii_lowercase();
    Ok(match port {
        Some(port) if port != crate::matcher::DEFAULT_SSH_PORT => format!("[{host}]:{port}"),
        _ => host,
    })
}

/// Returns the HMAC-SHA1 of `name` keyed with `salt`.
///
/// # Errors
///
/// Returns an error if the HMAC can not be created from `salt`.
pub(crate) fn hash_name(salt: &[u8], name: &str) -> Result<[u8; SHA1_LEN], Error> {
    let mut mac = HmacSha1::new_from_slice(salt)?;
    mac.update(name.as_bytes());
    let mut digest = [0u8; SHA1_LEN];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    Ok(digest)
}
