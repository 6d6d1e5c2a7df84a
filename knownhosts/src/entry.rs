//! Entries of a known_hosts file.

use std::fmt::Display;

use crate::{
    algorithm::{KeyAlgorithm, KeyEncoding, TypeMask},
    fingerprint::Fingerprint,
    pattern::{HASH_DELIMITER, HASH_MAGIC, HostPattern},
};

/// An error that may occur when creating a [`KnownHostEntry`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A host pattern is not usable in a known_hosts file.
    #[error("Invalid host pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,

        /// The reason why the pattern is invalid.
        reason: &'static str,
    },

    /// An empty key is provided.
    #[error("The key of a known_hosts entry must not be empty")]
    EmptyKey,

    /// A legacy RSA1 key is not of the form `bits exponent modulus`.
    #[error("An RSA1 key must consist of three decimal numbers (bits, exponent and modulus)")]
    InvalidRsa1Key,

    /// A comment contains a line break.
    #[error("A comment must not contain line breaks")]
    MultilineComment,
}

/// A marker in front of a known_hosts entry.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum Marker {
    /// The key is a certificate authority for the hosts of the entry.
    #[strum(serialize = "@cert-authority")]
    CertAuthority,

    /// The key is revoked and must never be accepted for the hosts of the entry.
    #[strum(serialize = "@revoked")]
    Revoked,
}

/// Returns `true` if `key` is a legacy RSA1 key of the form `bits exponent modulus`.
pub(crate) fn is_rsa1_key(key: &[u8]) -> bool {
    let mut parts = 0;
    for part in key.split(|byte| *byte == b' ') {
        if part.is_empty() || !part.iter().all(u8::is_ascii_digit) {
            return false;
        }
        parts += 1;
    }
    parts == 3
}

/// A single entry of a known_hosts file.
///
/// An entry associates a [`HostPattern`] with a public key.
/// Entries are immutable: replacing the key of a host means removing its entry and adding a new
/// one.
///
/// The key is always kept in its decoded form: the public key blob for all algorithms but
/// [`KeyAlgorithm::Rsa1`], for which the ASCII text `bits exponent modulus` is kept.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KnownHostEntry {
    marker: Option<Marker>,
    pattern: HostPattern,
    key_algorithm: KeyAlgorithm,
    key: Vec<u8>,
    comment: Option<String>,
}

impl KnownHostEntry {
    /// Creates a new [`KnownHostEntry`].
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - a [`HostPattern::Plain`] or [`HostPattern::Custom`] is empty or contains whitespace,
    /// - a [`HostPattern::Plain`] starts with `|`,
    /// - a [`HostPattern::Custom`] does not start with `|` or starts with `|1|`,
    /// - `key` is empty,
    /// - `key_algorithm` is [`KeyAlgorithm::Rsa1`] but `key` is not of the form `bits exponent
    ///   modulus`,
    /// - or `comment` contains a line break.
    ///
    /// # Examples
    ///
    /// ```
    /// use knownhosts::{algorithm::KeyAlgorithm, entry::KnownHostEntry, pattern::HostPattern};
    ///
    /// # fn main() -> testresult::TestResult {
    /// let entry = KnownHostEntry::new(
    ///     HostPattern::plain("example.org", None)?,
    ///     KeyAlgorithm::SshEd25519,
    ///     vec![0, 0, 0, 11],
    ///     Some("a comment".to_string()),
    /// )?;
    /// assert_eq!(entry.to_string(), "example.org ssh-ed25519 AAAACw== a comment");
    ///
    /// assert!(KnownHostEntry::new(
    ///     HostPattern::plain("example.org", None)?,
    ///     KeyAlgorithm::Rsa1,
    ///     b"not an rsa1 key".to_vec(),
    ///     None,
    /// )
    /// .is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        pattern: HostPattern,
        key_algorithm: KeyAlgorithm,
        key: Vec<u8>,
        comment: Option<String>,
    ) -> Result<Self, Error> {
        match &pattern {
            HostPattern::Plain(value) | HostPattern::Custom(value) => {
                if value.is_empty() {
                    return Err(Error::InvalidPattern {
                        pattern: value.clone(),
                        reason: "empty",
                    });
                }
                if value.contains(char::is_whitespace) {
                    return Err(Error::InvalidPattern {
                        pattern: value.clone(),
                        reason: "contains whitespace",
                    });
                }
                if value.starts_with('@') || value.starts_with('#') {
                    return Err(Error::InvalidPattern {
                        pattern: value.clone(),
                        reason: "starts with a marker or comment character",
                    });
                }
            }
            HostPattern::Hashed { .. } => {}
        }
        match &pattern {
            HostPattern::Plain(value) if value.starts_with(HASH_DELIMITER) => {
                return Err(Error::InvalidPattern {
                    pattern: value.clone(),
                    reason: "plain patterns must not start with '|'",
                });
            }
            HostPattern::Custom(value)
                if !value.starts_with(HASH_DELIMITER) || value.starts_with(HASH_MAGIC) =>
            {
                return Err(Error::InvalidPattern {
                    pattern: value.clone(),
                    reason: "custom tokens must start with '|' but not with '|1|'",
                });
            }
            _ => {}
        }
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if key_algorithm == KeyAlgorithm::Rsa1 && !is_rsa1_key(&key) {
            return Err(Error::InvalidRsa1Key);
        }
        if comment
            .as_deref()
            .is_some_and(|comment| comment.contains(['\n', '\r']))
        {
            return Err(Error::MultilineComment);
        }

        Ok(Self {
            marker: None,
            pattern,
            key_algorithm,
            key,
            comment: comment
                .map(|comment| comment.trim().to_string())
                .filter(|comment| !comment.is_empty()),
        })
    }

    /// Creates a [`KnownHostEntry`] from already validated parts.
    pub(crate) fn from_parts(
        marker: Option<Marker>,
        pattern: HostPattern,
        key_algorithm: KeyAlgorithm,
        key: Vec<u8>,
        comment: Option<String>,
    ) -> Self {
        Self {
            marker,
            pattern,
            key_algorithm,
            key,
            comment,
        }
    }

    /// Returns the entry with `marker` set.
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Returns the entry with its host pattern replaced by `pattern`.
    pub(crate) fn with_pattern(mut self, pattern: HostPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Returns the optional marker of the entry.
    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    /// Returns the host pattern of the entry.
    pub fn pattern(&self) -> &HostPattern {
        &self.pattern
    }

    /// Returns the key algorithm of the entry.
    pub fn key_algorithm(&self) -> &KeyAlgorithm {
        &self.key_algorithm
    }

    /// Returns the key encoding of the entry.
    pub fn key_encoding(&self) -> KeyEncoding {
        self.key_algorithm.encoding()
    }

    /// Returns the decoded key of the entry.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Returns the optional comment of the entry.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns the [`TypeMask`] of the entry.
    pub fn type_mask(&self) -> TypeMask {
        TypeMask::new(
            self.pattern.name_type(),
            self.key_encoding(),
            self.key_algorithm.clone(),
        )
    }

    /// Returns the SHA-256 [`Fingerprint`] of the key of the entry.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::sha256(&self.key)
    }
}

impl Display for KnownHostEntry {
    /// Writes the entry in its known_hosts line representation, without a trailing line break.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut buf = vec![0u8; crate::codec::encoded_len(self)];
        let len = crate::codec::encode_line(self, &mut buf).map_err(|_| std::fmt::Error)?;
        let line = std::str::from_utf8(&buf[..len]).map_err(|_| std::fmt::Error)?;
        f.write_str(line.trim_end_matches('\n'))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    #[rstest]
    #[case(b"1024 35 1234567".to_vec(), true)]
    #[case(b"1024 35".to_vec(), false)]
    #[case(b"1024 35 1234567 1".to_vec(), false)]
    #[case(b"1024  35 1234567".to_vec(), false)]
    #[case(b"1024 0x23 1234567".to_vec(), false)]
    fn rsa1_key(#[case] key: Vec<u8>, #[case] expected: bool) {
        assert_eq!(is_rsa1_key(&key), expected);
    }

    #[rstest]
    #[case::empty_pattern(HostPattern::Plain(String::new()), vec![1], None)]
    #[case::whitespace_pattern(HostPattern::Plain("a b".to_string()), vec![1], None)]
    #[case::marker_pattern(HostPattern::Plain("@revoked".to_string()), vec![1], None)]
    #[case::pipe_pattern(HostPattern::Plain("|1|abc".to_string()), vec![1], None)]
    #[case::custom_without_pipe(HostPattern::Custom("token".to_string()), vec![1], None)]
    #[case::empty_key(HostPattern::Plain("example.org".to_string()), vec![], None)]
    #[case::multiline_comment(
        HostPattern::Plain("example.org".to_string()),
        vec![1],
        Some("first\nsecond".to_string())
    )]
    fn new_entry_fails(
        #[case] pattern: HostPattern,
        #[case] key: Vec<u8>,
        #[case] comment: Option<String>,
    ) {
        assert!(KnownHostEntry::new(pattern, KeyAlgorithm::SshEd25519, key, comment).is_err());
    }

    /// Ensures that entries created from parsed algorithms survive encoding and decoding.
    #[rstest]
    #[case("ssh-ed25519")]
    #[case("ecdsa-sha2-nistp256")]
    #[case("ssh-mldsa65@example.org")]
    fn parsed_algorithm_roundtrip(#[case] key_type: &str) -> TestResult {
        let entry = KnownHostEntry::new(
            HostPattern::plain("example.org", None)?,
            key_type.parse()?,
            vec![0, 0, 0, 11],
            Some("comment".to_string()),
        )?;

        assert_eq!(
            crate::codec::decode_line(entry.to_string().as_bytes())?,
            Some(entry)
        );
        Ok(())
    }

    #[test]
    fn blank_comment_is_dropped() -> TestResult {
        let entry = KnownHostEntry::new(
            HostPattern::plain("example.org", None)?,
            KeyAlgorithm::SshRsa,
            vec![1, 2, 3],
            Some("   ".to_string()),
        )?;
        assert_eq!(entry.comment(), None);
        Ok(())
    }

    #[test]
    fn rsa1_entry_uses_raw_encoding() -> TestResult {
        let entry = KnownHostEntry::new(
            HostPattern::plain("example.org", None)?,
            KeyAlgorithm::Rsa1,
            b"1024 35 1234567".to_vec(),
            None,
        )?;
        assert_eq!(entry.key_encoding(), KeyEncoding::Raw);
        assert_eq!(entry.to_string(), "example.org 1024 35 1234567");
        Ok(())
    }

    #[test]
    fn marker_is_displayed() -> TestResult {
        let entry = KnownHostEntry::new(
            HostPattern::plain("*.example.org", None)?,
            KeyAlgorithm::SshEd25519,
            vec![0, 0, 0, 11],
            None,
        )?
        .with_marker(Marker::CertAuthority);
        assert_eq!(
            entry.to_string(),
            "@cert-authority *.example.org ssh-ed25519 AAAACw=="
        );
        Ok(())
    }
}
