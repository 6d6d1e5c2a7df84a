//! Type information of known_hosts entries.
//!
//! Every entry in a known_hosts file is described by three independent tags:
//!
//! - a [`NameType`], which tells how the host name field is stored,
//! - a [`KeyEncoding`], which tells how the key field is stored,
//! - and a [`KeyAlgorithm`], which names the public key algorithm.
//!
//! Together they form a [`TypeMask`].
//! Internally the three tags are always kept apart, but a [`TypeMask`] can be converted to and from
//! the libssh2 compatible bitmask representation using [`TypeMask::bits`] and
//! [`TypeMask::from_bits`].
//!
//! # Examples
//!
//! ```
//! use knownhosts::algorithm::{KeyAlgorithm, KeyEncoding, NameType, TypeMask};
//!
//! # fn main() -> testresult::TestResult {
//! let mask = TypeMask::new(NameType::Plain, KeyEncoding::Base64, KeyAlgorithm::SshEd25519);
//! assert_eq!(TypeMask::from_bits(mask.bits())?, mask);
//!
//! assert_eq!("ssh-ed25519".parse::<KeyAlgorithm>()?, KeyAlgorithm::SshEd25519);
//! assert!(matches!(
//!     "ssh-foo@example.org".parse::<KeyAlgorithm>()?,
//!     KeyAlgorithm::Other(_)
//! ));
//! assert!("ssh ed25519".parse::<KeyAlgorithm>().is_err());
//! # Ok(())
//! # }
//! ```

use std::{fmt::Display, str::FromStr};

/// The bits of a type mask that describe the [`NameType`].
pub const TYPE_MASK: u32 = 0xffff;

/// Bitmask value of [`NameType::Plain`].
pub const TYPE_PLAIN: u32 = 1;

/// Bitmask value of [`NameType::Sha1`].
pub const TYPE_SHA1: u32 = 2;

/// Bitmask value of [`NameType::Custom`].
pub const TYPE_CUSTOM: u32 = 3;

/// The bits of a type mask that describe the [`KeyEncoding`].
pub const KEYENC_MASK: u32 = 3 << 16;

/// Bitmask value of [`KeyEncoding::Raw`].
pub const KEYENC_RAW: u32 = 1 << 16;

/// Bitmask value of [`KeyEncoding::Base64`].
pub const KEYENC_BASE64: u32 = 2 << 16;

/// The offset of the [`KeyAlgorithm`] bits in a type mask.
pub const KEY_SHIFT: u32 = 18;

/// The bits of a type mask that describe the [`KeyAlgorithm`].
pub const KEY_MASK: u32 = 15 << KEY_SHIFT;

/// Bitmask value used for all algorithms without a dedicated value.
pub const KEY_UNKNOWN: u32 = 15 << KEY_SHIFT;

/// An error that may occur when handling type information.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A key type token is not a valid algorithm name.
    #[error("The key type {token:?} is not a valid algorithm name")]
    InvalidKeyType {
        /// The offending token.
        token: String,
    },

    /// A bitmask does not describe a valid type combination.
    #[error("The type mask {bits:#x} is invalid: {context}")]
    InvalidTypeMask {
        /// The offending bitmask.
        bits: u32,

        /// The part of the bitmask that is invalid.
        ///
        /// This is meant to complete the sentence "The type mask {bits} is invalid: ".
        context: &'static str,
    },
}

/// The way the host name field of an entry is stored.
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
#[strum(serialize_all = "lowercase")]
pub enum NameType {
    /// A comma-separated list of host name patterns.
    Plain,

    /// A salted HMAC-SHA1 digest of a single host name.
    Sha1,

    /// An opaque token, matched verbatim.
    Custom,
}

impl NameType {
    /// Returns the bitmask value of the name type.
    pub fn bits(&self) -> u32 {
        match self {
            Self::Plain => TYPE_PLAIN,
            Self::Sha1 => TYPE_SHA1,
            Self::Custom => TYPE_CUSTOM,
        }
    }
}

/// The way the key field of an entry is stored.
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
#[strum(serialize_all = "lowercase")]
pub enum KeyEncoding {
    /// The key is stored as is.
    ///
    /// Used by legacy RSA1 entries, which carry `bits exponent modulus` as decimal text.
    Raw,

    /// The key is stored as a base64 encoded public key blob.
    Base64,
}

impl KeyEncoding {
    /// Returns the bitmask value of the key encoding.
    pub fn bits(&self) -> u32 {
        match self {
            Self::Raw => KEYENC_RAW,
            Self::Base64 => KEYENC_BASE64,
        }
    }
}

/// Algorithm names and bitmask values, in the order of the named [`KeyAlgorithm`] variants.
const KNOWN_ALGORITHMS: [(&str, u32); 9] = [
    ("rsa1", 1 << KEY_SHIFT),
    ("ssh-rsa", 2 << KEY_SHIFT),
    ("ssh-dss", 3 << KEY_SHIFT),
    ("ecdsa-sha2-nistp256", 4 << KEY_SHIFT),
    ("ecdsa-sha2-nistp384", 5 << KEY_SHIFT),
    ("ecdsa-sha2-nistp521", 6 << KEY_SHIFT),
    ("ssh-ed25519", 7 << KEY_SHIFT),
    ("sk-ecdsa-sha2-nistp256@openssh.com", KEY_UNKNOWN),
    ("sk-ssh-ed25519@openssh.com", KEY_UNKNOWN),
];

/// A public key algorithm.
///
/// The set of algorithms is open: any syntactically valid key type token that is not known by name
/// is represented by [`KeyAlgorithm::Other`].
/// Parsing always resolves known names to their named variant, e.g. `ssh-ed25519` to
/// [`KeyAlgorithm::SshEd25519`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum KeyAlgorithm {
    /// Legacy SSH protocol 1 RSA key (no key type token in the file).
    Rsa1,

    /// `ssh-rsa`
    SshRsa,

    /// `ssh-dss`
    SshDss,

    /// `ecdsa-sha2-nistp256`
    EcdsaSha2Nistp256,

    /// `ecdsa-sha2-nistp384`
    EcdsaSha2Nistp384,

    /// `ecdsa-sha2-nistp521`
    EcdsaSha2Nistp521,

    /// `ssh-ed25519`
    SshEd25519,

    /// `sk-ecdsa-sha2-nistp256@openssh.com`
    SkEcdsaSha2Nistp256,

    /// `sk-ssh-ed25519@openssh.com`
    SkSshEd25519,

    /// Any other valid key type token.
    ///
    /// Only obtainable by parsing, so that names of the algorithms above never end up here.
    Other(AlgorithmName),
}

/// The name of a [`KeyAlgorithm::Other`].
///
/// The name is a valid key type token and never the name of a named [`KeyAlgorithm`] variant.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AlgorithmName(String);

impl AlgorithmName {
    /// Returns the name as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AlgorithmName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl KeyAlgorithm {
    /// Returns the position of a named variant in [`KNOWN_ALGORITHMS`].
    fn known_index(&self) -> Option<usize> {
        Some(match self {
            Self::Rsa1 => 0,
            Self::SshRsa => 1,
            Self::SshDss => 2,
            Self::EcdsaSha2Nistp256 => 3,
            Self::EcdsaSha2Nistp384 => 4,
            Self::EcdsaSha2Nistp521 => 5,
            Self::SshEd25519 => 6,
            Self::SkEcdsaSha2Nistp256 => 7,
            Self::SkSshEd25519 => 8,
            Self::Other(_) => return None,
        })
    }

    /// Returns the named variant at `index` in [`KNOWN_ALGORITHMS`].
    fn from_known_index(index: usize) -> Option<Self> {
        Some(match index {
            0 => Self::Rsa1,
            1 => Self::SshRsa,
            2 => Self::SshDss,
            3 => Self::EcdsaSha2Nistp256,
            4 => Self::EcdsaSha2Nistp384,
            5 => Self::EcdsaSha2Nistp521,
            6 => Self::SshEd25519,
            7 => Self::SkEcdsaSha2Nistp256,
            8 => Self::SkSshEd25519,
            _ => return None,
        })
    }

    /// Returns the key type token of the algorithm.
    ///
    /// For [`KeyAlgorithm::Rsa1`] this is `rsa1`, although RSA1 entries carry no key type token in
    /// a known_hosts file.
    pub fn as_str(&self) -> &str {
        match self.known_index() {
            Some(index) => KNOWN_ALGORITHMS[index].0,
            None => match self {
                Self::Other(name) => name.as_str(),
                _ => "",
            },
        }
    }

    /// Returns the bitmask value of the algorithm.
    ///
    /// All algorithms without a dedicated value map to [`KEY_UNKNOWN`].
    pub fn bits(&self) -> u32 {
        self.known_index()
            .map(|index| KNOWN_ALGORITHMS[index].1)
            .unwrap_or(KEY_UNKNOWN)
    }

    /// Returns the [`KeyEncoding`] an entry of this algorithm uses in a known_hosts file.
    pub fn encoding(&self) -> KeyEncoding {
        match self {
            Self::Rsa1 => KeyEncoding::Raw,
            _ => KeyEncoding::Base64,
        }
    }

    /// Returns `true` if the algorithm is known by name.
    pub fn is_known(&self) -> bool {
        self.known_index().is_some()
    }
}

impl Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` if `token` can be used as a key type token.
///
/// Valid tokens start with an ASCII letter and contain only ASCII alphanumerics and `-`, `.`, `_`,
/// `+` and `@`.
fn is_valid_key_type(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|char| char.is_ascii_alphanumeric() || matches!(char, '-' | '.' | '_' | '+' | '@'))
}

impl FromStr for KeyAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(index) = KNOWN_ALGORITHMS.iter().position(|(name, _)| *name == s) {
            if let Some(algorithm) = Self::from_known_index(index) {
                return Ok(algorithm);
            }
        }

        if !is_valid_key_type(s) {
            return Err(Error::InvalidKeyType {
                token: s.to_string(),
            });
        }

        Ok(Self::Other(AlgorithmName(s.to_string())))
    }
}

/// The combined type information of a known_hosts entry.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TypeMask {
    /// The way the host name is stored.
    pub name_type: NameType,

    /// The way the key is stored.
    pub encoding: KeyEncoding,

    /// The algorithm of the key.
    pub algorithm: KeyAlgorithm,
}

impl TypeMask {
    /// Creates a new [`TypeMask`].
    pub fn new(name_type: NameType, encoding: KeyEncoding, algorithm: KeyAlgorithm) -> Self {
        Self {
            name_type,
            encoding,
            algorithm,
        }
    }

    /// Returns the libssh2 compatible bitmask representation.
    ///
    /// Algorithms without a dedicated value are represented by [`KEY_UNKNOWN`] and can therefore
    /// not be restored from the bitmask.
    pub fn bits(&self) -> u32 {
        self.name_type.bits() | self.encoding.bits() | self.algorithm.bits()
    }

    /// Creates a [`TypeMask`] from its libssh2 compatible bitmask representation.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - the name type bits are not one of [`TYPE_PLAIN`], [`TYPE_SHA1`] or [`TYPE_CUSTOM`],
    /// - the key encoding bits are not one of [`KEYENC_RAW`] or [`KEYENC_BASE64`],
    /// - the algorithm bits do not name a specific algorithm (e.g. [`KEY_UNKNOWN`]),
    /// - or bits outside of the three fields are set.
    pub fn from_bits(bits: u32) -> Result<Self, Error> {
        if bits & !(TYPE_MASK | KEYENC_MASK | KEY_MASK) != 0 {
            return Err(Error::InvalidTypeMask {
                bits,
                context: "unknown bits are set",
            });
        }

        let name_type = match bits & TYPE_MASK {
            TYPE_PLAIN => NameType::Plain,
            TYPE_SHA1 => NameType::Sha1,
            TYPE_CUSTOM => NameType::Custom,
            _ => {
                return Err(Error::InvalidTypeMask {
                    bits,
                    context: "no valid name type",
                });
            }
        };

        let encoding = match bits & KEYENC_MASK {
            KEYENC_RAW => KeyEncoding::Raw,
            KEYENC_BASE64 => KeyEncoding::Base64,
            _ => {
                return Err(Error::InvalidTypeMask {
                    bits,
                    context: "no valid key encoding",
                });
            }
        };

        let algorithm_bits = bits & KEY_MASK;
        let algorithm = KNOWN_ALGORITHMS
            .iter()
            .position(|(_, bits)| *bits == algorithm_bits && algorithm_bits != KEY_UNKNOWN)
            .and_then(KeyAlgorithm::from_known_index)
            .ok_or(Error::InvalidTypeMask {
                bits,
                context: "no specific key algorithm",
            })?;

        Ok(Self {
            name_type,
            encoding,
            algorithm,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use strum::IntoEnumIterator;
    use testresult::TestResult;

    use super::*;

    #[rstest]
    #[case("rsa1", KeyAlgorithm::Rsa1)]
    #[case("ssh-rsa", KeyAlgorithm::SshRsa)]
    #[case("ssh-dss", KeyAlgorithm::SshDss)]
    #[case("ecdsa-sha2-nistp256", KeyAlgorithm::EcdsaSha2Nistp256)]
    #[case("ecdsa-sha2-nistp384", KeyAlgorithm::EcdsaSha2Nistp384)]
    #[case("ecdsa-sha2-nistp521", KeyAlgorithm::EcdsaSha2Nistp521)]
    #[case("ssh-ed25519", KeyAlgorithm::SshEd25519)]
    #[case("sk-ecdsa-sha2-nistp256@openssh.com", KeyAlgorithm::SkEcdsaSha2Nistp256)]
    #[case("sk-ssh-ed25519@openssh.com", KeyAlgorithm::SkSshEd25519)]
    fn key_algorithm_from_str(#[case] input: &str, #[case] expected: KeyAlgorithm) -> TestResult {
        let algorithm = KeyAlgorithm::from_str(input)?;
        assert_eq!(algorithm, expected);
        assert_eq!(algorithm.to_string(), input);
        assert!(algorithm.is_known());
        Ok(())
    }

    #[rstest]
    #[case("ssh-mldsa65@example.org")]
    #[case("ssh-foo")]
    #[case("x")]
    fn other_algorithm_from_str(#[case] input: &str) -> TestResult {
        let KeyAlgorithm::Other(name) = KeyAlgorithm::from_str(input)? else {
            panic!("{input} should not be a named algorithm");
        };
        assert_eq!(name.as_str(), input);
        assert_eq!(name.to_string(), input);
        Ok(())
    }

    /// Ensures that no name of a named variant can be parsed into [`KeyAlgorithm::Other`].
    #[test]
    fn known_names_never_parse_to_other() -> TestResult {
        for (name, _) in KNOWN_ALGORITHMS {
            assert!(KeyAlgorithm::from_str(name)?.is_known());
        }
        Ok(())
    }

    #[rstest]
    #[case("")]
    #[case("1ssh-rsa")]
    #[case("ssh rsa")]
    #[case("ssh-rsa,ssh-dss")]
    #[case("ssh-ed25519\u{e9}")]
    fn key_algorithm_from_str_fails(#[case] input: &str) {
        assert!(KeyAlgorithm::from_str(input).is_err());
    }

    #[test]
    fn type_mask_bits_roundtrip_for_known_algorithms() -> TestResult {
        for index in 0..7 {
            let Some(algorithm) = KeyAlgorithm::from_known_index(index) else {
                panic!("There should be a known algorithm at index {index}");
            };
            for name_type in NameType::iter() {
                for encoding in KeyEncoding::iter() {
                    let mask = TypeMask::new(name_type, encoding, algorithm.clone());
                    assert_eq!(TypeMask::from_bits(mask.bits())?, mask);
                }
            }
        }
        Ok(())
    }

    #[rstest]
    #[case(TYPE_PLAIN | KEYENC_BASE64 | (2 << KEY_SHIFT), KeyAlgorithm::SshRsa)]
    #[case(TYPE_SHA1 | KEYENC_BASE64 | (3 << KEY_SHIFT), KeyAlgorithm::SshDss)]
    #[case(TYPE_PLAIN | KEYENC_RAW | (1 << KEY_SHIFT), KeyAlgorithm::Rsa1)]
    fn type_mask_from_libssh2_bits(#[case] bits: u32, #[case] algorithm: KeyAlgorithm) -> TestResult {
        assert_eq!(TypeMask::from_bits(bits)?.algorithm, algorithm);
        Ok(())
    }

    #[rstest]
    #[case::no_name_type(KEYENC_BASE64 | (2 << KEY_SHIFT))]
    #[case::no_encoding(TYPE_PLAIN | (2 << KEY_SHIFT))]
    #[case::unknown_algorithm(TYPE_PLAIN | KEYENC_BASE64 | KEY_UNKNOWN)]
    #[case::no_algorithm(TYPE_PLAIN | KEYENC_BASE64)]
    #[case::stray_bits(TYPE_PLAIN | KEYENC_BASE64 | (2 << KEY_SHIFT) | (1 << 30))]
    fn type_mask_from_bits_fails(#[case] bits: u32) {
        assert!(TypeMask::from_bits(bits).is_err());
    }

    #[test]
    fn other_algorithms_map_to_unknown_bits() -> TestResult {
        let algorithm = KeyAlgorithm::from_str("ssh-foo")?;
        assert_eq!(algorithm.bits(), KEY_UNKNOWN);
        assert_eq!(KeyAlgorithm::SkSshEd25519.bits(), KEY_UNKNOWN);
        Ok(())
    }

    #[test]
    fn only_rsa1_uses_raw_encoding() -> TestResult {
        assert_eq!(KeyAlgorithm::Rsa1.encoding(), KeyEncoding::Raw);
        assert_eq!(KeyAlgorithm::SshRsa.encoding(), KeyEncoding::Base64);
        assert_eq!(
            KeyAlgorithm::from_str("ssh-foo")?.encoding(),
            KeyEncoding::Base64
        );
        Ok(())
    }
}
