//! Fingerprints of public keys.

use std::fmt::Display;

use base64ct::{Base64Unpadded, Encoding};
use md5::Md5;
use sha2::{Digest, Sha256};

/// The fingerprint of a public key, as shown by OpenSSH.
///
/// # Examples
///
/// ```
/// use knownhosts::fingerprint::Fingerprint;
///
/// assert_eq!(
///     Fingerprint::sha256(b"").to_string(),
///     "SHA256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU"
/// );
/// assert_eq!(
///     Fingerprint::md5(b"").to_string(),
///     "MD5:d4:1d:8c:d9:8f:00:b2:04:e9:80:09:98:ec:f8:42:7e"
/// );
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Fingerprint {
    /// A SHA-256 digest, rendered as unpadded base64.
    Sha256([u8; 32]),

    /// A legacy MD5 digest, rendered as colon-separated hex.
    Md5([u8; 16]),
}

impl Fingerprint {
    /// Creates the SHA-256 fingerprint of a decoded public key blob.
    pub fn sha256(key: &[u8]) -> Self {
        Self::Sha256(Sha256::digest(key).into())
    }

    /// Creates the MD5 fingerprint of a decoded public key blob.
    pub fn md5(key: &[u8]) -> Self {
        Self::Md5(Md5::digest(key).into())
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha256(digest) => write!(f, "SHA256:{}", Base64Unpadded::encode_string(digest)),
            Self::Md5(digest) => {
                f.write_str("MD5:")?;
                for (index, byte) in digest.iter().enumerate() {
                    if index > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}
