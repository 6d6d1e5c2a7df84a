//! Encoding and decoding of single known_hosts lines.
//!
//! A known_hosts line has the form
//!
//! ```text
//! [marker] hostnames keytype key [comment]
//! ```
//!
//! or, for legacy RSA1 keys,
//!
//! ```text
//! [marker] hostnames bits exponent modulus [comment]
//! ```
//!
//! Blank lines and lines starting with `#` carry no entry.
//!
//! Encoding writes into a caller supplied buffer and never allocates.
//! If the buffer is too small, [`EncodeError::BufferTooSmall`] reports the required length, so that
//! the caller can retry with a large enough buffer.
//!
//! # Examples
//!
//! ```
//! use knownhosts::codec::{EncodeError, decode_line, encode_line};
//!
//! # fn main() -> testresult::TestResult {
//! let line = b"example.org ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAICjT2SuA0k/xc5Cbyp+eBY5uN3bRL2K7GdpNtltOK6vy";
//! let Some(entry) = decode_line(line)? else {
//!     panic!("A line with an entry should have been decoded");
//! };
//!
//! let mut buf = [0u8; 16];
//! let Err(EncodeError::BufferTooSmall { required }) = encode_line(&entry, &mut buf) else {
//!     panic!("The buffer should have been too small");
//! };
//!
//! let mut buf = vec![0u8; required];
//! let len = encode_line(&entry, &mut buf)?;
//! assert_eq!(&buf[..len - 1], line);
//!
//! assert!(decode_line(b"# a comment")?.is_none());
//! # Ok(())
//! # }
//! ```

use std::{borrow::Cow, str::FromStr};

use base64ct::{Base64, Encoding};

use crate::{
    algorithm::KeyAlgorithm,
    entry::{KnownHostEntry, Marker},
    pattern::{HASH_DELIMITER, HASH_MAGIC, HostPattern},
};

/// An error that may occur when decoding a known_hosts line.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A line does not have the structure of a known_hosts entry.
    #[error("Malformed known_hosts line: {reason}")]
    Malformed {
        /// The reason why the line is malformed.
        reason: &'static str,
    },

    /// A base64 encoded field can not be decoded.
    #[error("Invalid base64 encoding of the {field}: {source}")]
    BadBase64 {
        /// The field that can not be decoded.
        field: &'static str,

        /// The source error.
        source: base64ct::Error,
    },

    /// A key type token is not a valid algorithm name.
    #[error("Unknown key type {token:?}")]
    UnknownKeyType {
        /// The offending token.
        token: String,
    },
}

/// An error that may occur when encoding a known_hosts line.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The buffer provided for encoding is too small.
    #[error("The buffer is too small to encode the line, {required} bytes are required")]
    BufferTooSmall {
        /// The number of bytes required to encode the line.
        required: usize,
    },
}

/// Splits off the first whitespace-delimited field of `input`.
///
/// Returns the field and the remainder with leading whitespace removed.
fn next_field(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    Some(match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim_start()),
        None => (input, ""),
    })
}

/// Returns `true` if `field` is a non-empty decimal number.
fn is_decimal(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|byte| byte.is_ascii_digit())
}

/// Decodes the key type and key fields of a line.
///
/// Returns the algorithm, the decoded key and the remainder of the line.
fn decode_key_fields(input: &str) -> Result<(KeyAlgorithm, Vec<u8>, &str), DecodeError> {
    let (key_type, rest) = next_field(input).ok_or(DecodeError::Malformed {
        reason: "missing key type",
    })?;

    if is_decimal(key_type) {
        let mut rest = rest;
        let mut key = key_type.to_string();
        for _ in 0..2 {
            let (number, remainder) = next_field(rest)
                .filter(|(number, _)| is_decimal(number))
                .ok_or(DecodeError::Malformed {
                    reason: "incomplete RSA1 key",
                })?;
            key.push(' ');
            key.push_str(number);
            rest = remainder;
        }
        return Ok((KeyAlgorithm::Rsa1, key.into_bytes(), rest));
    }

    let algorithm = KeyAlgorithm::from_str(key_type)
        .ok()
        .filter(|algorithm| *algorithm != KeyAlgorithm::Rsa1)
        .ok_or(DecodeError::UnknownKeyType {
            token: key_type.to_string(),
        })?;

    let (key, rest) = next_field(rest).ok_or(DecodeError::Malformed {
        reason: "missing key",
    })?;
    let key = Base64::decode_vec(key).map_err(|source| DecodeError::BadBase64 {
        field: "key",
        source,
    })?;
    if key.is_empty() {
        return Err(DecodeError::Malformed { reason: "empty key" });
    }

    Ok((algorithm, key, rest))
}

/// Decodes a single known_hosts line.
///
/// Trailing line breaks are ignored.
/// Returns [`None`] for blank lines and lines starting with `#`.
/// Invalid UTF-8 in the comment is replaced with U+FFFD.
///
/// # Errors
///
/// Returns an error if
/// - the host name field is not valid UTF-8, the line lacks the host name, key type or key field
///   or has an unknown marker ([`DecodeError::Malformed`]),
/// - the key or a hashed host name is not valid base64 ([`DecodeError::BadBase64`]),
/// - or the key type is not a valid algorithm name ([`DecodeError::UnknownKeyType`]).
pub fn decode_line(line: &[u8]) -> Result<Option<KnownHostEntry>, DecodeError> {
    let line = String::from_utf8_lossy(line);
    let lossy = matches!(line, Cow::Owned(_));
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let Some((mut field, mut rest)) = next_field(line) else {
        return Ok(None);
    };

    let marker = if field.starts_with('@') {
        let marker = Marker::from_str(field).map_err(|_| DecodeError::Malformed {
            reason: "unknown marker",
        })?;
        (field, rest) = next_field(rest).ok_or(DecodeError::Malformed {
            reason: "missing host name field",
        })?;
        Some(marker)
    } else {
        None
    };

    // only the comment may carry invalid UTF-8
    if lossy && field.contains(char::REPLACEMENT_CHARACTER) {
        return Err(DecodeError::Malformed {
            reason: "host name field is not valid UTF-8",
        });
    }
    let pattern = HostPattern::from_str(field)?;
    let (key_algorithm, key, comment) = decode_key_fields(rest)?;
    let comment = (!comment.is_empty()).then(|| comment.to_string());

    Ok(Some(KnownHostEntry::from_parts(
        marker,
        pattern,
        key_algorithm,
        key,
        comment,
    )))
}

/// Decodes a public key in the form `keytype key [comment]`, as found in authorized_keys and
/// `*.pub` files.
///
/// # Errors
///
/// Returns an error if the key type is not a valid algorithm name, the key is missing or not valid
/// base64.
///
/// # Examples
///
/// ```
/// use knownhosts::{algorithm::KeyAlgorithm, codec::decode_public_key};
///
/// # fn main() -> testresult::TestResult {
/// let (algorithm, key) = decode_public_key("ssh-ed25519 AAAACw== user@host")?;
/// assert_eq!(algorithm, KeyAlgorithm::SshEd25519);
/// assert_eq!(key, [0, 0, 0, 11]);
/// # Ok(())
/// # }
/// ```
pub fn decode_public_key(input: &str) -> Result<(KeyAlgorithm, Vec<u8>), DecodeError> {
    let (algorithm, key, _) = decode_key_fields(input.trim())?;
    Ok((algorithm, key))
}

/// Returns the number of bytes [`encode_line`] writes for `entry`, including the line break.
pub fn encoded_len(entry: &KnownHostEntry) -> usize {
    let marker = entry
        .marker()
        .map(|marker| <&'static str>::from(marker).len() + 1)
        .unwrap_or_default();
    let key = match entry.key_algorithm() {
        KeyAlgorithm::Rsa1 => entry.key().len(),
        algorithm => algorithm.as_str().len() + 1 + Base64::encoded_len(entry.key()),
    };
    let comment = entry
        .comment()
        .map(|comment| comment.len() + 1)
        .unwrap_or_default();

    marker + entry.pattern().encoded_len() + 1 + key + comment + 1
}

/// Writes to a fixed size buffer.
struct LineWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl LineWriter<'_> {
    fn push(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn push_base64(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let required = self.buf.len();
        let written = Base64::encode(bytes, &mut self.buf[self.pos..])
            .map_err(|_| EncodeError::BufferTooSmall { required })?
            .len();
        self.pos += written;
        Ok(())
    }
}

/// Encodes `entry` as a known_hosts line into `buf`.
///
/// The line is terminated by a line break.
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`EncodeError::BufferTooSmall`] with the required length if `buf` is shorter than
/// [`encoded_len`] of `entry`.
/// Nothing is written to `buf` in this case.
pub fn encode_line(entry: &KnownHostEntry, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let required = encoded_len(entry);
    if buf.len() < required {
        return Err(EncodeError::BufferTooSmall { required });
    }

    let mut writer = LineWriter {
        buf: &mut buf[..required],
        pos: 0,
    };

    if let Some(marker) = entry.marker() {
        writer.push(<&'static str>::from(marker).as_bytes());
        writer.push(b" ");
    }

    match entry.pattern() {
        HostPattern::Plain(value) | HostPattern::Custom(value) => writer.push(value.as_bytes()),
        HostPattern::Hashed { salt, digest } => {
            writer.push(HASH_MAGIC.as_bytes());
            writer.push_base64(salt)?;
            writer.push(&[HASH_DELIMITER as u8]);
            writer.push_base64(digest)?;
        }
    }
    writer.push(b" ");

    match entry.key_algorithm() {
        KeyAlgorithm::Rsa1 => writer.push(entry.key()),
        algorithm => {
            writer.push(algorithm.as_str().as_bytes());
            writer.push(b" ");
            writer.push_base64(entry.key())?;
        }
    }

    if let Some(comment) = entry.comment() {
        writer.push(b" ");
        writer.push(comment.as_bytes());
    }
    writer.push(b"\n");

    Ok(writer.pos)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;
    use crate::pattern::SHA1_LEN;

    const ED25519_KEY: &str =
        "AAAAC3NzaC1lZDI1NTE5AAAAICjT2SuA0k/xc5Cbyp+eBY5uN3bRL2K7GdpNtltOK6vy";

    /// Encodes `entry` into a buffer of exactly the required size.
    fn encode_to_string(entry: &KnownHostEntry) -> TestResult<String> {
        let mut buf = vec![0u8; encoded_len(entry)];
        let len = encode_line(entry, &mut buf)?;
        assert_eq!(len, buf.len());
        Ok(String::from_utf8(buf)?)
    }

    #[rstest]
    #[case::plain(format!("gitlab.archlinux.org ssh-ed25519 {ED25519_KEY}"))]
    #[case::plain_list(format!("example.org,192.0.2.1 ssh-ed25519 {ED25519_KEY}"))]
    #[case::port(format!("[gitlab.archlinux.org]:2222 ssh-ed25519 {ED25519_KEY}"))]
    #[case::comment(format!("example.org ssh-ed25519 {ED25519_KEY} a comment  with spaces"))]
    #[case::revoked(format!("@revoked example.org ssh-ed25519 {ED25519_KEY}"))]
    #[case::cert_authority(format!("@cert-authority *.example.org ssh-ed25519 {ED25519_KEY} ca"))]
    #[case::hashed(format!(
        "|1|b8LfkX9Y09oxr9MMnQyfC9CtciI=|MnTpZgaon9ON5+hrylyRlq/li3Q= ssh-ed25519 {ED25519_KEY}"
    ))]
    #[case::custom(format!("|2|opaque ssh-rsa {ED25519_KEY}"))]
    #[case::other_algorithm(format!("example.org ssh-mldsa65@example.org {ED25519_KEY}"))]
    #[case::rsa1("example.org 1024 35 1234567 old key".to_string())]
    fn canonical_line_roundtrip(#[case] line: String) -> TestResult {
        let Some(entry) = decode_line(line.as_bytes())? else {
            panic!("The line {line:?} should carry an entry");
        };

        assert_eq!(encode_to_string(&entry)?, format!("{line}\n"));
        assert_eq!(decode_line(encode_to_string(&entry)?.as_bytes())?, Some(entry));

        Ok(())
    }

    #[rstest]
    #[case("  example.org\tssh-ed25519   {key}  \r\n", "example.org ssh-ed25519 {key}")]
    #[case("example.org ssh-ed25519 {key}   trailing comment  ", "example.org ssh-ed25519 {key} trailing comment")]
    fn whitespace_is_normalized(#[case] input: &str, #[case] canonical: &str) -> TestResult {
        let input = input.replace("{key}", ED25519_KEY);
        let canonical = canonical.replace("{key}", ED25519_KEY);
        let Some(entry) = decode_line(input.as_bytes())? else {
            panic!("The line {input:?} should carry an entry");
        };
        assert_eq!(entry.to_string(), canonical);
        Ok(())
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\n")]
    #[case("# example.org ssh-ed25519 AAAA")]
    #[case("   # indented comment")]
    fn lines_without_entry(#[case] line: &str) -> TestResult {
        assert!(decode_line(line.as_bytes())?.is_none());
        Ok(())
    }

    #[rstest]
    #[case::host_only("example.org")]
    #[case::no_key("example.org ssh-ed25519")]
    #[case::marker_only("@revoked")]
    #[case::unknown_marker("@trusted example.org ssh-ed25519 AAAACw==")]
    #[case::incomplete_rsa1("example.org 1024 35")]
    #[case::rsa1_non_decimal("example.org 1024 35 abc")]
    #[case::short_hash("|1|AAAA|AAAA ssh-ed25519 AAAACw==")]
    #[case::empty_key("example.org ssh-ed25519 =")]
    fn malformed_lines(#[case] line: &str) {
        assert!(
            matches!(
                decode_line(line.as_bytes()),
                Err(DecodeError::Malformed { .. }) | Err(DecodeError::BadBase64 { .. })
            ),
            "The line {line:?} should be malformed"
        );
    }

    #[rstest]
    #[case::host(&b"caf\xe9.example.org ssh-ed25519 AAAACw=="[..])]
    #[case::host_list(&b"example.org,\xff ssh-ed25519 AAAACw=="[..])]
    #[case::marker(&b"@revoked\xff example.org ssh-ed25519 AAAACw=="[..])]
    fn non_utf8_host_field_is_malformed(#[case] line: &[u8]) {
        assert!(matches!(
            decode_line(line),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[rstest]
    #[case::key(&b"example.org ssh-ed25519 \xff\xfe"[..])]
    #[case::key_type(&b"example.org ssh-ed\xff25519 AAAACw=="[..])]
    fn non_utf8_key_fields_fail(#[case] line: &[u8]) {
        assert!(decode_line(line).is_err());
    }

    /// Ensures that a comment with invalid UTF-8 does not prevent decoding the entry.
    #[test]
    fn non_utf8_comment_is_decoded_lossily() -> TestResult {
        let Some(entry) = decode_line(b"old.example.org ssh-ed25519 AAAACw== caf\xe9 au lait")? else {
            panic!("The line should carry an entry");
        };

        assert_eq!(entry.comment(), Some("caf\u{fffd} au lait"));
        assert!(entry.pattern().matches("old.example.org", None));
        assert_eq!(entry.key(), [0, 0, 0, 11]);

        Ok(())
    }

    #[rstest]
    #[case("example.org ssh-ed25519 not*base64")]
    #[case("|1|not*base64|MnTpZgaon9ON5+hrylyRlq/li3Q= ssh-ed25519 AAAACw==")]
    fn bad_base64(#[case] line: &str) {
        assert!(matches!(
            decode_line(line.as_bytes()),
            Err(DecodeError::BadBase64 { .. })
        ));
    }

    #[rstest]
    #[case("example.org ssh/ed25519 AAAACw==")]
    #[case("example.org -ssh-ed25519 AAAACw==")]
    #[case("example.org rsa1 AAAACw==")]
    fn unknown_key_type(#[case] line: &str) {
        assert!(matches!(
            decode_line(line.as_bytes()),
            Err(DecodeError::UnknownKeyType { .. })
        ));
    }

    #[test]
    fn encode_into_small_buffer_reports_required_length() -> TestResult {
        let entry = KnownHostEntry::new(
            HostPattern::hashed_with_salt("example.org", None, [1u8; SHA1_LEN])?,
            KeyAlgorithm::SshRsa,
            vec![1, 2, 3, 4, 5],
            Some("comment".to_string()),
        )?;
        let required = encoded_len(&entry);

        for size in [0, 1, required - 1] {
            let mut buf = vec![0u8; size];
            match encode_line(&entry, &mut buf) {
                Err(EncodeError::BufferTooSmall { required: reported }) => {
                    assert_eq!(reported, required);
                    assert!(buf.iter().all(|byte| *byte == 0));
                }
                Ok(_) => panic!("Encoding into {size} bytes should have failed"),
            }
        }

        let mut buf = vec![0u8; required + 10];
        assert_eq!(encode_line(&entry, &mut buf)?, required);

        Ok(())
    }

    #[test]
    fn decode_public_key_fails_without_key() {
        assert!(decode_public_key("ssh-ed25519").is_err());
        assert!(decode_public_key("").is_err());
    }
}
