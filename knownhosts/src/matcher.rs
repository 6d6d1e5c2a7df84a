//! Matching of hosts against the host name field of known_hosts entries.
//!
//! A connecting host is described by its name (or IP address) and an optional port.
//! Before matching, the name is lowercased and turned into the list of names it is known under:
//!
//! - for [`None`] or the default SSH port: `host` and `[host]:22`,
//! - for any other port: `[host]:port` only.
//!
//! A [`HostPattern::Plain`] matches if any of its comma-separated sub-patterns matches any of these
//! names, unless a negated sub-pattern (prefixed with `!`) matches, which always results in no
//! match.
//! Sub-patterns support the wildcards `*` (any number of characters) and `?` (exactly one
//! character) and IP networks in CIDR notation (e.g. `192.0.2.0/24`).
//!
//! A [`HostPattern::Hashed`] matches if the HMAC-SHA1 of any of the names, keyed with the salt of
//! the pattern, equals its digest.
//! Digests are compared in constant time and all names are always hashed.
//!
//! A [`HostPattern::Custom`] matches if its token equals one of the names.
//!
//! # Examples
//!
//! ```
//! use std::str::FromStr;
//!
//! use knownhosts::{matcher::matches, pattern::HostPattern};
//!
//! # fn main() -> testresult::TestResult {
//! let pattern = HostPattern::from_str("!bar.example.com,*.example.com")?;
//!
//! assert!(matches(&pattern, "foo.example.com", None));
//! assert!(!matches(&pattern, "bar.example.com", None));
//! assert!(!matches(&pattern, "example.com", None));
//! # Ok(())
//! # }
//! ```

use std::net::IpAddr;

use hmac::Mac;
use log::trace;

use crate::pattern::{HmacSha1, HostPattern};

/// The default port of the SSH protocol.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Returns `true` if `pattern` matches `host` on `port`.
///
/// See the [module documentation](crate::matcher) for the matching rules.
pub fn matches(pattern: &HostPattern, host: &str, port: Option<u16>) -> bool {
    HostCandidate::new(host, port).matches(pattern)
}

/// A connecting host, prepared for matching against many host patterns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostCandidate {
    names: Vec<String>,
}

impl HostCandidate {
    /// Creates a new [`HostCandidate`] from a `host` and an optional `port`.
    pub fn new(host: &str, port: Option<u16>) -> Self {
        let host = host.to_ascii_lowercase();
        let names = match port {
            Some(port) if port != DEFAULT_SSH_PORT => vec![format!("[{host}]:{port}")],
            _ => vec![format!("[{host}]:{DEFAULT_SSH_PORT}"), host],
        };
        Self { names }
    }

    /// Returns the names the host is known under.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns `true` if `pattern` matches the host.
    pub fn matches(&self, pattern: &HostPattern) -> bool {
        let matched = match pattern {
            HostPattern::Plain(list) => self.matches_list(list),
            HostPattern::Hashed { salt, digest } => self.matches_hashed(salt, digest),
            HostPattern::Custom(token) => self.names.iter().any(|name| name == token),
        };
        trace!(
            "Host names {:?} {} {pattern}",
            self.names,
            if matched { "match" } else { "do not match" }
        );
        matched
    }

    /// Matches a comma-separated list of (possibly negated) sub-patterns.
    fn matches_list(&self, list: &str) -> bool {
        let mut matched = false;
        for sub_pattern in list.split(',') {
            let (negated, sub_pattern) = match sub_pattern.strip_prefix('!') {
                Some(sub_pattern) => (true, sub_pattern),
                None => (false, sub_pattern),
            };
            if sub_pattern.is_empty() {
                continue;
            }
            let sub_pattern = sub_pattern.to_ascii_lowercase();

            if self
                .names
                .iter()
                .any(|name| match_sub_pattern(&sub_pattern, name))
            {
                if negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }

    /// Matches a salted HMAC-SHA1 digest.
    ///
    /// Every name is hashed and compared in constant time, regardless of earlier results.
    fn matches_hashed(&self, salt: &[u8], digest: &[u8]) -> bool {
        let mut matched = false;
        for name in &self.names {
            let Ok(mut mac) = HmacSha1::new_from_slice(salt) else {
                return false;
            };
            mac.update(name.as_bytes());
            matched |= mac.verify_slice(digest).is_ok();
        }
        matched
    }
}

/// Matches a single, non-negated sub-pattern against a name.
fn match_sub_pattern(sub_pattern: &str, name: &str) -> bool {
    if let Some((network, prefix_len)) = sub_pattern.split_once('/') {
        return match_cidr(network, prefix_len, name);
    }
    glob_match(sub_pattern.as_bytes(), name.as_bytes())
}

/// Matches an IP address `name` against the network `network/prefix_len`.
///
/// Returns `false` if the network, the prefix length or `name` can not be parsed, or if address
/// families differ.
fn match_cidr(network: &str, prefix_len: &str, name: &str) -> bool {
    let (Ok(network), Ok(prefix_len), Ok(address)) = (
        network.parse::<IpAddr>(),
        prefix_len.parse::<u32>(),
        name.parse::<IpAddr>(),
    ) else {
        return false;
    };

    match (network, address) {
        (IpAddr::V4(network), IpAddr::V4(address)) if prefix_len <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix_len).unwrap_or(0);
            u32::from(network) & mask == u32::from(address) & mask
        }
        (IpAddr::V6(network), IpAddr::V6(address)) if prefix_len <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix_len).unwrap_or(0);
            u128::from(network) & mask == u128::from(address) & mask
        }
        _ => false,
    }
}

/// Matches `text` against a glob `pattern` supporting `*` and `?`.
///
/// Runs in `O(pattern.len() * text.len())` without recursion.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // position of the last `*` in pattern and the text position it currently consumes up to
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&byte) if byte == b'?' || byte == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|byte| *byte == b'*')
}
