//! Record identity used as the deduplication key.
//!
//! A fingerprint covers the level, the source, the host and the *headline* of a message: its
//! first line, cut to a fixed number of characters. Messages that only differ after the first
//! newline, or beyond the headline width, share a fingerprint and are rolled into the same
//! summary.

use crate::model::Level;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Default number of characters kept from the first line of a message.
pub const DEFAULT_HEADLINE_WIDTH: usize = 60;

// Keeps ("ab", "c") and ("a", "bc") apart in the digest input.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Returns the first line of `message`, truncated to at most `width` characters.
pub fn headline(message: &str, width: usize) -> &str {
  let first_line = message.split('\n').next().unwrap_or("");
  let first_line = first_line.strip_suffix('\r').unwrap_or(first_line);
  match first_line.char_indices().nth(width) {
    Some((cut, _)) => &first_line[..cut],
    None => first_line,
  }
}

/// SHA-256 identity of a (level, source, host, headline) tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
  /// Computes the fingerprint of an already extracted headline.
  pub fn from_parts(level: Level, source: &str, host: Option<&str>, headline: &str) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(level.as_str().as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(source.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(host.unwrap_or("").as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(headline.as_bytes());
    Fingerprint(hasher.finalize().into())
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }

  /// Short prefix of the hex form, for display.
  pub fn short(&self) -> String {
    let mut hex = self.to_string();
    hex.truncate(12);
    hex
  }
}

/// Fingerprints a full message, headline extraction included.
pub fn fingerprint(
  level: Level,
  source: &str,
  host: Option<&str>,
  message: &str,
  headline_width: usize,
) -> Fingerprint {
  Fingerprint::from_parts(level, source, host, headline(message, headline_width))
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in &self.0 {
      write!(f, "{:02x}", byte)?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFingerprintError(pub String);

impl fmt::Display for ParseFingerprintError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Invalid fingerprint '{}'. Expected 64 hex characters.", self.0)
  }
}

impl std::error::Error for ParseFingerprintError {}

impl FromStr for Fingerprint {
  type Err = ParseFingerprintError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let err = || ParseFingerprintError(s.to_string());
    if s.len() != 64 || !s.is_ascii() {
      return Err(err());
    }
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
      *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
    }
    Ok(Fingerprint(bytes))
  }
}
