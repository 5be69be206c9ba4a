//! BLAKE3 fingerprints of record text.
//!
//! # Overview
//!
//! A fingerprint is the 256-bit BLAKE3 digest of a record's text after the
//! configured [`TextNormalization`] has been applied. Two records are exact
//! duplicates when their fingerprints match. Full text is never stored next
//! to the digest, so a collision between distinct texts cannot be detected;
//! at 256 bits this is accepted as a known limitation.
//!
//! Normalization changes grouping results, so the active mode is recorded in
//! the fingerprint index and a mismatch forces a rebuild.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A 32-byte BLAKE3 digest.
pub type Fingerprint = [u8; 32];

/// How record text is normalized before it is fingerprinted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TextNormalization {
    /// Byte-exact text, no normalization.
    #[default]
    Exact,
    /// Strip leading and trailing whitespace.
    Trim,
    /// Trim and collapse every internal whitespace run to one space.
    CollapseWhitespace,
}

impl TextNormalization {
    /// Apply the normalization, borrowing when the text is unchanged.
    #[must_use]
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self {
            Self::Exact => Cow::Borrowed(text),
            Self::Trim => Cow::Borrowed(text.trim()),
            Self::CollapseWhitespace => {
                let mut out = String::with_capacity(text.len());
                for word in text.split_whitespace() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(word);
                }
                if out == text {
                    Cow::Borrowed(text)
                } else {
                    Cow::Owned(out)
                }
            }
        }
    }

    /// Stable name stored in index metadata.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Trim => "trim",
            Self::CollapseWhitespace => "collapse_whitespace",
        }
    }
}

impl std::fmt::Display for TextNormalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes fingerprints for record text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hasher {
    normalization: TextNormalization,
}

impl Hasher {
    /// Create a hasher using the given normalization.
    #[must_use]
    pub fn new(normalization: TextNormalization) -> Self {
        Self { normalization }
    }

    /// The normalization this hasher applies.
    #[must_use]
    pub fn normalization(&self) -> TextNormalization {
        self.normalization
    }

    /// Fingerprint a record's text.
    #[must_use]
    pub fn fingerprint(&self, text: &str) -> Fingerprint {
        let normalized = self.normalization.apply(text);
        *blake3::hash(normalized.as_bytes()).as_bytes()
    }
}

/// Render a fingerprint as lowercase hex.
#[must_use]
pub fn fingerprint_to_hex(fingerprint: &Fingerprint) -> String {
    hex::encode(fingerprint)
}

/// Parse a hex fingerprint, returning `None` unless it is exactly 32 bytes.
#[must_use]
pub fn hex_to_fingerprint(s: &str) -> Option<Fingerprint> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}
