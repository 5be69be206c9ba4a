//! File keys: portable identifiers for input files.
//!
//! A file key is the path of a file relative to the input directory, joined
//! with `/`. Keys identify files in the fingerprint index and in reports, and
//! they define the file half of the global `(file, line)` ordering.
//!
//! Keys keep the exact spelling found on disk, so [`key_to_path`] always
//! leads back to the file that produced the key. Unicode normalization is
//! only used to spot names that look identical but are distinct files:
//!
//! - NFC: `café.jsonl` - 'é' is U+00E9 (single code point)
//! - NFD: `café.jsonl` - 'e' U+0065 + combining acute accent U+0301
//!
//! Linux keeps both as separate files; macOS stores names in NFD.
//!
//! # Example
//!
//! ```
//! use jsondupe::scanner::path_utils::{file_key, key_to_path};
//! use std::path::Path;
//!
//! let root = Path::new("/data");
//! let path = Path::new("/data/shard/cafe\u{0301}.jsonl");
//! let key = file_key(root, path).unwrap();
//! assert_eq!(key, "shard/cafe\u{0301}.jsonl");
//! assert_eq!(key_to_path(root, &key), path);
//! ```

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Normalize a string to NFC (Composed) form.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Build the file key for `path` under `root`.
///
/// Returns `None` when `path` is not below `root` or a component is not
/// valid UTF-8, since no key could name such a file without loss.
#[must_use]
pub fn file_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Resolve a file key back to its path under `root`.
#[must_use]
pub fn key_to_path(root: &Path, key: &str) -> PathBuf {
    key.split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Pairs of distinct keys that are equal after NFC normalization.
///
/// Each pair is `(first seen, later)` in input order.
pub fn lookalike_keys<'a, I>(keys: I) -> Vec<(&'a str, &'a str)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashMap<String, &'a str> = HashMap::new();
    let mut pairs = Vec::new();
    for key in keys {
        match seen.get(&normalize_path_str(key)) {
            Some(&first) if first != key => pairs.push((first, key)),
            Some(_) => {}
            None => {
                seen.insert(normalize_path_str(key), key);
            }
        }
    }
    pairs
}
