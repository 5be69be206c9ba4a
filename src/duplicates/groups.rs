//! Duplicate groups.
//!
//! A [`DuplicateGroup`] is a set of at least two locations decided to hold
//! the same record. Members are kept sorted by the global `(file, line)`
//! ordering, so the first member is always the one to keep.
//!
//! Exact groups are identified by the hex fingerprint they share. Near
//! groups get a synthetic id such as `near-000001`.
//!
//! # Example
//!
//! ```
//! use jsondupe::duplicates::DuplicateGroup;
//! use jsondupe::scanner::{Hasher, LocationRef};
//!
//! let fp = Hasher::default().fingerprint("alpha");
//! let group = DuplicateGroup::exact(
//!     &fp,
//!     vec![LocationRef::new("b.jsonl", 1), LocationRef::new("a.jsonl", 4)],
//! );
//!
//! assert_eq!(group.keep(), Some(&LocationRef::new("a.jsonl", 4)));
//! assert_eq!(group.removals(), &[LocationRef::new("b.jsonl", 1)]);
//! ```

use serde::{Deserialize, Serialize};

use crate::scanner::{fingerprint_to_hex, Fingerprint, LocationRef};

/// How a group was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Members share a fingerprint
    Exact,
    /// Members are linked by similarity in the sample
    Near,
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Near => write!(f, "near"),
        }
    }
}

/// A set of locations holding duplicates of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Hex fingerprint for exact groups, synthetic cluster id for near groups
    pub id: String,
    /// Detection source
    pub kind: GroupKind,
    /// Members sorted by `(file, line)`, without repeats
    pub members: Vec<LocationRef>,
}

impl DuplicateGroup {
    /// Create a group, sorting and deduplicating its members.
    #[must_use]
    pub fn new(id: String, kind: GroupKind, mut members: Vec<LocationRef>) -> Self {
        members.sort();
        members.dedup();
        Self { id, kind, members }
    }

    /// Create an exact group keyed by a fingerprint.
    #[must_use]
    pub fn exact(fingerprint: &Fingerprint, members: Vec<LocationRef>) -> Self {
        Self::new(fingerprint_to_hex(fingerprint), GroupKind::Exact, members)
    }

    /// Create a near-duplicate group with a synthetic id.
    #[must_use]
    pub fn near(id: impl Into<String>, members: Vec<LocationRef>) -> Self {
        Self::new(id.into(), GroupKind::Near, members)
    }

    /// Synthetic id for the `n`-th near-duplicate cluster (1-based).
    #[must_use]
    pub fn near_id(n: usize) -> String {
        format!("near-{n:06}")
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if this group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the group actually holds duplicates (2+ members).
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        self.members.len() > 1
    }

    /// The surviving member: smallest `(file, line)`.
    #[must_use]
    pub fn keep(&self) -> Option<&LocationRef> {
        self.members.first()
    }

    /// Every member except the survivor.
    #[must_use]
    pub fn removals(&self) -> &[LocationRef] {
        self.members.get(1..).unwrap_or(&[])
    }
}
