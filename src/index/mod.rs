//! Persistent fingerprint index.
//!
//! The index maps fingerprints to the locations that share them. It lives in
//! a SQLite database on disk so that working memory stays bounded no matter
//! how many records the corpus holds, and it is reusable across runs: each
//! indexed file carries a [`FileSnapshot`](crate::scanner::FileSnapshot) so
//! unchanged files are not re-ingested.
//!
//! # Lifecycle
//!
//! 1. The detect phase opens the index for writing with
//!    [`FingerprintIndex::open`], streams `(fingerprint, location)` rows in,
//!    then queries duplicate groups and drops the handle.
//! 2. The delete phase may reopen it with [`FingerprintIndex::open_read_only`]
//!    only after that handle is gone.

pub mod database;

pub use database::{FingerprintIndex, IndexError, IndexSettings, SCHEMA_VERSION};
