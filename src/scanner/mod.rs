//! Scanner module for input discovery, record extraction and fingerprinting.
//!
//! This module provides functionality for:
//! - Parallel directory walking using jwalk, filtered by a glob pattern
//! - Lazy, malformed-line tolerant extraction of records from JSONL files
//! - Content fingerprinting with BLAKE3
//! - Lossless, `/`-separated file keys
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and input file discovery
//! - [`extractor`]: Line-by-line record extraction
//! - [`hasher`]: Text normalization and BLAKE3 fingerprints
//! - [`path_utils`]: File keys and lookalike-name detection
//!
//! # Example
//!
//! ```no_run
//! use jsondupe::scanner::{ExtractConfig, RecordExtractor, Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("data"), WalkerConfig::default());
//! let (files, _errors) = walker.discover();
//!
//! let extractor = RecordExtractor::new(ExtractConfig::default());
//! for file in &files {
//!     let records = extractor.records(&file.path, &file.key).unwrap();
//!     for record in records.flatten() {
//!         println!("{}: {}", record.location, record.text);
//!     }
//! }
//! ```

pub mod extractor;
pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// Re-export main types
pub use extractor::{EmptyTextPolicy, ExtractConfig, ExtractStats, RecordExtractor, Records};
pub use hasher::{fingerprint_to_hex, hex_to_fingerprint, Fingerprint, Hasher, TextNormalization};
pub use walker::Walker;

/// Identifies exactly one record without retaining its text.
///
/// `file` is the file key (see [`path_utils::file_key`]) and
/// `line` is the 1-based physical line number. The derived ordering is the
/// global `(file, line)` comparator: file keys compare bytewise, then lines
/// numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationRef {
    /// File key relative to the input directory
    pub file: String,
    /// 1-based line number within the file
    pub line: u64,
}

impl LocationRef {
    /// Create a new location reference.
    #[must_use]
    pub fn new(file: impl Into<String>, line: u64) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for LocationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One logical record extracted from a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Where the record lives
    pub location: LocationRef,
    /// Extracted comparable text
    pub text: String,
}

/// An input file discovered by the walker.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Key relative to the input directory
    pub key: String,
    /// Absolute (or root-joined) path on disk
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl InputFile {
    /// Snapshot of the size and mtime observed during discovery.
    #[must_use]
    pub fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            size: self.size,
            modified_ns: system_time_to_ns(self.modified),
            records: 0,
        }
    }
}

/// File metadata recorded at detection time.
///
/// Stored in the fingerprint index to skip unchanged files on re-runs, and in
/// the report so the deletion pass can refuse to rewrite a file that changed
/// after it was analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// File size in bytes
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch
    pub modified_ns: i64,
    /// Number of records extracted from the file
    pub records: u64,
}

impl FileSnapshot {
    /// Capture the current size and mtime of a file.
    ///
    /// The record count is left at zero; callers fill it in when known.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be stat'ed.
    pub fn capture(path: &Path) -> std::io::Result<Self> {
        std::fs::metadata(path).map(|m| Self::from_metadata(&m))
    }

    /// Snapshot from metadata already at hand, such as an open file's.
    #[must_use]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified_ns: system_time_to_ns(metadata.modified().unwrap_or(UNIX_EPOCH)),
            records: 0,
        }
    }

    /// Whether two snapshots describe the same file contents (size and mtime).
    #[must_use]
    pub fn same_contents(&self, other: &FileSnapshot) -> bool {
        self.size == other.size && self.modified_ns == other.modified_ns
    }

    /// Copy of this snapshot carrying a record count.
    #[must_use]
    pub fn with_records(mut self, records: u64) -> Self {
        self.records = records;
        self
    }
}

fn system_time_to_ns(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Glob selecting input files by name (e.g. `*.jsonl`).
    pub file_pattern: String,

    /// Descend into subdirectories.
    pub recursive: bool,

    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Additional glob patterns to exclude.
    pub ignore_patterns: Vec<String>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            file_pattern: "*.jsonl".to_string(),
            recursive: false,
            follow_symlinks: false,
            skip_hidden: true,
            ignore_patterns: Vec::new(),
        }
    }
}

impl WalkerConfig {
    /// Set the input file glob.
    #[must_use]
    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    /// Enable or disable recursion into subdirectories.
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set additional exclude globs.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }
}

/// Errors that can occur during directory scanning and record extraction.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A file name that cannot be represented as a file key.
    #[error("Unsupported file name (not valid UTF-8): {0}")]
    InvalidFileName(PathBuf),

    /// A file selection glob could not be compiled.
    #[error("Invalid file pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending glob
        pattern: String,
        /// Parser message
        message: String,
    },

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for a path the way the walker and extractor report it.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::PermissionDenied(p)
            | Self::NotFound(p)
            | Self::NotADirectory(p)
            | Self::InvalidFileName(p) => Some(p),
            Self::Io { path, .. } => Some(path),
            Self::InvalidPattern { .. } => None,
        }
    }
}
