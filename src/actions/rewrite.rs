//! In-place removal of duplicate lines.
//!
//! # Overview
//!
//! Each affected file is streamed line by line into a temporary file in the
//! same directory, skipping the lines marked for removal, and the temporary
//! file then atomically replaces the original. Kept lines are copied as raw
//! bytes, so their content, line endings and a missing final newline are all
//! preserved exactly. A reader of the file sees either the old contents or
//! the new ones, never a mix.
//!
//! # Safety
//!
//! - A file whose size or mtime differs from the snapshot taken at detection
//!   is refused with [`RewriteError::Modified`]. The check uses the handle
//!   that is then read, not a second lookup of the path.
//! - A symlinked input is rewritten at its target; the link stays a link.
//! - A removal line beyond the end of the file means the plan does not match
//!   the file; the rewrite is abandoned and the original left untouched.
//! - On any error the temporary file is dropped and the original is intact.
//!
//! # Example
//!
//! ```no_run
//! use jsondupe::actions::rewrite::rewrite_file;
//! use std::collections::BTreeSet;
//! use std::path::Path;
//!
//! let remove: BTreeSet<u64> = [2, 5].into_iter().collect();
//! let result = rewrite_file(Path::new("data/a.jsonl"), "a.jsonl", &remove, None)?;
//! println!("removed {} lines", result.removed);
//! # Ok::<(), jsondupe::actions::RewriteError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytesize::ByteSize;
use rayon::prelude::*;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::duplicates::Resolution;
use crate::pool::run_with_io_threads;
use crate::progress::{phase, ProgressCallback};
use crate::scanner::path_utils::key_to_path;
use crate::scanner::FileSnapshot;

/// Error type for rewrite operations.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when reading or replacing the file.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// File was modified since detection (TOCTOU protection).
    #[error("file modified since detection: {0}")]
    Modified(PathBuf),

    /// The plan names a line the file does not have.
    #[error("stale removal plan for {path}: line {line} requested but file has {lines} lines")]
    StalePlan {
        /// File path
        path: PathBuf,
        /// Highest requested line
        line: u64,
        /// Lines actually present
        lines: u64,
    },

    /// The temporary file could not replace the original.
    #[error("failed to replace {path}: {source}")]
    Persist {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl RewriteError {
    fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Get the path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::Modified(p) => p,
            Self::StalePlan { path, .. } | Self::Persist { path, .. } | Self::Io { path, .. } => {
                path
            }
        }
    }
}

/// Result of rewriting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRewriteResult {
    /// File key
    pub key: String,
    /// Path on disk
    pub path: PathBuf,
    /// Lines removed
    pub removed: u64,
    /// Lines kept, including blank and malformed ones
    pub kept: u64,
    /// Size before the rewrite
    pub bytes_before: u64,
    /// Size after the rewrite
    pub bytes_after: u64,
}

/// Results of a batch rewrite.
#[derive(Debug, Clone, Default)]
pub struct BatchRewriteResult {
    /// Successfully rewritten files, in key order.
    pub rewritten: Vec<FileRewriteResult>,
    /// Failed files (key, error message), in key order.
    pub failures: Vec<(String, String)>,
    /// Files not attempted because shutdown was requested.
    pub skipped: Vec<String>,
}

impl BatchRewriteResult {
    /// Number of rewritten files.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.rewritten.len()
    }

    /// Number of failed files.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Total lines removed across all files.
    #[must_use]
    pub fn total_removed(&self) -> u64 {
        self.rewritten.iter().map(|r| r.removed).sum()
    }

    /// Total bytes reclaimed.
    #[must_use]
    pub fn bytes_freed(&self) -> u64 {
        self.rewritten
            .iter()
            .map(|r| r.bytes_before.saturating_sub(r.bytes_after))
            .sum()
    }

    /// Check if every file was rewritten.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    /// Whether the batch stopped early on a shutdown request.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Removed {} line(s) from {} file(s), freed {}",
            self.total_removed(),
            self.success_count(),
            ByteSize::b(self.bytes_freed())
        );
        if !self.failures.is_empty() {
            summary.push_str(&format!(", {} failed", self.failure_count()));
        }
        if !self.skipped.is_empty() {
            summary.push_str(&format!(", {} skipped", self.skipped.len()));
        }
        summary
    }
}

/// Configuration for a batch rewrite.
#[derive(Clone)]
pub struct RewriteConfig {
    /// Number of files rewritten in parallel.
    pub io_threads: usize,
    /// Refuse files whose size or mtime changed since detection.
    pub verify_snapshots: bool,
    /// Optional shutdown flag; checked between files.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for RewriteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteConfig")
            .field("io_threads", &self.io_threads)
            .field("verify_snapshots", &self.verify_snapshots)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            verify_snapshots: true,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl RewriteConfig {
    /// Set the number of parallel rewrites (at least 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Enable/disable snapshot verification.
    #[must_use]
    pub fn with_verify_snapshots(mut self, verify: bool) -> Self {
        self.verify_snapshots = verify;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Rewrite one file without the given 1-based lines.
///
/// With `expected` set, the file must still match that snapshot. An empty
/// removal set leaves the file untouched.
///
/// # Errors
///
/// Returns a [`RewriteError`] if the file changed, cannot be read or
/// replaced, or does not have every requested line. The original file is
/// unchanged in every error case.
pub fn rewrite_file(
    path: &Path,
    key: &str,
    remove: &BTreeSet<u64>,
    expected: Option<&FileSnapshot>,
) -> Result<FileRewriteResult, RewriteError> {
    // Through a symlink, the link target is the file to replace.
    let target = fs::canonicalize(path).map_err(|e| RewriteError::from_io(path, e))?;
    let file = File::open(&target).map_err(|e| RewriteError::from_io(path, e))?;
    let metadata = file.metadata().map_err(|e| RewriteError::from_io(path, e))?;
    let bytes_before = metadata.len();

    if let Some(expected) = expected {
        let current = FileSnapshot::from_metadata(&metadata);
        if !current.same_contents(expected) {
            log::warn!(
                "File modified since detection: {} (size {} -> {}, mtime {} -> {})",
                path.display(),
                expected.size,
                current.size,
                expected.modified_ns,
                current.modified_ns
            );
            return Err(RewriteError::Modified(path.to_path_buf()));
        }
    }

    if remove.is_empty() {
        return Ok(FileRewriteResult {
            key: key.to_string(),
            path: path.to_path_buf(),
            removed: 0,
            kept: 0,
            bytes_before,
            bytes_after: bytes_before,
        });
    }

    let dir = target.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| RewriteError::from_io(dir, e))?;

    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut buf = Vec::new();
    let mut line = 0u64;
    let mut removed = 0u64;
    let mut bytes_after = 0u64;
    {
        let mut writer = BufWriter::with_capacity(64 * 1024, tmp.as_file_mut());
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| RewriteError::from_io(path, e))?;
            if n == 0 {
                break;
            }
            line += 1;
            if remove.contains(&line) {
                removed += 1;
                continue;
            }
            writer
                .write_all(&buf)
                .map_err(|e| RewriteError::from_io(dir, e))?;
            bytes_after += n as u64;
        }
        writer
            .flush()
            .map_err(|e| RewriteError::from_io(dir, e))?;
    }

    if let Some(&last) = remove.iter().next_back() {
        if last > line {
            log::warn!(
                "Refusing to rewrite {}: plan removes line {} but file has {}",
                path.display(),
                last,
                line
            );
            return Err(RewriteError::StalePlan {
                path: path.to_path_buf(),
                line: last,
                lines: line,
            });
        }
    }

    tmp.as_file()
        .sync_all()
        .map_err(|e| RewriteError::from_io(dir, e))?;
    if let Err(e) = fs::set_permissions(tmp.path(), metadata.permissions()) {
        log::debug!("Could not copy permissions to {}: {}", tmp.path().display(), e);
    }
    tmp.persist(&target).map_err(|e| RewriteError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    log::debug!("Rewrote {}: removed {} of {} lines", path.display(), removed, line);
    Ok(FileRewriteResult {
        key: key.to_string(),
        path: path.to_path_buf(),
        removed,
        kept: line - removed,
        bytes_before,
        bytes_after,
    })
}

/// Apply a resolution to the files under `input_dir`.
///
/// Files are rewritten in parallel; each file is independent, so a failure
/// is recorded and the rest continue. The shutdown flag is checked before
/// each file, never in the middle of one.
///
/// `snapshots` maps file keys to their detection-time state; a file with no
/// snapshot is rewritten without verification.
pub fn execute(
    input_dir: &Path,
    resolution: &Resolution,
    snapshots: &BTreeMap<String, FileSnapshot>,
    config: &RewriteConfig,
) -> BatchRewriteResult {
    let plan: Vec<(&String, &BTreeSet<u64>)> = resolution.removal_plan().iter().collect();
    let total = plan.len();

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start(phase::REWRITING, total);
    }
    log::info!(
        "Rewriting {} file(s) to remove {} line(s)",
        total,
        resolution.total_removed()
    );

    enum Outcome {
        Done(FileRewriteResult),
        Failed(String, String),
        Skipped(String),
    }

    let done = AtomicUsize::new(0);
    let outcomes: Vec<Outcome> = run_with_io_threads(config.io_threads, || {
        plan.par_iter()
            .map(|(key, lines)| {
                if config.is_shutdown_requested() {
                    return Outcome::Skipped((*key).clone());
                }

                let path = key_to_path(input_dir, key);
                let expected = if config.verify_snapshots {
                    snapshots.get(*key)
                } else {
                    None
                };
                let outcome = match rewrite_file(&path, key, lines, expected) {
                    Ok(result) => Outcome::Done(result),
                    Err(e) => {
                        log::warn!("Failed to rewrite {}: {}", key, e);
                        Outcome::Failed((*key).clone(), e.to_string())
                    }
                };

                if let Some(ref callback) = config.progress_callback {
                    callback.on_progress(done.fetch_add(1, Ordering::SeqCst) + 1, key);
                }
                outcome
            })
            .collect()
    });

    let mut result = BatchRewriteResult::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Done(r) => result.rewritten.push(r),
            Outcome::Failed(key, message) => result.failures.push((key, message)),
            Outcome::Skipped(key) => result.skipped.push(key),
        }
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end(phase::REWRITING);
    }
    if result.interrupted() {
        log::info!("Rewrite interrupted by shutdown signal");
    }
    log::info!("{}", result.summary());
    result
}
