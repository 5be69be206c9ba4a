//! Input discovery using jwalk for parallel traversal.
//!
//! # Overview
//!
//! The [`Walker`] finds the JSONL files to deduplicate under an input
//! directory. Files are selected by a glob (`*.jsonl` by default) through
//! the `ignore` crate's override matcher, so the usual gitignore-style
//! syntax applies, and extra patterns can exclude files.
//!
//! [`Walker::discover`] returns the files sorted by file key, which is the
//! order every later pass relies on.
//!
//! # Example
//!
//! ```no_run
//! use jsondupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig::default().with_file_pattern("*_full.jsonl");
//! let walker = Walker::new(Path::new("/data/genes"), config);
//! let (files, errors) = walker.discover();
//! println!("{} files, {} errors", files.len(), errors.len());
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::overrides::{Override, OverrideBuilder};
use ignore::Match;
use jwalk::WalkDir;

use super::path_utils::{file_key, lookalike_keys};
use super::{InputFile, ScanError, WalkerConfig};

/// Directory walker for input file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given input directory.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Build the selection matcher: the file pattern whitelists, the ignore
    /// patterns exclude. Later patterns win, so excludes override the glob.
    fn build_matcher(&self) -> Result<Override, ScanError> {
        let mut builder = OverrideBuilder::new(&self.root);

        builder
            .add(&self.config.file_pattern)
            .map_err(|e| ScanError::InvalidPattern {
                pattern: self.config.file_pattern.clone(),
                message: e.to_string(),
            })?;

        for pattern in &self.config.ignore_patterns {
            let negated = format!("!{pattern}");
            if let Err(e) = builder.add(&negated) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        builder.build().map_err(|e| ScanError::InvalidPattern {
            pattern: self.config.file_pattern.clone(),
            message: e.to_string(),
        })
    }

    /// Walk the directory tree, yielding selected input files.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration. Output order follows jwalk's sorted traversal; use
    /// [`Walker::discover`] for key order.
    pub fn walk(&self) -> Box<dyn Iterator<Item = Result<InputFile, ScanError>> + '_> {
        if !self.root.exists() {
            return Box::new(std::iter::once(Err(ScanError::NotFound(self.root.clone()))));
        }
        if !self.root.is_dir() {
            return Box::new(std::iter::once(Err(ScanError::NotADirectory(
                self.root.clone(),
            ))));
        }

        let matcher = match self.build_matcher() {
            Ok(m) => m,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        let max_depth = if self.config.recursive { usize::MAX } else { 1 };

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .max_depth(max_depth)
            .process_read_dir(|_depth, _path, _read_dir_state, children| {
                // Sort children for deterministic output
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        Box::new(walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    let file_type = entry.file_type();

                    if path == self.root || file_type.is_dir() {
                        return None;
                    }

                    if file_type.is_symlink() && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                    if !matches!(matcher.matched(relative, false), Match::Whitelist(_)) {
                        log::trace!("Not selected: {}", path.display());
                        return None;
                    }

                    let metadata = match std::fs::metadata(&path) {
                        Ok(m) => m,
                        Err(e) => {
                            log::warn!("Cannot stat {}: {}", path.display(), e);
                            return Some(Err(ScanError::from_io(&path, e)));
                        }
                    };
                    if !metadata.is_file() {
                        return None;
                    }

                    let Some(key) = file_key(&self.root, &path) else {
                        log::warn!("Skipping file with unsupported name: {}", path.display());
                        return Some(Err(ScanError::InvalidFileName(path)));
                    };

                    Some(Ok(InputFile {
                        key,
                        size: metadata.len(),
                        modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                        path,
                    }))
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            }
        }))
    }

    /// Walk the tree and return selected files sorted by file key, plus
    /// every error encountered along the way.
    #[must_use]
    pub fn discover(&self) -> (Vec<InputFile>, Vec<ScanError>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for result in self.walk() {
            match result {
                Ok(file) => files.push(file),
                Err(e) => errors.push(e),
            }
        }
        files.sort_by(|a, b| a.key.cmp(&b.key));
        for (first, other) in lookalike_keys(files.iter().map(|f| f.key.as_str())) {
            log::warn!(
                "Input files '{}' and '{}' differ only in Unicode normalization; they are treated as separate files",
                first,
                other
            );
        }
        log::debug!(
            "Discovered {} input files under {} ({} errors)",
            files.len(),
            self.root.display(),
            errors.len()
        );
        (files, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    /// Create a corpus with top-level and nested JSONL files plus noise.
    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        for name in ["b.jsonl", "a.jsonl", "notes.txt"] {
            let mut f = File::create(dir.path().join(name)).unwrap();
            writeln!(f, "{{\"text\":\"{name}\"}}").unwrap();
        }

        let subdir = dir.path().join("shard");
        fs::create_dir(&subdir).unwrap();
        let mut f = File::create(subdir.join("c.jsonl")).unwrap();
        writeln!(f, "{{\"text\":\"nested\"}}").unwrap();

        let mut f = File::create(dir.path().join(".hidden.jsonl")).unwrap();
        writeln!(f, "{{\"text\":\"hidden\"}}").unwrap();

        dir
    }

    fn keys(files: &[InputFile]) -> Vec<&str> {
        files.iter().map(|f| f.key.as_str()).collect()
    }

    #[test]
    fn test_discover_top_level_sorted() {
        let dir = create_test_dir();
        let (files, errors) = Walker::new(dir.path(), WalkerConfig::default()).discover();
        assert!(errors.is_empty());
        assert_eq!(keys(&files), vec!["a.jsonl", "b.jsonl"]);
        assert!(files.iter().all(|f| f.size > 0 && f.path.exists()));
    }

    #[test]
    fn test_discover_recursive() {
        let dir = create_test_dir();
        let config = WalkerConfig::default().with_recursive(true);
        let (files, _) = Walker::new(dir.path(), config).discover();
        assert_eq!(keys(&files), vec!["a.jsonl", "b.jsonl", "shard/c.jsonl"]);
    }

    #[test]
    fn test_hidden_files_included_when_requested() {
        let dir = create_test_dir();
        let config = WalkerConfig {
            skip_hidden: false,
            ..WalkerConfig::default()
        };
        let (files, _) = Walker::new(dir.path(), config).discover();
        assert!(keys(&files).contains(&".hidden.jsonl"));
    }

    #[test]
    fn test_custom_pattern_and_excludes() {
        let dir = create_test_dir();
        File::create(dir.path().join("x_full.jsonl")).unwrap();
        File::create(dir.path().join("y_full.jsonl")).unwrap();

        let config = WalkerConfig::default()
            .with_file_pattern("*_full.jsonl")
            .with_ignore_patterns(vec!["y_*".to_string()]);
        let (files, _) = Walker::new(dir.path(), config).discover();
        assert_eq!(keys(&files), vec!["x_full.jsonl"]);
    }

    #[test]
    fn test_lookalike_names_stay_separate() {
        let dir = TempDir::new().unwrap();
        let nfc = dir.path().join("caf\u{e9}.jsonl");
        let nfd = dir.path().join("cafe\u{0301}.jsonl");
        fs::write(&nfc, "{\"text\":\"nfc\"}\n").unwrap();
        fs::write(&nfd, "{\"text\":\"nfd\"}\n").unwrap();

        let (files, errors) = Walker::new(dir.path(), WalkerConfig::default()).discover();
        assert!(errors.is_empty());
        // Normalization-insensitive filesystems store a single file.
        for file in &files {
            assert_eq!(dir.path().join(&file.key), file.path);
        }
        if files.len() == 2 {
            assert_ne!(files[0].key, files[1].key);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_name_is_reported() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let bad = dir.path().join(OsStr::from_bytes(b"bad\xff.jsonl"));
        fs::write(&bad, "{\"text\":\"x\"}\n").unwrap();

        let (files, errors) = Walker::new(dir.path(), WalkerConfig::default()).discover();
        assert!(files.is_empty());
        assert!(matches!(errors.as_slice(), [ScanError::InvalidFileName(p)] if *p == bad));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let (files, errors) = Walker::new(&missing, WalkerConfig::default()).discover();
        assert!(files.is_empty());
        assert!(matches!(errors.as_slice(), [ScanError::NotFound(_)]));
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = create_test_dir();
        let file = dir.path().join("a.jsonl");
        let (_, errors) = Walker::new(&file, WalkerConfig::default()).discover();
        assert!(matches!(errors.as_slice(), [ScanError::NotADirectory(_)]));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let dir = create_test_dir();
        let config = WalkerConfig::default().with_file_pattern("[unclosed");
        let (_, errors) = Walker::new(dir.path(), config).discover();
        assert!(matches!(
            errors.as_slice(),
            [ScanError::InvalidPattern { .. }]
        ));
    }

    #[test]
    fn test_shutdown_stops_walk() {
        let dir = create_test_dir();
        let flag = Arc::new(AtomicBool::new(true));
        let walker = Walker::new(dir.path(), WalkerConfig::default()).with_shutdown_flag(flag);
        let (files, _) = walker.discover();
        assert!(files.is_empty());
    }
}
