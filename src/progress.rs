//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements
//! [`ProgressCallback`] to display progress bars in the terminal while
//! files are ingested, the sample is clustered and files are rewritten.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Phase names reported through [`ProgressCallback`].
pub mod phase {
    /// Walking the input directory
    pub const DISCOVERING: &str = "discovering";
    /// Extracting, fingerprinting, indexing and sampling records
    pub const INGESTING: &str = "ingesting";
    /// Pairwise similarity over the sample
    pub const CLUSTERING: &str = "clustering";
    /// Streaming exact groups and merging decisions
    pub const RESOLVING: &str = "resolving";
    /// Rewriting files without the removed lines
    pub const REWRITING: &str = "rewriting";
}

/// Progress callback for the detect and delete phases.
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (see [`phase`])
    /// * `total` - Total number of items to process, 0 if unknown
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `item` - File key or other label of the item
    fn on_progress(&self, current: usize, item: &str);

    /// Called when an item has been processed, providing its record count.
    fn on_item_completed(&self, _records: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
///
/// One bar (or spinner) is active at a time; phases run one after another.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<(String, ProgressBar)>>,
    quiet: bool,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use jsondupe::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
            quiet,
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<(String, ProgressBar)>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style(unit: &str) -> ProgressStyle {
        let template = format!(
            "[{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} ({{percent}}%) {{msg}} (ETA: {{eta}})"
        );
        ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    fn label(phase: &str) -> &'static str {
        match phase {
            phase::DISCOVERING => "Discovering files",
            phase::INGESTING => "Ingesting",
            phase::CLUSTERING => "Comparing sample",
            phase::RESOLVING => "Resolving groups",
            phase::REWRITING => "Rewriting",
            _ => "Working",
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = if total == 0 {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::spinner_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let unit = if phase == phase::CLUSTERING { "rows" } else { "files" };
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::bar_style(unit));
            pb
        };
        pb.set_message(Self::label(phase));

        if let Some((_, previous)) = self.active().replace((phase.to_string(), pb)) {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, current: usize, item: &str) {
        if self.quiet {
            return;
        }
        if let Some((_, pb)) = self.active().as_ref() {
            pb.set_position(current as u64);
            if !item.is_empty() {
                pb.set_message(truncate_path(item, 30));
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let mut active = self.active();
        if active.as_ref().is_some_and(|(name, _)| name == phase) {
            if let Some((_, pb)) = active.take() {
                pb.finish_with_message(format!("{} complete", Self::label(phase)));
            }
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        if let Some((_, pb)) = self.active().as_ref() {
            pb.set_message(message.to_string());
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_path_unchanged() {
        assert_eq!(truncate_path("a/b.jsonl", 30), "a/b.jsonl");
    }

    #[test]
    fn test_truncate_long_path_keeps_file_name() {
        let path = "very/long/directory/structure/with/many/levels/shard.jsonl";
        assert_eq!(truncate_path(path, 30), ".../shard.jsonl");
    }

    #[test]
    fn test_truncate_long_file_name() {
        let name = "a".repeat(40) + ".jsonl";
        let out = truncate_path(&name, 20);
        assert!(out.starts_with("..."));
        assert_eq!(out.chars().count(), 20);
    }

    #[test]
    fn test_quiet_progress_ignores_events() {
        let progress = Progress::new(true);
        progress.on_phase_start(phase::INGESTING, 10);
        progress.on_progress(1, "a.jsonl");
        progress.on_phase_end(phase::INGESTING);
        assert!(progress.active().is_none());
    }
}
