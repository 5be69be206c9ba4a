//! Detect pass orchestration.
//!
//! [`DuplicateFinder::detect`] runs the whole detection pipeline over an
//! input directory:
//!
//! 1. **Discover** - walk the directory and select input files
//! 2. **Ingest** - extract records, fingerprint them, append them to the
//!    [`FingerprintIndex`] and offer them to the reservoir sampler
//! 3. **Cluster** - score every pair in the sample and build near groups
//! 4. **Resolve** - stream exact groups out of the index and merge them with
//!    the near groups into one decision per record
//!
//! Files whose size and mtime match the snapshot stored in the index are not
//! re-indexed, but they are still read so the sampler sees every record.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use super::cluster::{cluster_near_duplicates, ClusterStats};
use super::resolver::{DuplicateResolver, Resolution};
use super::sampler::{ReservoirSampler, SampleEntry, DEFAULT_SAMPLE_SIZE};
use super::similarity::{SimilarityAlgorithm, DEFAULT_THRESHOLD};
use crate::index::{FingerprintIndex, IndexError, IndexSettings};
use crate::pool::run_with_io_threads;
use crate::progress::{phase, ProgressCallback};
use crate::scanner::{
    EmptyTextPolicy, ExtractConfig, ExtractStats, FileSnapshot, Fingerprint, Hasher, InputFile,
    LocationRef, RecordExtractor, ScanError, TextNormalization, Walker, WalkerConfig,
};

/// Default number of rows written to the index per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Number of I/O threads for parallel ingestion.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
    /// Fail on the first unreadable file instead of skipping it.
    pub strict: bool,
    /// Rows per index transaction.
    pub batch_size: usize,
    /// Clear the index before ingesting instead of reusing it.
    pub fresh: bool,
    /// Walker configuration for input discovery.
    pub walker_config: WalkerConfig,
    /// Record extraction settings.
    pub extract_config: ExtractConfig,
    /// Normalization applied before fingerprinting.
    pub normalization: TextNormalization,
    /// Handling of records with empty text.
    pub empty_text: EmptyTextPolicy,
    /// Reservoir capacity for near-duplicate detection.
    pub sample_size: usize,
    /// Similarity score at or above which sampled records are linked.
    pub threshold: f64,
    /// Similarity measure.
    pub similarity: SimilarityAlgorithm,
    /// Seed for the sampler's generator.
    pub seed: Option<u64>,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("io_threads", &self.io_threads)
            .field("strict", &self.strict)
            .field("batch_size", &self.batch_size)
            .field("fresh", &self.fresh)
            .field("walker_config", &self.walker_config)
            .field("extract_config", &self.extract_config)
            .field("normalization", &self.normalization)
            .field("empty_text", &self.empty_text)
            .field("sample_size", &self.sample_size)
            .field("threshold", &self.threshold)
            .field("similarity", &self.similarity)
            .field("seed", &self.seed)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            strict: false,
            batch_size: DEFAULT_BATCH_SIZE,
            fresh: false,
            walker_config: WalkerConfig::default(),
            extract_config: ExtractConfig::default(),
            normalization: TextNormalization::default(),
            empty_text: EmptyTextPolicy::default(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            threshold: DEFAULT_THRESHOLD,
            similarity: SimilarityAlgorithm::default(),
            seed: None,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Set the I/O thread count (at least 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set fail-fast on unreadable files.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set rows per index transaction (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Ignore and clear any previous index contents.
    #[must_use]
    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the extraction configuration.
    #[must_use]
    pub fn with_extract_config(mut self, config: ExtractConfig) -> Self {
        self.extract_config = config;
        self
    }

    /// Set the text normalization.
    #[must_use]
    pub fn with_normalization(mut self, normalization: TextNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Set the empty-text policy.
    #[must_use]
    pub fn with_empty_text(mut self, policy: EmptyTextPolicy) -> Self {
        self.empty_text = policy;
        self
    }

    /// Set the reservoir capacity.
    #[must_use]
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Set the similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the similarity measure.
    #[must_use]
    pub fn with_similarity(mut self, algorithm: SimilarityAlgorithm) -> Self {
        self.similarity = algorithm;
        self
    }

    /// Seed the sampler for reproducible runs.
    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
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

    /// Settings the index must have been built with to be reusable.
    #[must_use]
    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            text_field: self.extract_config.text_field.clone(),
            normalization: self.normalization,
            empty_text: self.empty_text,
        }
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Statistics from a detect pass.
#[derive(Debug, Default)]
pub struct DetectSummary {
    /// Input files selected by the walker
    pub files_scanned: usize,
    /// Files whose index rows were reused from an earlier run
    pub files_reused: usize,
    /// Files skipped because they could not be read
    pub files_failed: usize,
    /// Files dropped from the index because they no longer exist
    pub files_pruned: usize,
    /// Extraction counters summed over all files
    pub extract: ExtractStats,
    /// Empty records kept out of the index by the skip policy
    pub empty_skipped: u64,
    /// Rows in the index after ingestion
    pub indexed_records: u64,
    /// Records offered to the sampler
    pub sampled_from: u64,
    /// Exact-duplicate groups streamed from the index
    pub exact_groups: usize,
    /// Near-duplicate clustering counters
    pub cluster: ClusterStats,
    /// Groups after merging
    pub resolved_groups: usize,
    /// Records marked for removal
    pub records_to_remove: u64,
    /// Files losing at least one record
    pub files_affected: usize,
    /// Non-fatal errors met while scanning
    pub scan_errors: Vec<ScanError>,
    /// Wall-clock duration
    pub duration: Duration,
}

impl DetectSummary {
    /// Whether any file could not be read.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.scan_errors.is_empty()
    }

    /// Whether anything is to be removed.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        self.records_to_remove > 0
    }
}

/// Result of a detect pass.
#[derive(Debug)]
pub struct Detection {
    /// Final keep/remove decisions
    pub resolution: Resolution,
    /// Snapshots of the files that lose records, taken at discovery
    pub snapshots: BTreeMap<String, FileSnapshot>,
    /// Run statistics
    pub summary: DetectSummary,
}

/// Errors that can occur during detection.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The run was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Detection interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The fingerprint index failed. Always fatal.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// A scan error that is fatal in strict mode.
    #[error(transparent)]
    ScanError(#[from] ScanError),
}

/// Per-file ingestion result.
#[derive(Debug)]
struct FileOutcome {
    key: String,
    snapshot: FileSnapshot,
    stats: ExtractStats,
    empty_skipped: u64,
    reused: bool,
    skipped: bool,
    error: Option<ScanError>,
}

fn lock_sampler(sampler: &Mutex<ReservoirSampler>) -> MutexGuard<'_, ReservoirSampler> {
    match sampler.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Duplicate finder that orchestrates the detect pipeline.
///
/// # Example
///
/// ```no_run
/// use jsondupe::duplicates::{DuplicateFinder, FinderConfig};
/// use jsondupe::index::FingerprintIndex;
/// use std::path::Path;
///
/// let config = FinderConfig::default().with_seed(Some(42));
/// let index = FingerprintIndex::open(Path::new("data/jsondupe.db"), &config.index_settings())?;
/// let finder = DuplicateFinder::new(config);
///
/// let detection = finder.detect(Path::new("data"), &index)?;
/// println!("{} records to remove", detection.summary.records_to_remove);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Hasher,
    extractor: RecordExtractor,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self {
            hasher: Hasher::new(config.normalization),
            extractor: RecordExtractor::new(config.extract_config.clone()),
            config,
        }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Run the detect pass over `input`, using `index` as fingerprint
    /// storage.
    ///
    /// The index must have been opened with [`FinderConfig::index_settings`];
    /// the caller drops it once this returns, before any rewrite.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - The path does not exist or is not a directory
    /// - The configuration is invalid
    /// - The index fails
    /// - A file cannot be read in strict mode
    /// - The run is interrupted by a shutdown signal
    pub fn detect(&self, input: &Path, index: &FingerprintIndex) -> Result<Detection, FinderError> {
        let start_time = Instant::now();
        let mut summary = DetectSummary::default();

        if !input.exists() {
            return Err(FinderError::PathNotFound(input.to_path_buf()));
        }
        if !input.is_dir() {
            return Err(FinderError::NotADirectory(input.to_path_buf()));
        }
        if !(self.config.threshold > 0.0 && self.config.threshold <= 1.0) {
            return Err(FinderError::InvalidConfig(format!(
                "similarity threshold must be in (0, 1], got {}",
                self.config.threshold
            )));
        }
        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        log::info!("Starting duplicate detection in {}", input.display());

        // Phase 1: discovery
        let files = self.discover(input, &mut summary)?;
        summary.files_scanned = files.len();

        if self.config.fresh {
            log::info!("Clearing fingerprint index {}", index.path().display());
            index.clear()?;
        }
        let present: HashSet<String> = files.iter().map(|f| f.key.clone()).collect();
        summary.files_pruned = index.prune_missing(&present)?;

        // Phase 2: ingestion
        let sampler = Mutex::new(ReservoirSampler::new(
            self.config.sample_size,
            self.config.seed,
        ));
        let outcomes = self.ingest(&files, index, &sampler)?;

        let mut failed: HashSet<String> = HashSet::new();
        let mut snapshots: BTreeMap<String, FileSnapshot> = BTreeMap::new();
        let mut interrupted = false;
        for outcome in outcomes {
            if outcome.skipped {
                interrupted = true;
                continue;
            }
            summary.extract.merge(&outcome.stats);
            summary.empty_skipped += outcome.empty_skipped;
            if let Some(error) = outcome.error {
                summary.files_failed += 1;
                summary.scan_errors.push(error);
                failed.insert(outcome.key);
                continue;
            }
            if outcome.reused {
                summary.files_reused += 1;
            }
            snapshots.insert(outcome.key, outcome.snapshot);
        }

        if interrupted || self.config.is_shutdown_requested() {
            log::info!("Phase 2: Interrupted by shutdown signal");
            return Err(FinderError::Interrupted);
        }

        index.finalize()?;
        summary.indexed_records = index.record_count()?;

        let sampler = sampler
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        summary.sampled_from = sampler.seen();

        log::info!(
            "Phase 2 complete: {} records from {} files ({} reused, {} failed), {} malformed lines",
            summary.extract.records,
            summary.files_scanned,
            summary.files_reused,
            summary.files_failed,
            summary.extract.parse_errors
        );

        // Phase 3: near-duplicate clustering
        let mut entries = sampler.into_entries();
        if !failed.is_empty() {
            entries.retain(|e| !failed.contains(&e.location.file));
        }
        let near_groups = self.cluster(entries, &mut summary)?;

        // Phase 4: resolution
        let resolution = self.resolve(index, near_groups, &mut summary)?;

        snapshots.retain(|key, _| resolution.removals_for(key).is_some());
        summary.resolved_groups = resolution.groups().len();
        summary.records_to_remove = resolution.total_removed();
        summary.files_affected = snapshots.len();
        summary.duration = start_time.elapsed();

        log::info!(
            "Detection complete: {} exact groups, {} near clusters, {} records to remove from {} files in {:.2}s",
            summary.exact_groups,
            summary.cluster.clusters,
            summary.records_to_remove,
            summary.files_affected,
            summary.duration.as_secs_f64()
        );

        Ok(Detection {
            resolution,
            snapshots,
            summary,
        })
    }

    fn discover(
        &self,
        input: &Path,
        summary: &mut DetectSummary,
    ) -> Result<Vec<InputFile>, FinderError> {
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(phase::DISCOVERING, 0);
        }

        let mut walker = Walker::new(input, self.config.walker_config.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }
        let (files, errors) = walker.discover();

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(phase::DISCOVERING);
        }

        for error in errors {
            match error {
                ScanError::InvalidPattern { .. } => return Err(error.into()),
                _ if self.config.strict => return Err(error.into()),
                _ => {
                    log::warn!("Skipping unreadable entry: {}", error);
                    summary.files_failed += 1;
                    summary.scan_errors.push(error);
                }
            }
        }

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        log::info!("Phase 1 complete: {} input files", files.len());
        Ok(files)
    }

    fn ingest(
        &self,
        files: &[InputFile],
        index: &FingerprintIndex,
        sampler: &Mutex<ReservoirSampler>,
    ) -> Result<Vec<FileOutcome>, FinderError> {
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(phase::INGESTING, files.len());
        }
        log::info!("Phase 2: Ingesting {} files", files.len());

        let done = AtomicUsize::new(0);
        let result = run_with_io_threads(self.config.io_threads, || {
            files
                .par_iter()
                .map(|file| {
                    if self.config.is_shutdown_requested() {
                        log::debug!("Phase 2: Shutdown requested, skipping {}", file.key);
                        return Ok(FileOutcome {
                            key: file.key.clone(),
                            snapshot: file.snapshot(),
                            stats: ExtractStats::default(),
                            empty_skipped: 0,
                            reused: false,
                            skipped: true,
                            error: None,
                        });
                    }

                    let outcome = self.ingest_file(file, index, sampler)?;

                    if let Some(ref callback) = self.config.progress_callback {
                        callback.on_progress(done.fetch_add(1, Ordering::SeqCst) + 1, &file.key);
                        callback.on_item_completed(outcome.stats.records);
                    }
                    Ok(outcome)
                })
                .collect::<Result<Vec<_>, FinderError>>()
        });

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(phase::INGESTING);
        }
        result
    }

    fn ingest_file(
        &self,
        file: &InputFile,
        index: &FingerprintIndex,
        sampler: &Mutex<ReservoirSampler>,
    ) -> Result<FileOutcome, FinderError> {
        let discovered = file.snapshot();
        let reused = !self.config.fresh
            && index
                .snapshot(&file.key)?
                .is_some_and(|stored| stored.same_contents(&discovered));

        let mut outcome = FileOutcome {
            key: file.key.clone(),
            snapshot: discovered,
            stats: ExtractStats::default(),
            empty_skipped: 0,
            reused,
            skipped: false,
            error: None,
        };

        let mut records = match self.extractor.records(&file.path, &file.key) {
            Ok(records) => records,
            Err(e) => return self.fail_file(index, outcome, e),
        };

        if reused {
            log::trace!("Index rows reused for unchanged file {}", file.key);
        } else {
            index.begin_file(&file.key)?;
        }

        let batch_size = self.config.batch_size;
        let mut rows: Vec<(Fingerprint, LocationRef)> = Vec::with_capacity(batch_size.min(4096));
        let mut texts: Vec<String> = Vec::with_capacity(batch_size.min(4096));
        let mut failure = None;

        for item in records.by_ref() {
            match item {
                Ok(record) => {
                    if record.text.is_empty() && self.config.empty_text == EmptyTextPolicy::Skip {
                        outcome.empty_skipped += 1;
                        continue;
                    }
                    rows.push((self.hasher.fingerprint(&record.text), record.location));
                    texts.push(record.text);
                    if rows.len() >= batch_size {
                        self.flush(index, sampler, &mut rows, &mut texts, reused)?;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        outcome.stats = records.stats();

        if let Some(e) = failure {
            return self.fail_file(index, outcome, e);
        }
        self.flush(index, sampler, &mut rows, &mut texts, reused)?;

        let indexed = outcome.stats.records - outcome.empty_skipped;
        outcome.snapshot = discovered.with_records(indexed);
        if !reused {
            index.finish_file(&file.key, &outcome.snapshot)?;
        }
        log::trace!(
            "Ingested {}: {} records, {} malformed lines",
            file.key,
            outcome.stats.records,
            outcome.stats.parse_errors
        );
        Ok(outcome)
    }

    fn fail_file(
        &self,
        index: &FingerprintIndex,
        mut outcome: FileOutcome,
        error: ScanError,
    ) -> Result<FileOutcome, FinderError> {
        if self.config.strict {
            return Err(error.into());
        }
        log::warn!("Skipping file {}: {}", outcome.key, error);
        index.discard_file(&outcome.key)?;
        outcome.error = Some(error);
        Ok(outcome)
    }

    fn flush(
        &self,
        index: &FingerprintIndex,
        sampler: &Mutex<ReservoirSampler>,
        rows: &mut Vec<(Fingerprint, LocationRef)>,
        texts: &mut Vec<String>,
        reused: bool,
    ) -> Result<(), FinderError> {
        if rows.is_empty() {
            return Ok(());
        }
        if !reused {
            index.insert_batch(rows.as_slice())?;
        }
        let mut sampler = lock_sampler(sampler);
        for ((fingerprint, location), text) in rows.drain(..).zip(texts.drain(..)) {
            sampler.offer(SampleEntry {
                location,
                fingerprint,
                text,
            });
        }
        Ok(())
    }

    fn cluster(
        &self,
        entries: Vec<SampleEntry>,
        summary: &mut DetectSummary,
    ) -> Result<Vec<super::DuplicateGroup>, FinderError> {
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(phase::CLUSTERING, 0);
        }
        log::info!(
            "Phase 3: Comparing {} sampled records ({})",
            entries.len(),
            self.config.similarity
        );

        let similarity = self.config.similarity.build();
        let (groups, stats) = cluster_near_duplicates(
            entries,
            similarity.as_ref(),
            self.config.threshold,
            self.config.shutdown_flag.as_deref(),
        );

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(phase::CLUSTERING);
        }
        if stats.interrupted {
            return Err(FinderError::Interrupted);
        }

        log::info!(
            "Phase 3 complete: {} near-duplicate clusters from {} comparisons",
            stats.clusters,
            stats.comparisons
        );
        summary.cluster = stats;
        Ok(groups)
    }

    fn resolve(
        &self,
        index: &FingerprintIndex,
        near_groups: Vec<super::DuplicateGroup>,
        summary: &mut DetectSummary,
    ) -> Result<Resolution, FinderError> {
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(phase::RESOLVING, 0);
        }
        log::info!("Phase 4: Resolving duplicate groups");

        let mut resolver = DuplicateResolver::new(near_groups);
        index.for_each_group_with_count_above(1, |group| resolver.add_exact(group))?;
        summary.exact_groups = resolver.exact_groups_seen();
        let resolution = resolver.finish();

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(phase::RESOLVING);
        }
        log::info!(
            "Phase 4 complete: {} groups after merging",
            resolution.groups().len()
        );
        Ok(resolution)
    }
}
