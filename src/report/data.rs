//! Data structures for detection reports.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duplicates::{
    DetectSummary, Detection, FinderConfig, GroupKind, ResolvedGroup, Resolution,
    SimilarityAlgorithm,
};
use crate::scanner::{EmptyTextPolicy, FileSnapshot, TextNormalization};

/// Current version of the report file format.
pub const REPORT_VERSION: u32 = 1;

/// The result of a detect run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Format version.
    pub version: u32,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Input directory the file keys are relative to.
    pub input_dir: PathBuf,
    /// Fingerprint index used for the run.
    pub index_path: Option<PathBuf>,
    /// Settings used during detection.
    pub settings: ReportSettings,
    /// Run statistics.
    pub summary: ReportSummary,
    /// Detection-time snapshots of the files that lose records.
    pub files: BTreeMap<String, FileSnapshot>,
    /// Exact-duplicate groups, in fingerprint order.
    pub exact: Vec<ResolvedGroup>,
    /// Near-duplicate groups (possibly merged with exact ones), in id order.
    pub near: Vec<ResolvedGroup>,
}

impl Report {
    /// Build a report from a finished detection.
    #[must_use]
    pub fn new(
        input_dir: PathBuf,
        index_path: Option<PathBuf>,
        settings: ReportSettings,
        detection: &Detection,
    ) -> Self {
        let resolution = &detection.resolution;
        Self {
            version: REPORT_VERSION,
            created_at: Utc::now(),
            input_dir,
            index_path,
            settings,
            summary: ReportSummary::from(&detection.summary),
            files: detection.snapshots.clone(),
            exact: resolution.groups_of(GroupKind::Exact).cloned().collect(),
            near: resolution.groups_of(GroupKind::Near).cloned().collect(),
        }
    }

    /// Rebuild the keep/remove decisions recorded in this report.
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        Resolution::from_groups(self.exact.iter().chain(&self.near).cloned().collect())
    }

    /// Number of records the report marks for removal.
    #[must_use]
    pub fn total_removed(&self) -> u64 {
        self.exact
            .iter()
            .chain(&self.near)
            .map(|g| g.remove.len() as u64)
            .sum()
    }
}

/// Settings that shaped the detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    /// JSON field the text was read from.
    pub text_field: String,
    /// Input file glob.
    pub file_pattern: String,
    /// Whether subdirectories were scanned.
    pub recursive: bool,
    /// Normalization applied before fingerprinting.
    pub normalization: TextNormalization,
    /// Handling of empty text.
    pub empty_text: EmptyTextPolicy,
    /// Reservoir capacity.
    pub sample_size: usize,
    /// Similarity threshold.
    pub similarity_threshold: f64,
    /// Similarity measure.
    pub similarity: SimilarityAlgorithm,
    /// Sampler seed, if fixed.
    pub seed: Option<u64>,
}

impl From<&FinderConfig> for ReportSettings {
    fn from(config: &FinderConfig) -> Self {
        Self {
            text_field: config.extract_config.text_field.clone(),
            file_pattern: config.walker_config.file_pattern.clone(),
            recursive: config.walker_config.recursive,
            normalization: config.normalization,
            empty_text: config.empty_text,
            sample_size: config.sample_size,
            similarity_threshold: config.threshold,
            similarity: config.similarity,
            seed: config.seed,
        }
    }
}

/// Statistics recorded with a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Input files selected.
    pub files_scanned: usize,
    /// Files whose index rows were reused.
    pub files_reused: usize,
    /// Files that could not be read.
    pub files_failed: usize,
    /// Physical lines read.
    pub lines: u64,
    /// Records extracted.
    pub records: u64,
    /// Blank lines.
    pub blank_lines: u64,
    /// Malformed lines skipped.
    pub parse_errors: u64,
    /// Records with empty text.
    pub empty_texts: u64,
    /// Rows in the fingerprint index.
    pub indexed_records: u64,
    /// Records in the near-duplicate sample.
    pub sample_size: usize,
    /// Pairs scored by the similarity measure.
    pub comparisons: u64,
    /// Exact-duplicate groups found in the index.
    pub exact_groups: usize,
    /// Near-duplicate clusters found in the sample.
    pub near_clusters: usize,
    /// Records marked for removal.
    pub records_to_remove: u64,
    /// Files losing at least one record.
    pub files_affected: usize,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Non-fatal errors, as messages.
    pub errors: Vec<String>,
}

impl From<&DetectSummary> for ReportSummary {
    fn from(summary: &DetectSummary) -> Self {
        Self {
            files_scanned: summary.files_scanned,
            files_reused: summary.files_reused,
            files_failed: summary.files_failed,
            lines: summary.extract.lines,
            records: summary.extract.records,
            blank_lines: summary.extract.blank_lines,
            parse_errors: summary.extract.parse_errors,
            empty_texts: summary.extract.empty_texts,
            indexed_records: summary.indexed_records,
            sample_size: summary.cluster.sample_size,
            comparisons: summary.cluster.comparisons,
            exact_groups: summary.exact_groups,
            near_clusters: summary.cluster.clusters,
            records_to_remove: summary.records_to_remove,
            files_affected: summary.files_affected,
            duration_ms: u64::try_from(summary.duration.as_millis()).unwrap_or(u64::MAX),
            errors: summary.scan_errors.iter().map(ToString::to_string).collect(),
        }
    }
}
