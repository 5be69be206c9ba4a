//! Command-line interface definitions for jsondupe.
//!
//! Global options control verbosity, color and error formatting; the
//! subcommands run detection, apply a saved report, or print the effective
//! configuration.
//!
//! # Example
//!
//! ```bash
//! # Detect duplicates and write dedup_report.json into the input directory
//! jsondupe detect ./corpus
//!
//! # Detect and remove in one go, without prompting
//! jsondupe detect ./corpus --delete --yes
//!
//! # Apply a previously written report
//! jsondupe delete ./corpus --report ./corpus/dedup_report.json
//!
//! # Verbose mode for debugging
//! jsondupe -v detect ./corpus --sample-size 5000 --threshold 0.9
//! ```
//!
//! Detection flags left unset fall back to the layered configuration
//! (see [`crate::config`]).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::duplicates::SimilarityAlgorithm;
use crate::scanner::{EmptyTextPolicy, TextNormalization};

/// Exact and near-duplicate record removal for JSONL corpora.
///
/// jsondupe fingerprints the text field of every record into a disk-backed
/// index, finds near duplicates in a random sample, and rewrites the input
/// files keeping the first record of each duplicate group.
#[derive(Debug, Parser)]
#[command(name = "jsondupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find exact and near-duplicate records and write a report
    Detect(DetectArgs),
    /// Remove the duplicates recorded in a report (or in an index)
    Delete(DeleteArgs),
    /// Print the effective configuration as TOML
    Config,
}

/// Arguments for the detect subcommand.
#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Directory holding the JSONL files
    #[arg(value_name = "INPUT_DIR")]
    pub input: PathBuf,

    /// Fingerprint index location (default: <INPUT_DIR>/jsondupe.db)
    #[arg(long, value_name = "PATH")]
    pub index: Option<PathBuf>,

    /// Report location (default: <INPUT_DIR>/dedup_report.json)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Number of records sampled for near-duplicate detection
    #[arg(short = 's', long, value_name = "N")]
    pub sample_size: Option<usize>,

    /// Similarity at or above which records are near duplicates, in (0, 1]
    #[arg(long, value_name = "SCORE", value_parser = parse_threshold)]
    pub threshold: Option<f64>,

    /// Similarity measure for near duplicates
    #[arg(long, value_enum)]
    pub similarity: Option<SimilarityAlgorithm>,

    /// JSON field holding the text to compare
    #[arg(long, value_name = "FIELD")]
    pub text_field: Option<String>,

    /// Glob selecting input files
    #[arg(long, value_name = "GLOB")]
    pub pattern: Option<String>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Glob patterns to exclude (can be specified multiple times)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Normalization applied before fingerprinting
    #[arg(long, value_enum)]
    pub normalization: Option<TextNormalization>,

    /// How records with empty text are handled
    #[arg(long, value_enum)]
    pub empty_text: Option<EmptyTextPolicy>,

    /// Number of worker threads for reading and rewriting files
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Seed for the sampler (runs are reproducible with --io-threads 1)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Rebuild the fingerprint index from scratch
    #[arg(long)]
    pub fresh: bool,

    /// Abort on the first unreadable file instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Remove the detected duplicates after writing the report
    #[arg(long)]
    pub delete: bool,

    /// Skip the confirmation prompt for --delete
    #[arg(short = 'y', long, requires = "delete")]
    pub yes: bool,
}

impl DetectArgs {
    /// Overlay the flags that were given on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(n) = self.sample_size {
            config.sample_size = n;
        }
        if let Some(t) = self.threshold {
            config.similarity_threshold = t;
        }
        if let Some(s) = self.similarity {
            config.similarity = s;
        }
        if let Some(field) = &self.text_field {
            config.text_field.clone_from(field);
        }
        if let Some(pattern) = &self.pattern {
            config.file_pattern.clone_from(pattern);
        }
        if self.recursive {
            config.recursive = true;
        }
        config
            .ignore_patterns
            .extend(self.ignore_patterns.iter().cloned());
        if let Some(n) = self.normalization {
            config.normalization = n;
        }
        if let Some(p) = self.empty_text {
            config.empty_text = p;
        }
        if let Some(n) = self.io_threads {
            config.io_threads = n;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.strict {
            config.strict = true;
        }
    }
}

/// Arguments for the delete subcommand.
#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Directory holding the JSONL files
    #[arg(value_name = "INPUT_DIR")]
    pub input: PathBuf,

    /// Report written by `detect` (default: <INPUT_DIR>/dedup_report.json)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Remove exact duplicates straight from a fingerprint index instead of a report
    #[arg(long, value_name = "PATH", conflicts_with = "report")]
    pub index: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Number of worker threads for rewriting files
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,
}

/// Parse a similarity threshold in (0, 1].
///
/// # Examples
///
/// ```
/// use jsondupe::cli::parse_threshold;
///
/// assert_eq!(parse_threshold("0.95").unwrap(), 0.95);
/// assert!(parse_threshold("0").is_err());
/// assert!(parse_threshold("1.5").is_err());
/// ```
///
/// # Errors
///
/// Returns an error if the value is not a number or is out of range.
pub fn parse_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: '{}'", s.trim()))?;
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(format!("Threshold must be in (0, 1], got {value}"))
    }
}
