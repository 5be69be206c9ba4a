//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. The TOML config file (platform config dir, or `--config`)
//! 3. `JSONDUPE_*` environment variables (`__` separates nested keys)
//! 4. Command-line flags, applied by the caller on the extracted value
//!
//! ```toml
//! text_field = "text"
//! file_pattern = "*_full.jsonl"
//! sample_size = 5000
//! similarity_threshold = 0.9
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::finder::DEFAULT_BATCH_SIZE;
use crate::duplicates::{FinderConfig, SimilarityAlgorithm, DEFAULT_SAMPLE_SIZE, DEFAULT_THRESHOLD};
use crate::scanner::{EmptyTextPolicy, ExtractConfig, TextNormalization, WalkerConfig};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "JSONDUPE_";

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A provider failed to parse or a value had the wrong type.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value was well-formed but out of range.
    #[error("Invalid configuration value for '{key}': {message}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// Serializing the effective configuration failed.
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON field holding the comparable text.
    pub text_field: String,
    /// Glob selecting input files.
    pub file_pattern: String,
    /// Descend into subdirectories of the input directory.
    pub recursive: bool,
    /// Skip hidden files and directories.
    pub skip_hidden: bool,
    /// Follow symbolic links during discovery.
    pub follow_symlinks: bool,
    /// Extra exclude globs.
    pub ignore_patterns: Vec<String>,
    /// Normalization applied before fingerprinting.
    pub normalization: TextNormalization,
    /// Handling of records whose text is empty.
    pub empty_text: EmptyTextPolicy,
    /// Reservoir capacity for near-duplicate detection.
    pub sample_size: usize,
    /// Similarity at or above which two sampled records are near duplicates.
    pub similarity_threshold: f64,
    /// Similarity measure.
    pub similarity: SimilarityAlgorithm,
    /// Fixed sampler seed for reproducible runs.
    pub seed: Option<u64>,
    /// Worker threads for ingestion and rewriting.
    pub io_threads: usize,
    /// Rows per index transaction.
    pub batch_size: usize,
    /// Fingerprint index location, relative to the input directory when not absolute.
    pub index_file: PathBuf,
    /// Report location, relative to the input directory when not absolute.
    pub report_file: PathBuf,
    /// Abort on the first unreadable input file.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        let walker = WalkerConfig::default();
        Self {
            text_field: ExtractConfig::default().text_field,
            file_pattern: walker.file_pattern,
            recursive: walker.recursive,
            skip_hidden: walker.skip_hidden,
            follow_symlinks: walker.follow_symlinks,
            ignore_patterns: Vec::new(),
            normalization: TextNormalization::default(),
            empty_text: EmptyTextPolicy::default(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            similarity_threshold: DEFAULT_THRESHOLD,
            similarity: SimilarityAlgorithm::default(),
            seed: None,
            io_threads: 4,
            batch_size: DEFAULT_BATCH_SIZE,
            index_file: PathBuf::from("jsondupe.db"),
            report_file: PathBuf::from("dedup_report.json"),
            strict: false,
        }
    }
}

impl Config {
    /// Build the provider stack for an optional explicit config file.
    ///
    /// Without an explicit path the platform config file is used if it
    /// exists; a missing file contributes nothing.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path.map(Path::to_path_buf).or_else(Self::config_path) {
            Some(file) => {
                log::debug!("Reading configuration from {}", file.display());
                figment = figment.merge(Toml::file(file));
            }
            None => log::debug!("No configuration directory available"),
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate the layered configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a provider fails or a value is out of range.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(ConfigError::Invalid {
                    key: "config",
                    message: format!("file not found: {}", p.display()),
                });
            }
        }
        let config: Config = Self::figment(path).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Default platform-specific configuration file.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "jsondupe", "jsondupe")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.text_field.is_empty() {
            return Err(ConfigError::Invalid {
                key: "text_field",
                message: "must not be empty".to_string(),
            });
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "similarity_threshold",
                message: format!("{} is not in (0, 1]", self.similarity_threshold),
            });
        }
        if self.io_threads == 0 {
            return Err(ConfigError::Invalid {
                key: "io_threads",
                message: "must be at least 1".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Walker settings derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            file_pattern: self.file_pattern.clone(),
            recursive: self.recursive,
            follow_symlinks: self.follow_symlinks,
            skip_hidden: self.skip_hidden,
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }

    /// Extraction settings derived from this configuration.
    #[must_use]
    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig::default().with_text_field(self.text_field.clone())
    }

    /// Finder settings derived from this configuration.
    ///
    /// Runtime-only pieces (shutdown flag, progress) are left for the caller.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::default()
            .with_io_threads(self.io_threads)
            .with_strict(self.strict)
            .with_batch_size(self.batch_size)
            .with_walker_config(self.walker_config())
            .with_extract_config(self.extract_config())
            .with_normalization(self.normalization)
            .with_empty_text(self.empty_text)
            .with_sample_size(self.sample_size)
            .with_threshold(self.similarity_threshold)
            .with_similarity(self.similarity)
            .with_seed(self.seed)
    }

    /// Resolve a configured path against the input directory.
    #[must_use]
    pub fn resolve_path(input_dir: &Path, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            input_dir.join(configured)
        }
    }
}
