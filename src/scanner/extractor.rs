//! Lazy record extraction from line-delimited JSON files.
//!
//! # Overview
//!
//! [`RecordExtractor::records`] opens a file and returns a [`Records`]
//! iterator that yields one [`Record`] per non-blank line. The sequence is
//! finite and cannot be restarted; callers re-open the file to start over.
//!
//! Lines are read as raw bytes so that invalid UTF-8 is treated like any
//! other malformed line:
//!
//! - Blank or whitespace-only lines are neither records nor errors. They keep
//!   their line number and are always preserved by the rewrite pass.
//! - A line that is not valid JSON, or whose top-level value is not an
//!   object, is skipped and counted in [`ExtractStats::parse_errors`].
//! - A missing or `null` text field yields empty text. A non-string value
//!   yields its compact JSON serialization.
//!
//! Only an I/O failure while reading produces an `Err` item, after which the
//! iterator ends.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LocationRef, Record, ScanError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// What to do with records whose text is empty (including a missing field).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTextPolicy {
    /// Fingerprint empty text like any other value, so all empty records
    /// group together as duplicates.
    #[default]
    Group,
    /// Count empty records but keep them out of the index and the sample.
    Skip,
}

impl EmptyTextPolicy {
    /// Stable name stored in index metadata.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Skip => "skip",
        }
    }
}

/// Configuration for record extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Name of the JSON field holding the comparable text.
    pub text_field: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            text_field: "text".to_string(),
        }
    }
}

impl ExtractConfig {
    /// Set the text field name.
    #[must_use]
    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }
}

/// Per-file extraction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Physical lines read, including blank and malformed ones
    pub lines: u64,
    /// Records yielded
    pub records: u64,
    /// Blank or whitespace-only lines
    pub blank_lines: u64,
    /// Lines skipped because they were not a JSON object
    pub parse_errors: u64,
    /// Records whose text was empty or missing
    pub empty_texts: u64,
}

impl ExtractStats {
    /// Add another file's counters to these.
    pub fn merge(&mut self, other: &ExtractStats) {
        self.lines += other.lines;
        self.records += other.records;
        self.blank_lines += other.blank_lines;
        self.parse_errors += other.parse_errors;
        self.empty_texts += other.empty_texts;
    }
}

/// Opens files as lazy record streams.
#[derive(Debug, Clone, Default)]
pub struct RecordExtractor {
    config: ExtractConfig,
}

impl RecordExtractor {
    /// Create an extractor with the given configuration.
    #[must_use]
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Open `path` and stream its records, tagging each with `file_key`.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] if the file cannot be opened.
    pub fn records(&self, path: &Path, file_key: &str) -> Result<Records, ScanError> {
        let file = File::open(path).map_err(|e| ScanError::from_io(path, e))?;
        Ok(Records {
            reader: BufReader::with_capacity(64 * 1024, file),
            path: path.to_path_buf(),
            file_key: file_key.to_string(),
            text_field: self.config.text_field.clone(),
            line: 0,
            buf: Vec::new(),
            stats: ExtractStats::default(),
            done: false,
        })
    }
}

/// Iterator over the records of one file.
#[derive(Debug)]
pub struct Records {
    reader: BufReader<File>,
    path: PathBuf,
    file_key: String,
    text_field: String,
    line: u64,
    buf: Vec<u8>,
    stats: ExtractStats,
    done: bool,
}

impl Records {
    /// Counters accumulated so far.
    #[must_use]
    pub fn stats(&self) -> ExtractStats {
        self.stats
    }
}

enum LineOutcome {
    Blank,
    Malformed(String),
    Text(String),
}

fn parse_line(bytes: &[u8], text_field: &str) -> LineOutcome {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return LineOutcome::Blank;
    }

    let value: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => return LineOutcome::Malformed(e.to_string()),
    };

    let Value::Object(mut object) = value else {
        return LineOutcome::Malformed("top-level value is not an object".to_string());
    };

    let text = match object.remove(text_field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    };
    LineOutcome::Text(text)
}

impl Iterator for Records {
    type Item = Result<Record, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    self.line += 1;
                    self.stats.lines += 1;

                    let mut bytes = self.buf.as_slice();
                    if self.line == 1 {
                        bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                    }

                    match parse_line(bytes, &self.text_field) {
                        LineOutcome::Blank => {
                            self.stats.blank_lines += 1;
                        }
                        LineOutcome::Malformed(reason) => {
                            self.stats.parse_errors += 1;
                            log::debug!(
                                "Skipping malformed line {}:{}: {}",
                                self.file_key,
                                self.line,
                                reason
                            );
                        }
                        LineOutcome::Text(text) => {
                            self.stats.records += 1;
                            if text.is_empty() {
                                self.stats.empty_texts += 1;
                            }
                            return Some(Ok(Record {
                                location: LocationRef::new(self.file_key.clone(), self.line),
                                text,
                            }));
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    log::warn!("Read error in {}: {}", self.path.display(), e);
                    return Some(Err(ScanError::from_io(&self.path, e)));
                }
            }
        }
    }
}
