//! Report module for persisting detection results.
//!
//! A detect run writes a JSON report that a later delete run can apply
//! without re-reading the corpus.
//!
//! # Features
//!
//! * **Decisions**: Every exact and near group with its survivor and the
//!   records to remove.
//! * **Snapshots**: Size and mtime of every affected file, so files changed
//!   after detection are refused at deletion time.
//! * **Integrity**: The report is wrapped in an envelope with a SHA256
//!   checksum.
//! * **Versioning**: Reports carry a format version checked on load.
//!
//! # Architecture
//!
//! * [`data`]: Serializable report, settings and summary models.
//! * [`io`]: Saving, loading and verifying report files.

pub mod data;
pub mod io;

pub use data::{Report, ReportSettings, ReportSummary, REPORT_VERSION};
