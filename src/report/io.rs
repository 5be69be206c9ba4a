//! I/O operations for detection reports.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::report::data::{Report, REPORT_VERSION};
use crate::scanner::{hex_to_fingerprint, path_utils::key_to_path};

/// Envelope written to disk.
///
/// The report is kept as raw JSON so the checksum covers the exact bytes in
/// the file rather than a re-serialization of the parsed value.
#[derive(Serialize, Deserialize)]
struct ReportEnvelope {
    /// SHA256 checksum of the raw report JSON.
    checksum: String,
    report: Box<RawValue>,
}

fn checksum(raw: &RawValue) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.get().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Report {
    /// Save the report atomically, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be serialized or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary report in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write report to: {}", path.display()))?;
        tmp.persist(path)
            .with_context(|| format!("Failed to save report to: {}", path.display()))?;
        log::debug!("Report saved to {}", path.display());
        Ok(())
    }

    /// Serialize the report to pretty JSON wrapped in a checksum envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let pretty = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        let report = RawValue::from_string(pretty).context("Failed to serialize report")?;
        let envelope = ReportEnvelope {
            checksum: checksum(&report),
            report,
        };
        serde_json::to_string_pretty(&envelope).context("Failed to serialize report envelope")
    }

    /// Load a report and verify its checksum and version.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, the checksum
    /// does not match, or the version is unsupported.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report file: {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse and verify a report from its JSON envelope.
    ///
    /// # Errors
    ///
    /// Same as [`Report::load`], minus the file access.
    pub fn from_json(content: &str) -> Result<Self> {
        let envelope: ReportEnvelope = serde_json::from_str(content)
            .context("Failed to parse report envelope. The file might be corrupted.")?;

        if checksum(&envelope.report) != envelope.checksum {
            anyhow::bail!(
                "Report integrity check failed: checksum mismatch. The file may have been edited or corrupted."
            );
        }

        let report: Report = serde_json::from_str(envelope.report.get())
            .context("Failed to parse report contents")?;
        if report.version != REPORT_VERSION {
            anyhow::bail!(
                "Unsupported report version: {}. Current version is {}.",
                report.version,
                REPORT_VERSION
            );
        }

        // Exact groups are named by the fingerprint they share.
        if let Some(group) = report.exact.iter().find(|g| hex_to_fingerprint(&g.id).is_none()) {
            anyhow::bail!("Report contains an exact group with an invalid id: {}", group.id);
        }

        for key in report.files.keys() {
            let path = key_to_path(&report.input_dir, key);
            if !path.exists() {
                log::warn!("File referenced in report no longer exists: {}", path.display());
            }
        }

        Ok(report)
    }
}
