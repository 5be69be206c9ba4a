//! Text summaries for detect and delete runs.

use std::io::{self, Write};
use std::path::Path;

use bytesize::ByteSize;
use yansi::Paint;

use crate::actions::BatchRewriteResult;
use crate::duplicates::Resolution;
use crate::report::Report;

/// Print the outcome of a detect run.
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn write_detect_summary<W: Write>(
    out: &mut W,
    report: &Report,
    report_path: &Path,
) -> io::Result<()> {
    let s = &report.summary;

    writeln!(out, "{}", "Detection complete".bold())?;
    writeln!(
        out,
        "  Files:    {} scanned, {} reused from index, {} failed",
        s.files_scanned, s.files_reused, s.files_failed
    )?;
    writeln!(
        out,
        "  Records:  {} extracted from {} lines ({} blank, {} malformed, {} empty text)",
        s.records, s.lines, s.blank_lines, s.parse_errors, s.empty_texts
    )?;
    writeln!(
        out,
        "  Exact:    {} group(s)",
        s.exact_groups.to_string().cyan()
    )?;
    writeln!(
        out,
        "  Near:     {} cluster(s) in a sample of {} ({} comparisons, threshold {})",
        s.near_clusters.to_string().cyan(),
        s.sample_size,
        s.comparisons,
        report.settings.similarity_threshold
    )?;

    if s.records_to_remove == 0 {
        writeln!(out, "  {}", "No duplicates found.".green())?;
    } else {
        writeln!(
            out,
            "  Removable: {} record(s) across {} file(s)",
            s.records_to_remove.to_string().yellow().bold(),
            s.files_affected
        )?;
    }

    for error in &s.errors {
        writeln!(out, "  {} {}", "warning:".yellow(), error)?;
    }
    writeln!(out, "Report written to {}", report_path.display())?;
    Ok(())
}

/// Print the per-file removal plan ahead of a confirmation prompt.
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn write_plan<W: Write>(out: &mut W, resolution: &Resolution) -> io::Result<()> {
    writeln!(
        out,
        "About to remove {} record(s) from {} file(s):",
        resolution.total_removed().to_string().yellow().bold(),
        resolution.removal_plan().len()
    )?;
    for (key, lines) in resolution.removal_plan() {
        writeln!(out, "  {:>8}  {}", lines.len(), key)?;
    }
    Ok(())
}

/// Print the outcome of a rewrite batch.
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn write_rewrite_summary<W: Write>(out: &mut W, result: &BatchRewriteResult) -> io::Result<()> {
    for file in &result.rewritten {
        writeln!(
            out,
            "  {} {}: removed {}, kept {} ({} -> {})",
            "✓".green(),
            file.key,
            file.removed,
            file.kept,
            ByteSize::b(file.bytes_before),
            ByteSize::b(file.bytes_after)
        )?;
    }
    for (key, message) in &result.failures {
        writeln!(out, "  {} {}: {}", "✗".red(), key, message)?;
    }
    for key in &result.skipped {
        writeln!(out, "  {} {}: skipped", "-".dim(), key)?;
    }

    let line = result.summary();
    if result.all_succeeded() {
        writeln!(out, "{}", line.green().bold())
    } else {
        writeln!(out, "{}", line.yellow().bold())
    }
}
