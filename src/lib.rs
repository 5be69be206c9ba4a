//! jsondupe - exact and near-duplicate record removal for JSONL corpora.
//!
//! A detect pass extracts one text field from every record, fingerprints it
//! with BLAKE3 into a disk-backed SQLite index, and groups exact duplicates
//! straight from the index. Near duplicates are found by scoring every pair
//! in a uniform random sample of records. Both kinds of groups are merged so
//! each record gets one keep/remove decision, with the earliest
//! `(file, line)` kept. A delete pass rewrites the affected files through a
//! temporary file and an atomic rename.
//!
//! The binary wires these together behind the [`cli`] definitions; the
//! library modules are usable on their own.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod index;
pub mod logging;
pub mod output;
pub mod pool;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod signal;

use std::collections::BTreeMap;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::actions::{BatchRewriteResult, RewriteConfig};
use crate::cli::{Cli, Commands, DeleteArgs, DetectArgs};
use crate::config::Config;
use crate::duplicates::{DuplicateFinder, DuplicateResolver, FinderError, Resolution};
use crate::error::ExitCode;
use crate::index::FingerprintIndex;
use crate::progress::Progress;
use crate::report::{Report, ReportSettings};
use crate::scanner::FileSnapshot;

/// Run the command described by `cli` and return the exit code to use.
///
/// # Errors
///
/// Returns an error for anything that aborts the command: bad
/// configuration, an unusable input directory or index, a strict-mode read
/// failure, or an interrupted detect pass
/// ([`FinderError::Interrupted`](duplicates::FinderError::Interrupted)).
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    configure_colors(cli.no_color);

    let config = Config::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Detect(args) => run_detect(&args, config, cli.quiet),
        Commands::Delete(args) => run_delete(&args, &config, cli.quiet),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::Success)
        }
    }
}

/// Colour only when stdout is a terminal and the environment allows it.
fn configure_colors(no_color: bool) {
    if no_color {
        yansi::disable();
    } else {
        yansi::whenever(yansi::Condition::TTY_AND_COLOR);
    }
}

fn run_detect(args: &DetectArgs, mut config: Config, quiet: bool) -> anyhow::Result<ExitCode> {
    // Checked before the index is opened, since opening creates its directory.
    if !args.input.exists() {
        return Err(FinderError::PathNotFound(args.input.clone()).into());
    }
    if !args.input.is_dir() {
        return Err(FinderError::NotADirectory(args.input.clone()).into());
    }

    args.apply_to(&mut config);
    let index_path = args
        .index
        .clone()
        .unwrap_or_else(|| Config::resolve_path(&args.input, &config.index_file));
    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| Config::resolve_path(&args.input, &config.report_file));
    exclude_outputs(&mut config, &args.input, &[&index_path, &report_path]);
    config.validate()?;

    let shutdown = signal::install_handler();
    let progress = Arc::new(Progress::new(quiet));
    let finder_config = config
        .finder_config()
        .with_fresh(args.fresh)
        .with_shutdown_flag(shutdown.flag())
        .with_progress_callback(progress.clone());

    let index = FingerprintIndex::open(&index_path, &finder_config.index_settings())
        .with_context(|| format!("Failed to open fingerprint index {}", index_path.display()))?;
    let detection = DuplicateFinder::new(finder_config.clone()).detect(&args.input, &index)?;
    // Release the database before any file is rewritten.
    drop(index);

    let report = Report::new(
        args.input.clone(),
        Some(index_path),
        ReportSettings::from(&finder_config),
        &detection,
    );
    report.save(&report_path)?;
    if !quiet {
        output::write_detect_summary(&mut std::io::stdout().lock(), &report, &report_path)?;
    }

    let detect_code = if detection.summary.has_errors() {
        ExitCode::PartialSuccess
    } else if detection.summary.has_duplicates() {
        ExitCode::Success
    } else {
        ExitCode::NoDuplicates
    };
    if !args.delete || !detection.summary.has_duplicates() {
        return Ok(detect_code);
    }

    if !confirm(args.yes, &detection.resolution)? {
        log::info!("Deletion cancelled; report kept at {}", report_path.display());
        return Ok(detect_code);
    }

    let rewrite_config = RewriteConfig::default()
        .with_io_threads(config.io_threads)
        .with_shutdown_flag(shutdown.flag())
        .with_progress_callback(progress);
    let result = actions::execute(
        &args.input,
        &detection.resolution,
        &detection.snapshots,
        &rewrite_config,
    );
    finish_rewrite(&result, quiet, detect_code)
}

fn run_delete(args: &DeleteArgs, config: &Config, quiet: bool) -> anyhow::Result<ExitCode> {
    let (resolution, snapshots) = match &args.index {
        Some(index_path) => plan_from_index(index_path)?,
        None => {
            let report_path = args
                .report
                .clone()
                .unwrap_or_else(|| Config::resolve_path(&args.input, &config.report_file));
            let report = Report::load(&report_path)?;
            if !same_dir(&report.input_dir, &args.input) {
                log::warn!(
                    "Report was written for {}, applying it to {}",
                    report.input_dir.display(),
                    args.input.display()
                );
            }
            (report.resolution(), report.files)
        }
    };

    if resolution.is_empty() {
        if !quiet {
            println!("Nothing to remove.");
        }
        return Ok(ExitCode::NoDuplicates);
    }
    if !confirm(args.yes, &resolution)? {
        log::info!("Deletion cancelled");
        return Ok(ExitCode::Success);
    }

    let shutdown = signal::install_handler();
    let rewrite_config = RewriteConfig::default()
        .with_io_threads(args.io_threads.unwrap_or(config.io_threads))
        .with_shutdown_flag(shutdown.flag())
        .with_progress_callback(Arc::new(Progress::new(quiet)));
    let result = actions::execute(&args.input, &resolution, &snapshots, &rewrite_config);
    finish_rewrite(&result, quiet, ExitCode::Success)
}

/// Exact-duplicate removal plan straight from an index, checked against the
/// snapshots the index recorded for each file.
fn plan_from_index(
    index_path: &Path,
) -> anyhow::Result<(Resolution, BTreeMap<String, FileSnapshot>)> {
    let index = FingerprintIndex::open_read_only(index_path)
        .with_context(|| format!("Failed to open fingerprint index {}", index_path.display()))?;

    let mut resolver = DuplicateResolver::new(Vec::new());
    index.for_each_group_with_count_above(1, |group| resolver.add_exact(group))?;
    let resolution = resolver.finish();

    let mut snapshots = BTreeMap::new();
    for key in resolution.files() {
        match index.snapshot(key)? {
            Some(snapshot) => {
                snapshots.insert(key.to_string(), snapshot);
            }
            None => log::warn!("No snapshot recorded for {key}; it will not be verified"),
        }
    }
    Ok((resolution, snapshots))
}

fn finish_rewrite(
    result: &BatchRewriteResult,
    quiet: bool,
    on_success: ExitCode,
) -> anyhow::Result<ExitCode> {
    if !quiet {
        output::write_rewrite_summary(&mut std::io::stdout().lock(), result)?;
    }
    Ok(if result.interrupted() {
        ExitCode::Interrupted
    } else if !result.all_succeeded() {
        ExitCode::PartialSuccess
    } else {
        on_success
    })
}

/// Ask before rewriting files. Without a terminal, `--yes` is required.
fn confirm(yes: bool, resolution: &Resolution) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        anyhow::bail!("Refusing to rewrite files without confirmation; pass --yes to proceed");
    }

    let mut stdout = std::io::stdout().lock();
    output::write_plan(&mut stdout, resolution)?;
    write!(stdout, "Proceed? [y/N] ")?;
    stdout.flush()?;

    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Keep the index, its journal and the report out of the input selection
/// when they live inside the input directory.
fn exclude_outputs(config: &mut Config, input: &Path, outputs: &[&PathBuf]) {
    for path in outputs {
        if let Ok(rel) = path.strip_prefix(input) {
            let rel = rel.to_string_lossy().replace('\\', "/");
            config.ignore_patterns.push(format!("/{rel}"));
            config.ignore_patterns.push(format!("/{rel}-journal"));
        }
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
