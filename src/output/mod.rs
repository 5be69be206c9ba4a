//! Human-readable output for command results.
//!
//! Summaries are written to any `Write` so they can be captured in tests;
//! the binary sends them to stdout. Colors come from `yansi` and are turned
//! off globally by `--no-color` / `NO_COLOR`.
//!
//! ```no_run
//! use jsondupe::output::write_rewrite_summary;
//! use jsondupe::actions::BatchRewriteResult;
//!
//! let result = BatchRewriteResult::default();
//! write_rewrite_summary(&mut std::io::stdout(), &result).unwrap();
//! ```

pub mod summary;

pub use summary::{write_detect_summary, write_plan, write_rewrite_summary};
