//! Logging setup on top of `log` and `env_logger`.
//!
//! The level comes from `RUST_LOG` when set, otherwise from the CLI flags:
//! `--quiet` shows errors only, `-v` enables debug and `-vv` trace. The
//! default is info, which is where the per-phase summaries are logged.
//!
//! ```rust,no_run
//! use jsondupe::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("visible with -v");
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Initialize logging for the process.
///
/// Later calls are ignored, so library tests and repeated `run_app`
/// invocations in one process can all call this.
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = std::env::var_os("RUST_LOG").is_some();
    let level = level_for(verbose, quiet);

    let mut builder = Builder::new();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level);
    }

    builder.format(move |buf, record| {
        let style = buf.default_level_style(record.level());
        if verbose > 0 {
            writeln!(
                buf,
                "{} {style}{:<5}{style:#} [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        } else {
            writeln!(buf, "{style}{:<5}{style:#} {}", record.level(), record.args())
        }
    });

    if builder.try_init().is_ok() {
        log::debug!(
            "Logging initialized ({})",
            if from_env { "RUST_LOG".to_string() } else { format!("{level:?}") }
        );
    }
}

/// Map CLI flags to a level filter. `quiet` wins over `verbose`.
fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}
