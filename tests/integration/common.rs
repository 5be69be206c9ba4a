use clap::Parser;
use jsondupe::cli::Cli;
use jsondupe::duplicates::{Detection, DuplicateFinder, FinderConfig};
use jsondupe::error::ExitCode;
use jsondupe::index::FingerprintIndex;
use std::fs;
use std::path::Path;

/// Write records one per line with a trailing newline.
pub fn write_jsonl(dir: &Path, name: &str, lines: &[&str]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content).unwrap();
}

/// A `{"text": ...}` record.
pub fn rec(text: &str) -> String {
    serde_json::json!({ "text": text }).to_string()
}

/// Run a detect pass with the index stored next to the input.
pub fn detect(dir: &Path, config: FinderConfig) -> Detection {
    let index = FingerprintIndex::open(&dir.join("jsondupe.db"), &config.index_settings()).unwrap();
    DuplicateFinder::new(config).detect(dir, &index).unwrap()
}

/// Deterministic finder settings.
pub fn seeded() -> FinderConfig {
    FinderConfig::default().with_seed(Some(7)).with_io_threads(1)
}

/// Run the CLI in-process.
pub fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["jsondupe", "-q", "--no-color"];
    argv.extend_from_slice(args);
    jsondupe::run_app(Cli::try_parse_from(argv).unwrap())
}

/// File contents as a string.
pub fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}
