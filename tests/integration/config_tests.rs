use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use jsondupe::config::Config;
use jsondupe::duplicates::SimilarityAlgorithm;
use jsondupe::scanner::{EmptyTextPolicy, TextNormalization};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.io_threads, 4);
    assert_eq!(config.file_pattern, "*.jsonl");
}

#[test]
fn test_config_load_from_env() {
    // Only keys that do not change detection results, since other tests
    // load the environment too.
    std::env::set_var("JSONDUPE_IO_THREADS", "2");
    std::env::set_var("JSONDUPE_BATCH_SIZE", "500");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("JSONDUPE_").split("__"))
        .extract()
        .unwrap();
    assert_eq!(config.io_threads, 2);
    assert_eq!(config.batch_size, 500);

    std::env::remove_var("JSONDUPE_IO_THREADS");
    std::env::remove_var("JSONDUPE_BATCH_SIZE");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
text_field = "content"
file_pattern = "*_full.jsonl"
recursive = true
ignore_patterns = ["scratch/*"]
normalization = "collapse_whitespace"
empty_text = "skip"
sample_size = 5000
similarity_threshold = 0.9
similarity = "sorensen_dice"
seed = 11
"#,
    )
    .unwrap();

    let config = Config::load_from(Some(&config_path)).unwrap();
    assert_eq!(config.text_field, "content");
    assert_eq!(config.file_pattern, "*_full.jsonl");
    assert!(config.recursive);
    assert_eq!(config.ignore_patterns, vec!["scratch/*"]);
    assert_eq!(config.normalization, TextNormalization::CollapseWhitespace);
    assert_eq!(config.empty_text, EmptyTextPolicy::Skip);
    assert_eq!(config.sample_size, 5000);
    assert!((config.similarity_threshold - 0.9).abs() < f64::EPSILON);
    assert_eq!(config.similarity, SimilarityAlgorithm::SorensenDice);
    assert_eq!(config.seed, Some(11));

    let finder = config.finder_config();
    assert!(finder.walker_config.recursive);
    assert_eq!(finder.extract_config.text_field, "content");
}

#[test]
fn test_config_roundtrips_through_toml() {
    let mut config = Config::default();
    config.sample_size = 123;
    config.seed = Some(9);

    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, config.to_toml().unwrap()).unwrap();

    let loaded: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_config_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "invalid = toml").unwrap();

    assert!(Config::load_from(Some(&config_path)).is_err());
}

#[test]
fn test_config_out_of_range_value() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "similarity_threshold = 1.5\n").unwrap();

    let err = Config::load_from(Some(&config_path)).unwrap_err();
    assert!(err.to_string().contains("similarity_threshold"));
}

#[test]
fn test_config_file_drives_detect() {
    use super::common::{rec, run, write_jsonl};
    use jsondupe::error::ExitCode;

    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[r#"{"body":"same","text":"1"}"#]);
    write_jsonl(dir.path(), "b.jsonl", &[r#"{"body":"same","text":"2"}"#, &rec("3")]);
    let config_path = dir.path().join("jsondupe.toml");
    fs::write(&config_path, "text_field = \"body\"\n").unwrap();

    let code = run(&[
        "--config",
        config_path.to_str().unwrap(),
        "detect",
        dir.path().to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(code, ExitCode::Success);
}
