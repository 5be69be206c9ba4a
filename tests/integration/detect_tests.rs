use super::common::{detect, rec, run, seeded, write_jsonl};
use jsondupe::duplicates::{Decision, GroupKind, SimilarityAlgorithm};
use jsondupe::error::ExitCode;
use jsondupe::report::Report;
use jsondupe::scanner::{EmptyTextPolicy, ExtractConfig, LocationRef, WalkerConfig};
use tempfile::tempdir;

const BASE: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWX";

#[test]
fn test_empty_directory() {
    let dir = tempdir().unwrap();
    let detection = detect(dir.path(), seeded());

    assert!(detection.resolution.is_empty());
    assert_eq!(detection.summary.files_scanned, 0);
    assert_eq!(detection.summary.records_to_remove, 0);
}

#[test]
fn test_exact_duplicates_keep_earliest_location() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "b.jsonl", &[&rec("shared"), &rec("only b")]);
    write_jsonl(dir.path(), "a.jsonl", &[&rec("only a"), &rec("shared")]);
    write_jsonl(dir.path(), "c.jsonl", &[&rec("shared")]);

    let detection = detect(dir.path(), seeded());
    let res = &detection.resolution;

    assert_eq!(res.decision(&LocationRef::new("a.jsonl", 2)), Decision::Keep);
    assert_eq!(res.decision(&LocationRef::new("b.jsonl", 1)), Decision::Remove);
    assert_eq!(res.decision(&LocationRef::new("c.jsonl", 1)), Decision::Remove);
    assert_eq!(res.decision(&LocationRef::new("a.jsonl", 1)), Decision::Untouched);
    assert_eq!(res.total_removed(), 2);
    assert_eq!(detection.summary.exact_groups, 1);
    assert_eq!(detection.summary.files_affected, 2);
}

#[test]
fn test_near_duplicate_pair() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &[
            &rec("The quick brown fox jumps"),
            &rec("Something else entirely"),
            &rec("The quick brown fox jump"),
        ],
    );

    let detection = detect(dir.path(), seeded());
    let groups = detection.resolution.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].kind, GroupKind::Near);
    assert_eq!(groups[0].id, "near-000001");
    assert_eq!(groups[0].keep, LocationRef::new("a.jsonl", 1));
    assert_eq!(groups[0].remove, vec![LocationRef::new("a.jsonl", 3)]);
}

#[test]
fn test_near_duplicates_are_transitive() {
    // a~b and b~c score 0.96; a and c only 0.92 but share a cluster.
    let a = BASE.to_string();
    let b = format!("01{}", &BASE[2..]);
    let c = format!("01{}89", &BASE[2..48]);

    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "x.jsonl", &[&rec(&c), &rec(&a), &rec(&b)]);

    let detection = detect(dir.path(), seeded());
    let groups = detection.resolution.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].keep, LocationRef::new("x.jsonl", 1));
    assert_eq!(
        groups[0].remove,
        vec![LocationRef::new("x.jsonl", 2), LocationRef::new("x.jsonl", 3)]
    );
}

#[test]
fn test_exact_and_near_groups_merge() {
    let variant = format!("{}!", BASE);
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec(BASE)]);
    write_jsonl(dir.path(), "b.jsonl", &[&rec(BASE)]);
    write_jsonl(dir.path(), "c.jsonl", &[&rec(&variant)]);

    let detection = detect(dir.path(), seeded());
    let res = &detection.resolution;
    let groups = res.groups();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].kind, GroupKind::Near);
    assert_eq!(groups[0].keep, LocationRef::new("a.jsonl", 1));
    assert_eq!(groups[0].sources.len(), 2);
    assert_eq!(res.decision(&LocationRef::new("b.jsonl", 1)), Decision::Remove);
    assert_eq!(res.decision(&LocationRef::new("c.jsonl", 1)), Decision::Remove);
    // Exact pairs are never scored.
    assert_eq!(detection.summary.cluster.exact_pairs, 1);
}

#[test]
fn test_threshold_of_one_finds_no_near_duplicates() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &[&rec("The quick brown fox jumps"), &rec("The quick brown fox jump")],
    );
    let detection = detect(dir.path(), seeded().with_threshold(1.0));
    assert!(detection.resolution.is_empty());
}

#[test]
fn test_sample_size_zero_disables_near_detection() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &[
            &rec("The quick brown fox jumps"),
            &rec("The quick brown fox jump"),
            &rec("exact"),
            &rec("exact"),
        ],
    );
    let detection = detect(dir.path(), seeded().with_sample_size(0));
    let groups = detection.resolution.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].kind, GroupKind::Exact);
}

#[test]
fn test_other_similarity_measure() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &[&rec("The quick brown fox jumps"), &rec("The quick brown fox jump")],
    );
    let detection = detect(
        dir.path(),
        seeded().with_similarity(SimilarityAlgorithm::JaroWinkler),
    );
    assert_eq!(detection.resolution.total_removed(), 1);
}

#[test]
fn test_malformed_lines_are_never_touched() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &["not json", &rec("dup"), "", "{broken", &rec("dup"), "not json"],
    );

    let detection = detect(dir.path(), seeded());
    let res = &detection.resolution;
    assert_eq!(res.total_removed(), 1);
    assert_eq!(res.decision(&LocationRef::new("a.jsonl", 5)), Decision::Remove);
    assert_eq!(res.decision(&LocationRef::new("a.jsonl", 6)), Decision::Untouched);
    assert_eq!(detection.summary.extract.parse_errors, 3);
    assert_eq!(detection.summary.extract.blank_lines, 1);
}

#[test]
fn test_missing_and_empty_text_grouped_by_default() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &[r#"{"id":1}"#, r#"{"text":""}"#, r#"{"text":null}"#],
    );

    let grouped = detect(dir.path(), seeded());
    assert_eq!(grouped.resolution.total_removed(), 2);

    let skipped = detect(
        dir.path(),
        seeded().with_empty_text(EmptyTextPolicy::Skip).with_fresh(true),
    );
    assert!(skipped.resolution.is_empty());
}

#[test]
fn test_non_string_values_compared_as_json() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &[r#"{"text":{"b":1}}"#, r#"{"text": {"b": 1}}"#, r#"{"text":42}"#],
    );
    let detection = detect(dir.path(), seeded());
    assert_eq!(
        detection.resolution.decision(&LocationRef::new("a.jsonl", 2)),
        Decision::Remove
    );
    assert_eq!(
        detection.resolution.decision(&LocationRef::new("a.jsonl", 3)),
        Decision::Untouched
    );
}

#[test]
fn test_custom_text_field_and_pattern() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a_full.jsonl", &[r#"{"body":"x","text":"1"}"#]);
    write_jsonl(dir.path(), "b_full.jsonl", &[r#"{"body":"x","text":"2"}"#]);
    write_jsonl(dir.path(), "c_part.jsonl", &[r#"{"body":"x","text":"3"}"#]);

    let config = seeded()
        .with_extract_config(ExtractConfig::default().with_text_field("body"))
        .with_walker_config(WalkerConfig::default().with_file_pattern("*_full.jsonl"));
    let detection = detect(dir.path(), config);

    assert_eq!(detection.summary.files_scanned, 2);
    assert_eq!(
        detection.resolution.decision(&LocationRef::new("b_full.jsonl", 1)),
        Decision::Remove
    );
}

#[test]
fn test_recursive_file_keys() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "top.jsonl", &[&rec("nested dup")]);
    write_jsonl(dir.path(), "sub/inner.jsonl", &[&rec("nested dup")]);

    let flat = detect(dir.path(), seeded());
    assert_eq!(flat.summary.files_scanned, 1);

    let deep = detect(
        dir.path(),
        seeded().with_walker_config(WalkerConfig::default().with_recursive(true)),
    );
    assert_eq!(deep.summary.files_scanned, 2);
    assert_eq!(
        deep.resolution.decision(&LocationRef::new("top.jsonl", 1)),
        Decision::Remove
    );
    assert_eq!(
        deep.resolution.decision(&LocationRef::new("sub/inner.jsonl", 1)),
        Decision::Keep
    );
}

#[test]
fn test_detect_command_writes_report() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("x")]);
    let input = dir.path().to_str().unwrap();

    let code = run(&["detect", input, "--seed", "1"]).unwrap();
    assert_eq!(code, ExitCode::Success);

    let report = Report::load(&dir.path().join("dedup_report.json")).unwrap();
    assert_eq!(report.total_removed(), 1);
    assert_eq!(report.summary.files_scanned, 1);
    assert!(report.files.contains_key("a.jsonl"));
    assert!(dir.path().join("jsondupe.db").exists());
}

#[test]
fn test_detect_command_no_duplicates_exit_code() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("one"), &rec("two")]);
    let code = run(&["detect", dir.path().to_str().unwrap()]).unwrap();
    assert_eq!(code, ExitCode::NoDuplicates);
}

#[test]
fn test_detect_command_missing_input() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let err = run(&["detect", missing.to_str().unwrap()]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
}

#[test]
fn test_detect_command_outputs_outside_input() {
    let input = tempdir().unwrap();
    let work = tempdir().unwrap();
    write_jsonl(input.path(), "a.jsonl", &[&rec("x"), &rec("x")]);
    let index = work.path().join("idx.db");
    let report = work.path().join("out").join("report.json");

    let code = run(&[
        "detect",
        input.path().to_str().unwrap(),
        "--index",
        index.to_str().unwrap(),
        "--report",
        report.to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(code, ExitCode::Success);
    assert!(index.exists());
    assert!(report.exists());
    assert!(!input.path().join("jsondupe.db").exists());
}
