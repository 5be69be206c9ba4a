use super::common::{rec, run, write_jsonl};
use jsondupe::duplicates::GroupKind;
use jsondupe::error::ExitCode;
use jsondupe::report::{Report, REPORT_VERSION};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_report_contents() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &[
            &rec("The quick brown fox jumps"),
            &rec("dup"),
            &rec("The quick brown fox jump"),
        ],
    );
    write_jsonl(dir.path(), "b.jsonl", &[&rec("dup")]);
    let input = dir.path().to_str().unwrap();
    assert_eq!(
        run(&["detect", input, "--seed", "3", "--sample-size", "100"]).unwrap(),
        ExitCode::Success
    );

    let report = Report::load(&dir.path().join("dedup_report.json")).unwrap();
    assert_eq!(report.version, REPORT_VERSION);
    assert_eq!(report.settings.sample_size, 100);
    assert_eq!(report.settings.seed, Some(3));
    assert_eq!(report.exact.len(), 1);
    assert_eq!(report.exact[0].kind, GroupKind::Exact);
    assert_eq!(report.exact[0].id.len(), 64);
    assert_eq!(report.near.len(), 1);
    assert_eq!(report.near[0].id, "near-000001");
    assert_eq!(report.summary.records, 4);
    assert_eq!(report.summary.exact_groups, 1);
    assert_eq!(report.summary.near_clusters, 1);
    assert_eq!(report.total_removed(), 2);
    assert_eq!(report.files.len(), 2);
}

#[test]
fn test_tampered_report_is_rejected() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("y"), &rec("x")]);
    let input = dir.path().to_str().unwrap();
    run(&["detect", input]).unwrap();

    let path = dir.path().join("dedup_report.json");
    let json = fs::read_to_string(&path).unwrap();
    let tampered = json.replace("\"line\": 3", "\"line\": 2");
    assert_ne!(json, tampered);
    fs::write(&path, tampered).unwrap();

    let err = run(&["delete", input, "--yes"]).unwrap_err();
    assert!(format!("{err:#}").contains("integrity check failed"));
    assert_eq!(
        fs::read_to_string(dir.path().join("a.jsonl")).unwrap().lines().count(),
        3
    );
}

#[test]
fn test_report_is_overwritten_by_next_run() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("x")]);
    let input = dir.path().to_str().unwrap();
    run(&["detect", input]).unwrap();

    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("y")]);
    assert_eq!(run(&["detect", input]).unwrap(), ExitCode::NoDuplicates);
    let report = Report::load(&dir.path().join("dedup_report.json")).unwrap();
    assert_eq!(report.total_removed(), 0);
}

#[test]
fn test_report_with_precise_threshold_can_be_applied() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("y"), &rec("x")]);
    let input = dir.path().to_str().unwrap();

    let code = run(&["detect", input, "--threshold", "0.9251287335186839"]).unwrap();
    assert_eq!(code, ExitCode::Success);
    let report = Report::load(&dir.path().join("dedup_report.json")).unwrap();
    assert_eq!(report.settings.similarity_threshold, 0.925_128_733_518_683_9);

    assert_eq!(run(&["delete", input, "--yes"]).unwrap(), ExitCode::Success);
    assert_eq!(
        fs::read_to_string(dir.path().join("a.jsonl")).unwrap(),
        format!("{}\n{}\n", rec("x"), rec("y"))
    );
}
