use super::common::{detect, rec, seeded, write_jsonl};
use filetime::FileTime;
use jsondupe::duplicates::Decision;
use jsondupe::index::FingerprintIndex;
use jsondupe::scanner::{LocationRef, TextNormalization};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_unchanged_files_are_reused() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("y")]);
    write_jsonl(dir.path(), "b.jsonl", &[&rec("x")]);

    let first = detect(dir.path(), seeded());
    assert_eq!(first.summary.files_reused, 0);

    let second = detect(dir.path(), seeded());
    assert_eq!(second.summary.files_reused, 2);
    assert_eq!(second.resolution, first.resolution);
    assert_eq!(second.summary.indexed_records, 3);
    // Reused files are still sampled.
    assert_eq!(second.summary.sampled_from, 3);
}

#[test]
fn test_changed_file_is_reingested() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x")]);
    write_jsonl(dir.path(), "b.jsonl", &[&rec("y")]);
    let b = dir.path().join("b.jsonl");
    filetime::set_file_mtime(&b, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let first = detect(dir.path(), seeded());
    assert!(first.resolution.is_empty());

    write_jsonl(dir.path(), "b.jsonl", &[&rec("y"), &rec("x")]);
    let second = detect(dir.path(), seeded());
    assert_eq!(second.summary.files_reused, 1);
    assert_eq!(
        second.resolution.decision(&LocationRef::new("b.jsonl", 2)),
        Decision::Remove
    );
    assert_eq!(second.summary.indexed_records, 3);
}

#[test]
fn test_removed_file_is_pruned() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x")]);
    write_jsonl(dir.path(), "b.jsonl", &[&rec("x")]);

    let first = detect(dir.path(), seeded());
    assert_eq!(first.resolution.total_removed(), 1);

    fs::remove_file(dir.path().join("b.jsonl")).unwrap();
    let second = detect(dir.path(), seeded());
    assert_eq!(second.summary.files_pruned, 1);
    assert!(second.resolution.is_empty());
    assert_eq!(second.summary.indexed_records, 1);
}

#[test]
fn test_fresh_rebuilds_index() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("x")]);

    detect(dir.path(), seeded());
    let fresh = detect(dir.path(), seeded().with_fresh(true));
    assert_eq!(fresh.summary.files_reused, 0);
    assert_eq!(fresh.resolution.total_removed(), 1);
}

#[test]
fn test_settings_change_invalidates_index() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec(" x ")]);

    let exact = detect(dir.path(), seeded().with_sample_size(0));
    assert!(exact.resolution.is_empty());

    let trimmed = detect(
        dir.path(),
        seeded()
            .with_sample_size(0)
            .with_normalization(TextNormalization::Trim),
    );
    assert_eq!(trimmed.summary.files_reused, 0);
    assert_eq!(trimmed.resolution.total_removed(), 1);
}

#[test]
fn test_index_records_snapshots() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), "bad", &rec("y")]);
    detect(dir.path(), seeded());

    let index = FingerprintIndex::open_read_only(&dir.path().join("jsondupe.db")).unwrap();
    let snapshot = index.snapshot("a.jsonl").unwrap().unwrap();
    assert_eq!(snapshot.records, 2);
    assert_eq!(snapshot.size, fs::metadata(dir.path().join("a.jsonl")).unwrap().len());
    assert_eq!(index.indexed_files().unwrap(), vec!["a.jsonl".to_string()]);
}
