use super::common::{read, rec, run, write_jsonl};
use filetime::FileTime;
use jsondupe::error::ExitCode;
use std::fs;
use std::io::IsTerminal;
use tempfile::tempdir;

#[test]
fn test_detect_and_delete_removes_duplicates() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("keep me"), &rec("unique a")]);
    write_jsonl(dir.path(), "b.jsonl", &[&rec("keep me"), &rec("unique b")]);
    let input = dir.path().to_str().unwrap();

    let code = run(&["detect", input, "--delete", "--yes"]).unwrap();
    assert_eq!(code, ExitCode::Success);

    assert_eq!(
        read(dir.path(), "a.jsonl"),
        format!("{}\n{}\n", rec("keep me"), rec("unique a"))
    );
    assert_eq!(read(dir.path(), "b.jsonl"), format!("{}\n", rec("unique b")));
}

#[test]
fn test_kept_lines_are_byte_identical() {
    let dir = tempdir().unwrap();
    let original = "{\"text\": \"dup\",  \"x\": 1}\r\nnot json at all\n\n{\"text\":\"dup\"}\n{\"text\":\"tail\"}";
    fs::write(dir.path().join("a.jsonl"), original).unwrap();

    let code = run(&["detect", dir.path().to_str().unwrap(), "--delete", "-y"]).unwrap();
    assert_eq!(code, ExitCode::Success);

    assert_eq!(
        read(dir.path(), "a.jsonl"),
        "{\"text\": \"dup\",  \"x\": 1}\r\nnot json at all\n\n{\"text\":\"tail\"}"
    );
}

#[test]
fn test_second_run_finds_nothing() {
    let dir = tempdir().unwrap();
    write_jsonl(
        dir.path(),
        "a.jsonl",
        &[
            &rec("The quick brown fox jumps"),
            &rec("The quick brown fox jump"),
            &rec("exact"),
        ],
    );
    write_jsonl(dir.path(), "b.jsonl", &[&rec("exact")]);
    let input = dir.path().to_str().unwrap();

    assert_eq!(
        run(&["detect", input, "--delete", "--yes"]).unwrap(),
        ExitCode::Success
    );
    let after_first = (read(dir.path(), "a.jsonl"), read(dir.path(), "b.jsonl"));
    assert_eq!(after_first.1, "");

    assert_eq!(
        run(&["detect", input, "--delete", "--yes"]).unwrap(),
        ExitCode::NoDuplicates
    );
    assert_eq!(
        (read(dir.path(), "a.jsonl"), read(dir.path(), "b.jsonl")),
        after_first
    );
}

#[test]
fn test_delete_from_report() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("y"), &rec("x")]);
    let input = dir.path().to_str().unwrap();

    assert_eq!(run(&["detect", input]).unwrap(), ExitCode::Success);
    // Detection alone never modifies input.
    assert_eq!(read(dir.path(), "a.jsonl").lines().count(), 3);

    assert_eq!(run(&["delete", input, "--yes"]).unwrap(), ExitCode::Success);
    assert_eq!(
        read(dir.path(), "a.jsonl"),
        format!("{}\n{}\n", rec("x"), rec("y"))
    );
}

#[test]
fn test_delete_refuses_modified_file() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x")]);
    write_jsonl(dir.path(), "b.jsonl", &[&rec("x"), &rec("z")]);
    let input = dir.path().to_str().unwrap();
    assert_eq!(run(&["detect", input]).unwrap(), ExitCode::Success);

    // Same size, different mtime.
    let b = dir.path().join("b.jsonl");
    let before = fs::read(&b).unwrap();
    filetime::set_file_mtime(&b, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    assert_eq!(
        run(&["delete", input, "--yes"]).unwrap(),
        ExitCode::PartialSuccess
    );
    assert_eq!(fs::read(&b).unwrap(), before);
}

#[test]
fn test_delete_refuses_without_confirmation() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("x")]);
    let input = dir.path().to_str().unwrap();
    let before = read(dir.path(), "a.jsonl");

    // A terminal on stdin would prompt instead of refusing.
    if std::io::stdin().is_terminal() {
        return;
    }
    assert!(run(&["detect", input, "--delete"]).is_err());
    assert!(run(&["delete", input]).is_err());
    assert_eq!(read(dir.path(), "a.jsonl"), before);
}

#[test]
fn test_delete_from_index_removes_exact_only() {
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
    let input = dir.path().to_str().unwrap();
    assert_eq!(run(&["detect", input]).unwrap(), ExitCode::Success);

    let index = dir.path().join("jsondupe.db");
    let code = run(&["delete", input, "--index", index.to_str().unwrap(), "--yes"]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(
        read(dir.path(), "a.jsonl"),
        format!(
            "{}\n{}\n{}\n",
            rec("The quick brown fox jumps"),
            rec("The quick brown fox jump"),
            rec("exact")
        )
    );
}

#[test]
fn test_delete_with_missing_report() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x")]);
    let err = run(&["delete", dir.path().to_str().unwrap(), "--yes"]).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read report file"));
}

#[test]
fn test_delete_with_nothing_to_remove() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("x"), &rec("y")]);
    let input = dir.path().to_str().unwrap();
    assert_eq!(run(&["detect", input]).unwrap(), ExitCode::NoDuplicates);
    assert_eq!(
        run(&["delete", input, "--yes"]).unwrap(),
        ExitCode::NoDuplicates
    );
}

#[test]
fn test_decomposed_file_name_is_deduplicated() {
    let dir = tempdir().unwrap();
    let name = "cafe\u{0301}.jsonl";
    write_jsonl(dir.path(), name, &[&rec("dup"), &rec("dup"), &rec("other")]);
    let input = dir.path().to_str().unwrap();

    let code = run(&["detect", input, "--delete", "--yes"]).unwrap();
    assert_eq!(code, ExitCode::Success);

    let file = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|e| e == "jsonl"))
        .unwrap();
    assert_eq!(
        fs::read_to_string(file).unwrap(),
        format!("{}\n{}\n", rec("dup"), rec("other"))
    );
}

// Linux keeps composed and decomposed names as two different files.
#[cfg(target_os = "linux")]
#[test]
fn test_lookalike_file_names_are_not_confused() {
    let dir = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("The quick brown fox jump")]);
    write_jsonl(dir.path(), "cafe\u{0301}.jsonl", &[&rec("The quick brown fox jumps")]);
    write_jsonl(dir.path(), "caf\u{e9}.jsonl", &[&rec("unique precious record")]);
    let input = dir.path().to_str().unwrap();

    let code = run(&["detect", input, "--seed", "1", "--delete", "--yes"]).unwrap();
    assert_eq!(code, ExitCode::Success);

    assert_eq!(read(dir.path(), "a.jsonl"), format!("{}\n", rec("The quick brown fox jump")));
    assert_eq!(read(dir.path(), "cafe\u{0301}.jsonl"), "");
    assert_eq!(
        read(dir.path(), "caf\u{e9}.jsonl"),
        format!("{}\n", rec("unique precious record"))
    );
}

#[cfg(unix)]
#[test]
fn test_symlinked_input_is_rewritten_at_its_target() {
    let dir = tempdir().unwrap();
    let outside = tempdir().unwrap();
    write_jsonl(dir.path(), "a.jsonl", &[&rec("dup")]);
    write_jsonl(outside.path(), "real.data", &[&rec("dup"), &rec("kept")]);
    let link = dir.path().join("b.jsonl");
    std::os::unix::fs::symlink(outside.path().join("real.data"), &link).unwrap();

    let config_path = outside.path().join("jsondupe.toml");
    fs::write(&config_path, "follow_symlinks = true\n").unwrap();
    let code = run(&[
        "--config",
        config_path.to_str().unwrap(),
        "detect",
        dir.path().to_str().unwrap(),
        "--delete",
        "--yes",
    ])
    .unwrap();
    assert_eq!(code, ExitCode::Success);

    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(read(outside.path(), "real.data"), format!("{}\n", rec("kept")));
    assert_eq!(read(dir.path(), "a.jsonl"), format!("{}\n", rec("dup")));
}
