use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TREE: &str = r#"{
  "root": 0,
  "nodes": [
    { "physical_path": "db/changelog.groovy", "change_sets": [0, 1] },
    { "physical_path": "db/people.groovy", "parent": 0, "change_sets": [1] }
  ],
  "change_sets": [
    { "id": "1", "author": "alex", "file_path": "db/changelog.groovy", "change_log": 0 },
    { "id": "2", "author": "alex", "file_path": "db/people.groovy", "change_log": 1 }
  ]
}"#;

fn write_tree(dir: &Path, rel: &str, json: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, json).unwrap();
    path
}

fn changelog() -> Command {
    Command::cargo_bin("changelog").unwrap()
}

// ── compile ──────────────────────────────────────────────────────────

#[test]
fn compile_writes_one_file_per_change_log() {
    let dir = TempDir::new().unwrap();
    let src = write_tree(dir.path(), "tree.json", TREE);
    let out = dir.path().join("out");

    changelog()
        .args(["compile", "--src"])
        .arg(&src)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiled successfully: 2 file(s)"));

    let root = std::fs::read_to_string(out.join("db/changelog.xml")).unwrap();
    assert!(root.contains("<include file=\"db/people.xml\"/>"), "{}", root);
    let people = std::fs::read_to_string(out.join("db/people.xml")).unwrap();
    assert!(people.contains("logicalFilePath=\"db/people.groovy\""), "{}", people);
}

#[test]
fn compile_single_file_to_stdout() {
    let dir = TempDir::new().unwrap();
    let src = write_tree(dir.path(), "tree.json", TREE);

    changelog()
        .args(["compile", "--single-file", "--src"])
        .arg(&src)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("<?xml version=\"1.1\""))
        .stdout(predicate::str::contains(
            "<changeSet id=\"2\" author=\"alex\" logicalFilePath=\"db/people.groovy\"/>",
        ))
        .stdout(predicate::str::contains("<include").not());
}

#[test]
fn compile_without_declaration() {
    let dir = TempDir::new().unwrap();
    let src = write_tree(dir.path(), "tree.json", TREE);

    changelog()
        .args(["compile", "--single-file", "--no-xml-declaration", "--src"])
        .arg(&src)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("<databaseChangeLog"));
}

#[test]
fn compile_resolves_source_on_classpath() {
    let dir = TempDir::new().unwrap();
    write_tree(dir.path(), "resources/db/tree.json", TREE);
    let classpath = dir.path().join("resources");

    changelog()
        .args(["compile", "--single-file", "--src", "db/tree.json", "--classpath"])
        .arg(&classpath)
        .assert()
        .success()
        .stdout(predicate::str::contains("databaseChangeLog"));
}

#[test]
fn compile_requires_out_for_multi_file() {
    let dir = TempDir::new().unwrap();
    let src = write_tree(dir.path(), "tree.json", TREE);

    changelog()
        .args(["compile", "--src"])
        .arg(&src)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--out is required"));
}

#[test]
fn compile_rejects_unsupported_encoding() {
    let dir = TempDir::new().unwrap();
    let src = write_tree(dir.path(), "tree.json", TREE);

    changelog()
        .args(["compile", "--single-file", "--encoding", "ISO-8859-1", "--src"])
        .arg(&src)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ISO-8859-1"));
}

#[test]
fn compile_missing_source() {
    changelog()
        .args(["compile", "--single-file", "--src", "/nonexistent/tree.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Change-log not found"));
}

// ── validate ─────────────────────────────────────────────────────────

#[test]
fn validate_reports_counts() {
    let dir = TempDir::new().unwrap();
    let src = write_tree(dir.path(), "tree.json", TREE);

    changelog()
        .args(["validate", "--src"])
        .arg(&src)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Valid: 2 change-log(s), 2 change-set(s), 0 parameter(s)",
        ));
}

#[test]
fn validate_rejects_dangling_reference() {
    let dir = TempDir::new().unwrap();
    let src = write_tree(
        dir.path(),
        "tree.json",
        r#"{"root":0,"nodes":[{"physical_path":"a.xml","change_sets":[3]}]}"#,
    );

    changelog()
        .args(["validate", "--src"])
        .arg(&src)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid change-log tree"));
}
