//! Integration tests for the recast CLI
//!
//! These tests verify the CLI behavior end-to-end

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value as JsonValue, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[allow(deprecated)]
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("recast").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

const MAPPING: &str = r#"
name: swap
actions:
  - set_values:
      - applicability: Patient.gender = 'male'
        fields:
          - location: Patient.gender
            value: female
  - create_resource:
      - resourceType: Observation
        fields:
          - location: Observation.status
            value: final
          - location: Observation.code.coding
            value: $randomCode([http://example.org/vs])
"#;

/// A workspace with a mapping, two bundles and an implementation guide
fn create_test_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join("mapping.yaml"), MAPPING).unwrap();

    fs::create_dir(root.join("bundles")).unwrap();
    for (name, gender) in [("a.json", "male"), ("b.json", "female")] {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [{"resource": {"resourceType": "Patient", "id": "p1", "gender": gender}}]
        });
        fs::write(root.join("bundles").join(name), bundle.to_string()).unwrap();
    }

    fs::create_dir(root.join("ig")).unwrap();
    let value_set = json!({
        "resourceType": "ValueSet",
        "url": "http://example.org/vs",
        "compose": {"include": [{"system": "http://example.org/cs",
            "concept": [{"code": "x", "display": "Only code"}]}]}
    });
    fs::write(root.join("ig/vs.json"), value_set.to_string()).unwrap();

    temp_dir
}

fn written_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

fn read(path: &Path) -> JsonValue {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_help_command() {
    let temp = TempDir::new().unwrap();
    cli(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("recast applies a mapping"))
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_version_command() {
    let temp = TempDir::new().unwrap();
    cli(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(VERSION));

    cli(temp.path())
        .args(["version", "--detailed"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("recast {VERSION}")))
        .stdout(predicate::str::contains("Build information:"));
}

#[test]
fn test_generate_completion() {
    let temp = TempDir::new().unwrap();
    cli(temp.path())
        .args(["--generate-completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("recast"));
}

#[test]
fn test_run_without_mapping_prints_usage() {
    let temp = create_test_project();
    cli(temp.path())
        .args(["run", "-s", "bundles"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage: recast run -m <MAPPING> -s <SOURCE>"));

    cli(temp.path())
        .args(["run", "-m", "mapping.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage: recast run"));
}

#[test]
fn test_run_folder_with_implementation_guide() {
    let temp = create_test_project();
    cli(temp.path())
        .args([
            "--no-color", "run", "-m", "mapping.yaml", "-s", "bundles", "-ig", "ig", "-o", "out",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied mapping swap"))
        .stdout(predicate::str::contains("2 bundle(s)"));

    let files = written_files(&temp.path().join("out"));
    assert_eq!(files.len(), 2);
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.ends_with("_a.json")));
    assert!(names.iter().any(|n| n.ends_with("_b.json")));

    for file in &files {
        let bundle = read(file);
        assert_eq!(bundle["entry"][0]["resource"]["gender"], json!("female"));
        assert_eq!(
            bundle["entry"][1]["resource"]["code"]["coding"],
            json!([{"system": "http://example.org/cs", "code": "x", "display": "Only code"}])
        );
    }
}

#[test]
fn test_run_never_overwrites_previous_output() {
    let temp = create_test_project();
    for _ in 0..2 {
        cli(temp.path())
            .args(["run", "-m", "mapping.yaml", "-s", "bundles/a.json", "-o", "out"])
            .assert()
            .success();
    }
    assert_eq!(written_files(&temp.path().join("out")).len(), 2);
}

#[test]
fn test_run_reads_output_dir_from_config() {
    let temp = create_test_project();
    fs::write(
        temp.path().join("recast.yaml"),
        "outputDir: from-config\npretty: true\n",
    )
    .unwrap();

    cli(temp.path())
        .args(["run", "-m", "mapping.yaml", "-s", "bundles/b.json"])
        .assert()
        .success();

    let files = written_files(&temp.path().join("from-config"));
    assert_eq!(files.len(), 1);
    assert!(fs::read_to_string(&files[0]).unwrap().contains("\n  "));
}

#[test]
fn test_empty_implementation_guide_fails_before_writing() {
    let temp = create_test_project();
    fs::create_dir(temp.path().join("empty-ig")).unwrap();

    cli(temp.path())
        .args([
            "run", "-m", "mapping.yaml", "-s", "bundles", "-ig", "empty-ig", "-o", "out",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty"));
    assert!(!temp.path().join("out").exists());
}

#[test]
fn test_missing_source_fails() {
    let temp = create_test_project();
    cli(temp.path())
        .args(["run", "-m", "mapping.yaml", "-s", "nope.json", "-o", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
    assert!(!temp.path().join("out").exists());
}

#[test]
fn test_check_command() {
    let temp = create_test_project();
    cli(temp.path())
        .args(["check", "-m", "mapping.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mapping swap is valid"))
        .stdout(predicate::str::contains("1. set_values"))
        .stdout(predicate::str::contains("2. create_resource"));

    fs::write(
        temp.path().join("bad.yaml"),
        "actions:\n  - shift_dates: whenever\n",
    )
    .unwrap();
    cli(temp.path())
        .args(["check", "-m", "bad.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid mapping"));
}

#[test]
fn test_colour_is_forced_unless_disabled() {
    let temp = create_test_project();
    cli(temp.path())
        .env_remove("NO_COLOR")
        .args(["check", "-m", "mapping.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\x1b["));

    cli(temp.path())
        .env_remove("NO_COLOR")
        .args(["--no-color", "check", "-m", "mapping.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\x1b[").not());
}
