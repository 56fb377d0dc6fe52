use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_wasm(dir: &Path, wat_src: &str) -> std::path::PathBuf {
    let wasm = wat::parse_str(wat_src).expect("valid wat");
    let path = dir.join("module.wasm");
    std::fs::write(&path, wasm).unwrap();
    path
}

const RETURN_ONE: &str = r#"
    (module
      (func (export "_start") (result i32)
        i32.const 1))
"#;

#[test]
fn explores_a_module_and_writes_state_records() {
    let dir = tempfile::tempdir().unwrap();
    let wasm = write_wasm(dir.path(), RETURN_ONE);
    let out = dir.path().join("out");

    Command::cargo_bin("seam")
        .unwrap()
        .arg(&wasm)
        .arg("--out-dir")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Return\": \"1\""));

    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("state_0.json")).unwrap()).unwrap();
    assert_eq!(state["Return"], "1");
    assert_eq!(state["Solution"], serde_json::json!({}));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["entry"], "_start");
    assert_eq!(summary["path_counts"]["returned"], 1);
}

#[test]
fn text_format_renders_a_summary() {
    let dir = tempfile::tempdir().unwrap();
    let wasm = write_wasm(dir.path(), RETURN_ONE);

    Command::cargo_bin("seam")
        .unwrap()
        .arg(&wasm)
        .arg("--out-dir")
        .arg(dir.path().join("out"))
        .arg("--format")
        .arg("text")
        .assert()
        .success()
        .stdout(predicate::str::contains("Entry: _start"))
        .stdout(predicate::str::contains("returned: 1"));
}

#[test]
fn missing_artifact_fails_with_a_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("seam")
        .unwrap()
        .arg(dir.path().join("nope.wasm"))
        .arg("--out-dir")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read artifact"));
}

#[test]
fn unknown_entry_fails() {
    let dir = tempfile::tempdir().unwrap();
    let wasm = write_wasm(dir.path(), RETURN_ONE);

    Command::cargo_bin("seam")
        .unwrap()
        .arg(&wasm)
        .arg("--entry")
        .arg("not_there")
        .arg("--out-dir")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not_there"));
}
