//! CLI integration tests for the `render` and `check` subcommands.
//!
//! Uses `assert_cmd` to spawn the `whisker` binary and verify exit codes,
//! stdout content, and stderr content. Templates and data are written to a
//! temporary directory per test.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper: create a Command for the `whisker` binary.
fn whisker() -> Command {
    cargo_bin_cmd!("whisker")
}

/// Helper: write `contents` to `name` inside `dir`.
fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    whisker()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Whisker template renderer"));
}

#[test]
fn version_exits_0() {
    whisker()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("whisker"));
}

// ──────────────────────────────────────────────
// 2. Render
// ──────────────────────────────────────────────

#[test]
fn render_with_data_file() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "Hello {{name}}! {{#each xs}}{{.}}{{/each}}");
    let data = write(&dir, "d.json", r#"{"name": "<you>", "xs": [1, 2]}"#);
    whisker()
        .args(["render", template.to_str().unwrap(), "--data", data.to_str().unwrap()])
        .assert()
        .success()
        .stdout("Hello &lt;you&gt;! 12");
}

#[test]
fn render_without_escaping() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "{{name}}");
    let data = write(&dir, "d.json", r#"{"name": "<you>"}"#);
    whisker()
        .args(["render", template.to_str().unwrap(), "--data", data.to_str().unwrap(), "--no-escape"])
        .assert()
        .success()
        .stdout("<you>");
}

#[test]
fn render_truncates_at_max_size() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "abcdefghij");
    whisker()
        .args(["render", template.to_str().unwrap(), "--max-size", "4"])
        .assert()
        .success()
        .stdout("abcd");
}

#[test]
fn config_file_sets_defaults_and_flags_win() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "[{{missing}}]abcdef");
    let config = write(&dir, "c.toml", "null = \"?\"\nmax_size = 3\n");
    whisker()
        .args(["render", template.to_str().unwrap(), "--config", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout("[?]");
    whisker()
        .args([
            "render",
            template.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--max-size",
            "0",
        ])
        .assert()
        .success()
        .stdout("[?]abcdef");
}

#[test]
fn render_utf16_to_file() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "hi");
    let out = dir.path().join("out.bin");
    whisker()
        .args([
            "render",
            template.to_str().unwrap(),
            "--encoding",
            "utf-16le",
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();
    assert_eq!(fs::read(&out).unwrap(), vec![b'h', 0, b'i', 0]);
}

#[test]
fn render_error_exits_1() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "{{#each v}}x{{/each}}");
    let data = write(&dir, "d.json", r#"{"v": "scalar"}"#);
    whisker()
        .args(["render", template.to_str().unwrap(), "--data", data.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("used like an array"));
}

#[test]
fn partial_overflow_exits_1() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "{{#declare P}}{{#include P}}{{/declare}}{{#include P}}");
    whisker()
        .args(["render", template.to_str().unwrap(), "--partial-stack-size", "8"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("partial stack overflow"));
    whisker()
        .args([
            "render",
            template.to_str().unwrap(),
            "--partial-stack-size",
            "8",
            "--silent-overflow",
        ])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn bad_data_json_exits_1() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "x");
    let data = write(&dir, "d.json", "{not json");
    whisker()
        .args(["render", template.to_str().unwrap(), "--data", data.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing JSON"));
}

#[test]
fn missing_template_exits_1() {
    whisker()
        .args(["render", "does/not/exist.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading template"));
}

// ──────────────────────────────────────────────
// 3. Check
// ──────────────────────────────────────────────

#[test]
fn check_valid_template() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "{{#declare row}}{{.}}{{/declare}}{{#each xs}}{{#include row}}{{/each}}");
    whisker()
        .args(["check", template.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"))
        .stdout(predicate::str::contains("partials: row"));
}

#[test]
fn check_reports_every_syntax_error() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "{{#a}}x{{/b}}\n{{bad path}}");
    whisker()
        .args(["check", template.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("2 syntax error"))
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn check_json_output() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "{{#each element}}{{name}}");
    let assert = whisker()
        .args(["--output", "json", "check", template.to_str().unwrap()])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stderr).expect("stderr is JSON");
    assert!(json.is_object() || json.is_array());
}

#[test]
fn quiet_silences_compile_errors_in_every_format() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", "{{#each element}}{{name}}");
    for format in ["text", "json"] {
        whisker()
            .args(["--quiet", "--output", format, "check", template.to_str().unwrap()])
            .assert()
            .failure()
            .code(1)
            .stderr("");
    }
}

#[test]
fn unescaped_formatter_output() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "t.txt", r#"{{n("F2")}}|{{{n("F2")}}}"#);
    let data = write(&dir, "d.json", r#"{"n": 3.14159}"#);
    whisker()
        .args(["render", template.to_str().unwrap(), "--data", data.to_str().unwrap()])
        .assert()
        .success()
        .stdout("3.14|3.14");
}
