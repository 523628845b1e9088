// Drives the compiled binary with a throwaway config and database.

use assert_cmd::Command;
use std::fs;
use std::path::Path;

fn keytrace(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("keytrace").unwrap();
    cmd.arg("--config")
        .arg(dir.join("config.json"))
        .arg("--database")
        .arg(dir.join("keytrace.db"));
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn add_text_and_page_through_it() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("alice.txt");
    fs::write(&file, "Down the rabbit hole. Alice was tired! What is a book for?").unwrap();

    let out = stdout_of(keytrace(dir.path()).args(["texts", "add", "Alice"]).arg(&file).args(["--threshold", "10"]));
    // id 1 is the bundled text
    assert!(out.contains("added text 2 (3 pages)"), "{out}");

    let out = stdout_of(keytrace(dir.path()).args(["texts", "list"]));
    assert!(out.contains("* "), "{out}");
    assert!(out.contains("page 1/3"), "{out}");

    let out = stdout_of(keytrace(dir.path()).args(["pages", "--goto", "2"]));
    assert!(out.contains(">    2"), "{out}");

    // the position survives in the config file
    let out = stdout_of(keytrace(dir.path()).args(["texts", "list"]));
    assert!(out.contains("page 2/3"), "{out}");
}

#[test]
fn bundled_text_is_listed_once() {
    let dir = tempfile::tempdir().unwrap();
    let out = stdout_of(keytrace(dir.path()).args(["texts", "list"]));
    assert!(out.contains("Alice's Adventures in Wonderland"), "{out}");

    stdout_of(keytrace(dir.path()).args(["texts", "remove", "1"]));
    let out = stdout_of(keytrace(dir.path()).args(["texts", "list"]));
    assert!(out.contains("no texts"), "{out}");
}

#[test]
fn edit_text_patterns() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("short.txt");
    fs::write(&file, "One; two; three; four.").unwrap();
    let out = stdout_of(keytrace(dir.path()).args(["texts", "add", "Short"]).arg(&file).args(["--threshold", "3"]));
    assert!(out.contains("added text 2 (1 pages)"), "{out}");

    let good = dir.path().join("good.json");
    fs::write(&good, r#"{"break_patterns": [";"]}"#).unwrap();
    let out = stdout_of(keytrace(dir.path()).args(["texts", "edit", "2", "--patterns"]).arg(&good));
    assert!(out.contains("updated text 2 (4 pages)"), "{out}");

    let bad = dir.path().join("bad.json");
    fs::write(&bad, r#"{"break_patterns": ["(?<= "]}"#).unwrap();
    keytrace(dir.path())
        .args(["texts", "edit", "2", "--patterns"])
        .arg(&bad)
        .assert()
        .failure();
    keytrace(dir.path()).args(["texts", "edit", "9", "--threshold", "5"]).assert().failure();

    // the rejected edit left the working patterns in place
    let out = stdout_of(keytrace(dir.path()).arg("pages"));
    assert!(out.contains("    4  "), "{out}");
}

#[test]
fn empty_ledger_reports() {
    let dir = tempfile::tempdir().unwrap();

    let out = stdout_of(keytrace(dir.path()).arg("sequences"));
    assert!(out.contains("no sequences recorded yet"));

    let out = stdout_of(keytrace(dir.path()).args(["typos", "--csv"]));
    assert_eq!(out.lines().next(), Some("expected,typo_type,offending"));

    let out = stdout_of(keytrace(dir.path()).arg("typos"));
    assert!(out.contains("no typos"));
}

#[test]
fn unknown_sequence_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    keytrace(dir.path()).args(["show", "42"]).assert().failure();
    keytrace(dir.path()).args(["delete", "42"]).assert().failure();
}

#[test]
fn pages_without_active_text_fails() {
    let dir = tempfile::tempdir().unwrap();
    keytrace(dir.path()).arg("pages").assert().failure();
}
