use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;

const DOUBLING_SOLUTION: &str = "#!/bin/sh\nread n\necho $((n * 2))\n";

const EXACT_CHECKER: &str = r#"#!/bin/sh
[ "$(cat "$2")" = "$(cat "$3")" ] || exit 1
"#;

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn task_dir(tests: &[(&str, &str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let testdir = dir.path().join("test");
    fs::create_dir(&testdir).unwrap();
    fs::create_dir(dir.path().join("Debug")).unwrap();

    write_script(&dir.path().join("Debug").join("solution"), DOUBLING_SOLUTION);
    write_script(&testdir.join("check"), EXACT_CHECKER);
    for (name, input, answer) in tests {
        fs::write(testdir.join(name), input).unwrap();
        fs::write(testdir.join(format!("{name}.a")), answer).unwrap();
    }
    dir
}

/// Runs the judge binary inside `dir`, as the grading harness does
fn run_arbiter(dir: &Path, extra_args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_arbiter"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(["--tools-dir", "."])
        .args(extra_args)
        .output()
        .unwrap()
}

/// Contents of the single `.res` file in `dir`, if any
fn persisted_verdict(dir: &Path) -> Option<String> {
    let mut results: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "res"))
        .collect();
    assert!(results.len() <= 1, "more than one result file: {results:?}");
    results.pop().map(|path| fs::read_to_string(path).unwrap())
}

#[test]
fn accepted_exits_zero() {
    let dir = task_dir(&[("01", "2\n", "4\n"), ("02", "3\n", "6\n")]);

    let output = run_arbiter(dir.path(), &[]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(persisted_verdict(dir.path()).as_deref(), Some("OK"));
    assert!(String::from_utf8_lossy(&output.stdout).contains("VERDICT: OK"));

    let log = fs::read_to_string(dir.path().join("arbiter.log")).unwrap();
    let staged: Vec<_> = log
        .lines()
        .filter(|line| line.contains("staging") && line.ends_with("putin1.txt"))
        .collect();
    assert_eq!(staged.len(), 2, "{log}");
    assert!(staged[0].contains("01 as"));
}

#[test]
fn wrong_answer_exits_rejected() {
    let dir = task_dir(&[("01", "2\n", "4\n"), ("02", "3\n", "7\n")]);

    let output = run_arbiter(dir.path(), &[]);

    assert_eq!(output.status.code(), Some(254));
    assert_eq!(persisted_verdict(dir.path()).as_deref(), Some("WA"));
}

#[test]
fn no_tests_exits_rejected() {
    let dir = task_dir(&[]);

    let output = run_arbiter(dir.path(), &[]);

    assert_eq!(output.status.code(), Some(254));
    assert_eq!(persisted_verdict(dir.path()).as_deref(), Some("NT"));
}

#[test]
fn unreadable_config_is_recorded_as_failure() {
    let dir = task_dir(&[("01", "2\n", "4\n")]);

    let output = run_arbiter(dir.path(), &["-c", "missing.json"]);

    assert_eq!(output.status.code(), Some(254));
    assert_eq!(persisted_verdict(dir.path()).as_deref(), Some("FL"));
}

#[test]
fn invalid_arguments_exit_catastrophic() {
    let dir = task_dir(&[("01", "2\n", "4\n")]);

    let output = run_arbiter(dir.path(), &["--no-such-flag"]);

    assert_eq!(output.status.code(), Some(255));
    assert_eq!(persisted_verdict(dir.path()), None);
}
