//! End-to-end tests driving the `rillc` binary on script files.

use std::io::Write;
use std::process::Command;

fn rillc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rillc"))
}

#[test]
fn runs_a_script_and_prints_prefixed_output() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("smoke.smli");
    let mut file = std::fs::File::create(&path).expect("create script");
    writeln!(file, "1 + 2;").expect("write script");
    drop(file);

    let output = rillc().arg(&path).output().expect("binary runs");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    assert_eq!(stdout, "> val it = 3 : int\n");
}

#[test]
fn check_mode_passes_on_matching_golden_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("golden.smli");
    let mut file = std::fs::File::create(&path).expect("create script");
    write!(file, "1 + 2;\n> val it = 3 : int\n").expect("write script");
    drop(file);

    let output = rillc()
        .arg("--check")
        .arg(&path)
        .output()
        .expect("binary runs");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn check_mode_fails_on_divergence() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bad.smli");
    let mut file = std::fs::File::create(&path).expect("create script");
    write!(file, "1 + 2;\n> val it = 4 : int\n").expect("write script");
    drop(file);

    let output = rillc()
        .arg("--check")
        .arg(&path)
        .output()
        .expect("binary runs");
    assert!(!output.status.success());
}

#[test]
fn uncaught_exception_keeps_exit_code_zero() {
    // An uncaught ML exception aborts its declaration, not the process.
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("div.smli");
    let mut file = std::fs::File::create(&path).expect("create script");
    writeln!(file, "10 div 0;\n1 + 1;").expect("write script");
    drop(file);

    let output = rillc().arg(&path).output().expect("binary runs");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    assert!(stdout.contains("> uncaught exception Div"));
    assert!(stdout.contains("> val it = 2 : int"));
}
