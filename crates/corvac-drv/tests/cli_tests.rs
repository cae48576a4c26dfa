//! CLI end-to-end tests for the `corvac` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn corvac() -> Command {
    Command::cargo_bin("corvac").expect("corvac binary")
}

#[test]
fn run_prints_the_last_top_level_value() {
    corvac()
        .arg("run")
        .arg("fun f1(): int = { 1 + 2 }; f1()")
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn run_reads_a_source_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "fun f(): int = {{ let a: array<int,3> = array<int>(1,2,3); a[2] }}; f()")
        .expect("write");

    corvac()
        .arg("run")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn bb_prints_the_cfg() {
    corvac()
        .arg("bb")
        .arg("fun f1(): int = { 1 + 2 }; f1()")
        .assert()
        .success()
        .stdout(predicate::str::contains("#bb0:root"))
        .stdout(predicate::str::contains("fun f1()"));
}

#[test]
fn llvm_prints_backend_ir() {
    corvac()
        .arg("llvm")
        .arg("fun f1(): int = { 1 + 2 }; f1()")
        .assert()
        .success()
        .stdout(predicate::str::contains("define i32 @f1()"))
        .stdout(predicate::str::contains("ret i32"));
}

#[test]
fn compile_error_exits_nonzero() {
    corvac()
        .arg("run")
        .arg("let a: int = 1; let a: int = 2")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("TYPE_REDECLARATION"));
}

#[test]
fn missing_arguments_exit_nonzero() {
    corvac().arg("run").assert().failure().code(1);
}

#[test]
fn unknown_subcommand_exits_nonzero() {
    corvac()
        .arg("explode")
        .arg("1")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown subcommand"));
}
