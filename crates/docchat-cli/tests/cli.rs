use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("docchat")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("docs"));
}

#[test]
fn chat_requires_a_message() {
    Command::cargo_bin("docchat")
        .unwrap()
        .arg("chat")
        .assert()
        .failure();
}
