//! CLI surface tests: verbs, exit codes, and isolation under overridden
//! XDG base directories.

use assert_cmd::Command;
use predicates::prelude::*;

fn command(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("app-manager").expect("binary builds");
    cmd.env("HOME", home)
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_RUNTIME_DIR", home.join("runtime"))
        .env_remove("APPIMAGE");
    cmd
}

#[test]
fn help_names_the_fixed_verbs() {
    let tmp = tempfile::tempdir().unwrap();
    command(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--install"))
        .stdout(predicate::str::contains("--uninstall"))
        .stdout(predicate::str::contains("--is-installed"))
        .stdout(predicate::str::contains("--background-update"));
}

#[test]
fn version_prints_and_exits_zero() {
    let tmp = tempfile::tempdir().unwrap();
    command(tmp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn no_arguments_reports_empty_registry() {
    let tmp = tempfile::tempdir().unwrap();
    command(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 bundle(s) installed"));
}

#[test]
fn is_installed_on_missing_bundle_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    command(tmp.path())
        .args(["--is-installed", "/nonexistent/bundle.AppImage"])
        .assert()
        .code(5);
}

#[test]
fn uninstall_of_unknown_target_exits_three() {
    let tmp = tempfile::tempdir().unwrap();
    command(tmp.path())
        .args(["uninstall", "/nonexistent/target"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no installed bundle"));
}

#[test]
fn install_of_missing_bundle_exits_two() {
    let tmp = tempfile::tempdir().unwrap();
    command(tmp.path())
        .args(["install", "/nonexistent/bundle.AppImage"])
        .assert()
        .code(2);
}

#[test]
fn conflicting_flags_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    command(tmp.path())
        .args(["--install", "/a", "--uninstall", "/b"])
        .assert()
        .failure();
}
