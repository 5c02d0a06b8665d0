use std::io::Write;

use assert_cmd::Command;
use predicates::str::contains;

fn main_command() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).expect("couldn't find `blockcheck` binary")
}

#[test]
fn test_exclusive_help() {
    main_command()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("scan"))
        .stdout(contains("tune"));
}

#[test]
fn test_version() {
    main_command()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_requires_subcommand() {
    main_command().assert().failure();
}

#[test]
fn test_scan_missing_catalog() {
    main_command()
        .args(["scan", "--catalog", "/no/such/strategies.txt"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("catalog"));
}

#[test]
fn test_tune_missing_rules_file() {
    let mut catalog = tempfile::NamedTempFile::new().unwrap();
    writeln!(catalog, "https : --dpi-desync=fake").unwrap();

    main_command()
        .args([
            "tune",
            "--rules",
            "/no/such/rules.toml",
            "--catalog",
            &catalog.path().display().to_string(),
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("rules"));
}

#[test]
fn test_scan_with_broken_engine_reports_no_strategy() {
    let mut catalog = tempfile::NamedTempFile::new().unwrap();
    writeln!(catalog, "https : --dpi-desync=fake --dpi-desync-ttl=4").unwrap();
    let report = tempfile::NamedTempFile::new().unwrap();

    // An engine that exits immediately fails every trial; the run still
    // finishes with a summary and the dedicated exit code.
    main_command()
        .args([
            "scan",
            "--protocol",
            "https",
            "--engine",
            "false",
            "--domain",
            "unreachable.invalid",
            "--timeout",
            "0.25",
            "--catalog",
            &catalog.path().display().to_string(),
            "--report-file",
            &report.path().display().to_string(),
        ])
        .assert()
        .code(2)
        .stdout(contains("SUMMARY"));

    let written = std::fs::read_to_string(report.path()).unwrap();
    assert!(written.contains("SUMMARY"));
}

#[test]
fn test_invalid_protocol_rejected() {
    main_command()
        .args(["scan", "--protocol", "gopher"])
        .assert()
        .failure()
        .stderr(contains("invalid value"));
}
