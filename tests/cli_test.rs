//! CLI end-to-end tests
//!
//! Tests for the clipgif command-line interface.

mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the clipgif binary
#[allow(deprecated)]
fn clipgif_cmd() -> Command {
    Command::cargo_bin("clipgif").unwrap()
}

#[test]
fn test_cli_help_flag() {
    clipgif_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("clipgif"))
        .stdout(predicate::str::contains("convert"));
}

#[test]
fn test_cli_version_flag() {
    clipgif_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("clipgif"));
}

#[test]
fn test_cli_no_args_fails() {
    clipgif_cmd()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_bad_loop_value_fails() {
    clipgif_cmd()
        .args(["convert", "a.mp4", "b.gif", "--loop", "3"])
        .assert()
        .code(1);
}

#[cfg(unix)]
#[test]
fn test_cli_missing_input_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    // `true` stands in for a working engine.
    std::fs::write(&config, r#"{"tools": {"ffmpeg_path": "/bin/true"}}"#).unwrap();

    clipgif_cmd()
        .arg("-c")
        .arg(&config)
        .arg("convert")
        .arg(dir.path().join("missing.mp4"))
        .arg(dir.path().join("out.gif"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("--help"));
}

#[test]
fn test_cli_validate_good_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"server": {"port": 9090}, "jobs": {"ttl_secs": 120}}"#).unwrap();

    clipgif_cmd()
        .arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"))
        .stdout(predicate::str::contains("9090"));
}

#[test]
fn test_cli_validate_bad_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, "{ not json").unwrap();

    clipgif_cmd().arg("validate").arg(&config).assert().code(1);
}

#[cfg(unix)]
#[test]
fn test_cli_check_tools_with_fake_engine() {
    let tools = common::FakeTools::new(common::Engine::Ok);
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    let json = serde_json::json!({
        "tools": { "ffmpeg_path": tools.ffmpeg, "ffprobe_path": tools.ffprobe }
    });
    std::fs::write(&config, json.to_string()).unwrap();

    clipgif_cmd()
        .arg("--config")
        .arg(&config)
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg version 6.1-fake"));
}

#[cfg(unix)]
#[test]
fn test_cli_convert_with_fake_engine() {
    let tools = common::FakeTools::new(common::Engine::Ok);
    let dir = tempdir().unwrap();
    let input = common::write_input(dir.path(), "clip.mp4");
    let output = dir.path().join("out.gif");
    let config = dir.path().join("config.json");
    let json = serde_json::json!({
        "tools": { "ffmpeg_path": tools.ffmpeg, "ffprobe_path": tools.ffprobe }
    });
    std::fs::write(&config, json.to_string()).unwrap();

    clipgif_cmd()
        .arg("-c")
        .arg(&config)
        .arg("convert")
        .arg(&input)
        .arg(&output)
        .args(["--width", "200", "--start", "1", "--duration", "2", "--loop", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("out.gif"));

    assert_eq!(std::fs::read(&output).unwrap(), b"GIF89a");
    let calls = tools.invocations();
    assert!(calls[1].contains("-loop 1"));
    assert!(calls[1].contains("min(200,iw)"));

    // A second run without --overwrite refuses to touch the file.
    clipgif_cmd()
        .arg("-c")
        .arg(&config)
        .arg("convert")
        .arg(&input)
        .arg(&output)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("exists"));
}
