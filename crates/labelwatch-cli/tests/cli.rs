// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use assert_cmd::Command;

#[test]
fn test_help_lists_commands() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("labelwatch")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("login"))
        .stdout(predicates::str::contains("projects"))
        .stdout(predicates::str::contains("watch"));
    Ok(())
}

#[test]
fn test_watch_help_lists_thresholds() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("labelwatch")?;
    cmd.args(["watch", "--help"]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("--iou-threshold"))
        .stdout(predicates::str::contains("--score-threshold"))
        .stdout(predicates::str::contains("--once"));
    Ok(())
}

#[test]
fn test_watch_rejects_invalid_project_id() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("labelwatch")?;
    // Closed port so nothing is ever fetched; the ID is rejected first
    cmd.args(["--server", "http://127.0.0.1:1", "watch", "not-a-number"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Invalid project ID"));
    Ok(())
}

#[test]
fn test_projects_fails_on_unreachable_server() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("labelwatch")?;
    cmd.env("LABELWATCH_MAX_RETRIES", "0");
    cmd.args(["--server", "http://127.0.0.1:1", "projects"]);
    cmd.assert().failure();
    Ok(())
}
