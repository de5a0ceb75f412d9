use std::fs;
use std::path::PathBuf;

use predicates::prelude::*;
use siggen::commands::SinkRecord;
use tempfile::tempdir;

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
        .display()
        .to_string()
}

/// A subcommand is required.
#[test]
fn bare_invocation_prints_usage_and_fails() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn list_dialects_shows_limits() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .arg("list-dialects")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dialects (3):"))
        .stdout(predicate::str::contains("clamav (id 2) max jump 65535 bytes"))
        .stdout(predicate::str::contains("generic (id 1) no jump limit"));
}

#[test]
fn list_dialects_json_is_parseable() {
    let output = assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["list-dialects", "--json"])
        .output()
        .expect("run list-dialects");
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(parsed[2]["name"], "yara");
    assert_eq!(parsed[2]["max_jump"], 32767);
    assert!(parsed[0]["max_jump"].is_null());
}

#[test]
fn validate_policy_prints_summary() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["validate-policy", "--policy", &fixture("trimmed.yaml")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Policy OK"))
        .stdout(predicate::str::contains("Selection: similar (min similarity 0.9)"))
        .stdout(predicate::str::contains("Trim: 9 bytes via weighted"))
        .stdout(predicate::str::contains("Groups: nightly"));
}

#[test]
fn validate_policy_rejects_filter_without_addresses() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["validate-policy", "--policy", &fixture("invalid.yaml")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is invalid"))
        .stderr(predicate::str::contains("filtered_functions"));
}

#[test]
fn validate_policy_fails_for_missing_file() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["validate-policy", "--policy", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file does not exist"));
}

#[test]
fn generate_clamav_line() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["generate", "--policy", &fixture("generic.yaml"), "--matches", &fixture("matches.json")])
        .assert()
        .success()
        .stdout(predicate::str::diff("Test.Generic:0:*:554889e5{4-6}e810000000{1}c3909090\n"));
}

#[test]
fn generate_trimmed_yara_rule() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["generate", "--policy", &fixture("trimmed.yaml")])
        .args(["--matches", &fixture("matches.json"), "--dialect", "yara"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rule Win_Trojan_Agent_1 : trojan win32"))
        .stdout(predicate::str::contains("author = \"analyst\""))
        .stdout(predicate::str::contains("$sig = { 55 48 89 E5 [4-6] E8 10 00 00 00 }"));
}

#[test]
fn generate_batch_json_keeps_order() {
    let output = assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["generate", "--dialect", "generic", "--json"])
        .args(["--policy", &fixture("generic.yaml"), "--policy", &fixture("quiet.json")])
        .args(["--matches", &fixture("matches.json")])
        .output()
        .expect("run generate");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["dialect"], "generic");
    assert_eq!(report["signatures"][0]["policy"]["detection_name"], "Test.Generic");
    assert_eq!(report["signatures"][1]["policy"]["detection_name"], "Test.Quiet");
    assert_eq!(report["signatures"][1]["body"]["dialect"], "generic");
    assert_eq!(report["failures"].as_array().map(Vec::len), Some(0));
    assert_eq!(report["matches_sha256"].as_str().map(str::len), Some(64));
}

#[test]
fn generate_out_skips_unpublishable_policies() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("signatures.jsonl");

    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["generate", "--policy", &fixture("generic.yaml"), "--policy", &fixture("quiet.json")])
        .args(["--matches", &fixture("matches.json")])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Test.Quiet:0:*:554889e5{6}e810000000{1}c3909090"));

    let body = fs::read_to_string(&out).expect("read out");
    let records: Vec<SinkRecord> =
        body.lines().map(|line| serde_json::from_str(line).expect("record")).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].variant_id, 2);
    assert_eq!(records[0].signature.policy.detection_name, "Test.Generic");
    assert_eq!(records[0].text, "Test.Generic:0:*:554889e5{4-6}e810000000{1}c3909090");
}

#[test]
fn generate_reports_failed_policies_and_exits_non_zero() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["generate", "--policy", &fixture("missing_item.yaml"), "--policy", &fixture("generic.yaml")])
        .args(["--matches", &fixture("matches.json")])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Test.Generic:0:*:"))
        .stderr(predicate::str::contains("Test.Missing"))
        .stderr(predicate::str::contains("1 of 2 policies failed"));
}

#[test]
fn generate_rejects_unknown_dialect() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["generate", "--policy", &fixture("generic.yaml"), "--matches", &fixture("matches.json")])
        .args(["--dialect", "snort"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown dialect"));
}

#[test]
fn generate_honors_jump_limit_override() {
    assert_cmd::cargo::cargo_bin_cmd!("siggen")
        .args(["generate", "--policy", &fixture("generic.yaml"), "--matches", &fixture("matches.json")])
        .args(["--clamav-max-jump", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds the clamav maximum of 4 bytes"));
}
