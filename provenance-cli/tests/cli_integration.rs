//! CLI integration tests for provenance-cli.
//!
//! These tests verify the CLI behavior by running the actual binary
//! and checking outputs, exit codes, and file artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use tempfile::TempDir;

const SECRET: &str = "cli-integration-secret-0123456789abcdef";

/// Command for the provenance binary with a clean, colorless environment.
fn provenance(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("provenance").unwrap();
    cmd.current_dir(temp.path())
        .env("NO_COLOR", "1")
        .env("PROVENANCE_LEDGER_SECRET", SECRET)
        .env_remove("PROVENANCE_SECRET_FILE")
        .env_remove("PROVENANCE_LEDGER")
        .env_remove("PROVENANCE_STRENGTH")
        .env_remove("PROVENANCE_BLOCK_SIZE")
        .env_remove("PROVENANCE_PAYLOAD_BITS")
        .env_remove("RUST_LOG");
    cmd
}

/// Smooth test photo, saved as PNG.
fn write_test_image(dir: &Path, name: &str) -> PathBuf {
    let img = RgbImage::from_fn(256, 256, |x, y| {
        let (fx, fy) = (x as f64, y as f64);
        let base = 128.0
            + 45.0 * (fx / 37.0).sin() * (fy / 29.0).cos()
            + 20.0 * ((fx + 2.0 * fy) / 53.0).sin();
        Rgb([
            base.round() as u8,
            (0.9 * base + 10.0).round() as u8,
            (0.8 * base + 25.0).round() as u8,
        ])
    });
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Media watermarking, fingerprinting and provenance ledger",
        ))
        .stdout(predicate::str::contains("embed"))
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("fingerprint"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("ledger"));
}

#[test]
fn test_version_displays_version() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("provenance"));
}

#[test]
fn test_help_shows_exit_codes() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("65"))
        .stdout(predicate::str::contains("78"));
}

#[test]
fn test_embed_help_shows_options() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .args(["embed", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--id"))
        .stdout(predicate::str::contains("--strength"))
        .stdout(predicate::str::contains("--no-ledger"));
}

#[test]
fn test_ledger_help_lists_actions() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .args(["ledger", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("append"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("anchor"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn test_missing_file_returns_input_error() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .args(["embed", "nonexistent.png", "--id", "1"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_undecodable_file_returns_input_error() {
    let temp = TempDir::new().unwrap();
    let bogus = temp.path().join("bogus.png");
    fs::write(&bogus, b"not an image").unwrap();

    provenance(&temp)
        .args(["fingerprint", bogus.to_str().unwrap()])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to decode image"));
}

#[test]
fn test_missing_secret_returns_config_error() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .env_remove("PROVENANCE_LEDGER_SECRET")
        .args(["ledger", "verify"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("PROVENANCE_LEDGER_SECRET"));
}

#[test]
fn test_invalid_strength_returns_config_error() {
    let temp = TempDir::new().unwrap();
    let image = write_test_image(temp.path(), "photo.png");

    provenance(&temp)
        .args(["embed", image.to_str().unwrap(), "--id", "1", "--no-ledger"])
        .arg("--strength=0")
        .assert()
        .code(78);
}

#[test]
fn test_unknown_event_type_is_usage_error() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .args(["ledger", "append", "--event", "seal", "--payload"])
        .arg("00".repeat(32))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown event type"));
}

// ============================================================================
// Watermark Workflow
// ============================================================================

#[test]
fn test_embed_writes_output_next_to_input() {
    let temp = TempDir::new().unwrap();
    let image = write_test_image(temp.path(), "photo.png");

    provenance(&temp)
        .args(["embed", image.to_str().unwrap(), "--id", "42", "--no-ledger"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Watermark embedded"))
        .stdout(predicate::str::contains("PSNR"));

    assert!(temp.path().join("photo.wm.png").exists());
    assert!(!temp.path().join("provenance-ledger.ndjson").exists());
}

#[test]
fn test_embed_then_extract_roundtrip() {
    let temp = TempDir::new().unwrap();
    let image = write_test_image(temp.path(), "photo.png");
    let output = temp.path().join("marked.png");

    let report = json_stdout(provenance(&temp).args([
        "embed",
        image.to_str().unwrap(),
        "--id",
        "42",
        "--nonce",
        "7",
        "--no-ledger",
        "--json",
        "--output",
        output.to_str().unwrap(),
    ]));
    let payload = report["payload"].as_str().unwrap().to_string();
    assert!(report["metrics"]["psnr"].as_f64().unwrap() > 40.0);
    assert_eq!(report["ledger_index"], serde_json::Value::Null);

    let extracted = json_stdout(provenance(&temp).args([
        "extract",
        output.to_str().unwrap(),
        "--expect",
        payload.as_str(),
        "--json",
    ]));
    assert_eq!(extracted["payload"], payload.as_str());
    assert_eq!(extracted["identifier"], 42);
    assert_eq!(extracted["nonce"], 7);
    assert_eq!(extracted["agreement"], 1.0);
}

#[test]
fn test_extract_mismatch_returns_verification_error() {
    let temp = TempDir::new().unwrap();
    let image = write_test_image(temp.path(), "photo.png");

    provenance(&temp)
        .args(["embed", image.to_str().unwrap(), "--id", "42", "--no-ledger"])
        .assert()
        .success();

    provenance(&temp)
        .args(["extract", "photo.wm.png", "--expect"])
        .arg("ff".repeat(16))
        .assert()
        .code(65)
        .stderr(predicate::str::contains("does not match"));
}

// ============================================================================
// Fingerprint Workflow
// ============================================================================

#[test]
fn test_fingerprint_json() {
    let temp = TempDir::new().unwrap();
    let image = write_test_image(temp.path(), "photo.png");

    let record = json_stdout(provenance(&temp).args([
        "fingerprint",
        image.to_str().unwrap(),
        "--json",
    ]));
    assert_eq!(record["hash"]["algorithm"], "p_hash");
    assert_eq!(record["hash"]["bit_size"], 64);
    assert_eq!(record["levels"].as_array().unwrap().len(), 3);
}

#[test]
fn test_compare_watermarked_copy_is_near_duplicate() {
    let temp = TempDir::new().unwrap();
    let image = write_test_image(temp.path(), "photo.png");

    provenance(&temp)
        .args(["embed", image.to_str().unwrap(), "--id", "1", "--no-ledger"])
        .assert()
        .success();

    provenance(&temp)
        .args(["compare", "photo.png", "photo.wm.png", "--histogram"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Near-duplicate"));
}

// ============================================================================
// Ledger Workflow
// ============================================================================

#[test]
fn test_embed_records_ledger_entry() {
    let temp = TempDir::new().unwrap();
    let image = write_test_image(temp.path(), "photo.png");

    let report = json_stdout(provenance(&temp).args([
        "embed",
        image.to_str().unwrap(),
        "--id",
        "5",
        "--json",
    ]));
    assert_eq!(report["ledger_index"], 0);

    let ledger = fs::read_to_string(temp.path().join("provenance-ledger.ndjson")).unwrap();
    assert_eq!(ledger.lines().count(), 1);
    assert!(ledger.contains("\"event_type\":\"watermark_embed\""));
}

#[test]
fn test_ledger_append_verify_anchor() {
    let temp = TempDir::new().unwrap();
    let content = temp.path().join("asset.bin");
    fs::write(&content, b"some media bytes").unwrap();

    provenance(&temp)
        .args(["ledger", "append", "--event", "ingest", "--file"])
        .arg(&content)
        .assert()
        .success()
        .stdout(predicate::str::contains("Appended #0 ingest"));

    provenance(&temp)
        .args(["ledger", "append", "--event", "verification", "--payload"])
        .arg("ab".repeat(32))
        .assert()
        .success();

    provenance(&temp)
        .args(["ledger", "anchor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Batch anchored"))
        .stdout(predicate::str::contains("Anchor entry: #2"));

    provenance(&temp)
        .args(["ledger", "verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ledger intact"))
        .stdout(predicate::str::contains("Entries checked: 3"));
}

#[test]
fn test_tampered_ledger_returns_verification_error() {
    let temp = TempDir::new().unwrap();
    for _ in 0..3 {
        provenance(&temp)
            .args(["ledger", "append", "--event", "ingest", "--payload"])
            .arg("11".repeat(32))
            .assert()
            .success();
    }

    let path = temp.path().join("provenance-ledger.ndjson");
    let tampered = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 1 {
                line.replacen(&"11".repeat(32), &"12".repeat(32), 1)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";
    fs::write(&path, tampered).unwrap();

    let output = provenance(&temp)
        .args(["ledger", "verify", "--json"])
        .assert()
        .code(65)
        .get_output()
        .stdout
        .clone();
    let result: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(result["valid"], false);
    assert_eq!(result["first_invalid_index"], 1);
    assert_eq!(result["fault"]["kind"], "tag_mismatch");
}

#[test]
fn test_wrong_secret_fails_verification() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .args(["ledger", "append", "--event", "ingest", "--payload"])
        .arg("22".repeat(32))
        .assert()
        .success();

    provenance(&temp)
        .env("PROVENANCE_LEDGER_SECRET", "a-different-secret-of-enough-length")
        .args(["ledger", "verify"])
        .assert()
        .code(65)
        .stdout(predicate::str::contains("First invalid entry: 0"));
}

#[test]
fn test_secret_file_flag() {
    let temp = TempDir::new().unwrap();
    let secret = temp.path().join("ledger.key");
    fs::write(&secret, format!("{SECRET}\n")).unwrap();

    provenance(&temp)
        .env_remove("PROVENANCE_LEDGER_SECRET")
        .args(["--secret-file", secret.to_str().unwrap()])
        .args(["ledger", "append", "--event", "ingest", "--payload"])
        .arg("33".repeat(32))
        .assert()
        .success();

    // Same secret from the environment verifies the chain
    provenance(&temp)
        .args(["ledger", "verify"])
        .assert()
        .success();
}

#[test]
fn test_anchor_empty_ledger_fails() {
    let temp = TempDir::new().unwrap();
    provenance(&temp)
        .args(["ledger", "anchor"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("empty"));
}
