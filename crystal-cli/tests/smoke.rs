use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use sha2::{Digest, Sha256};
use std::process::Command;

fn sha256_file(path: &std::path::Path) -> String {
    let mut h = Sha256::new();
    h.update(std::fs::read(path).unwrap());
    hex::encode(h.finalize())
}

#[test]
fn encode_verify_decode_happy_path() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("demo_data");
    data.create_dir_all().unwrap();
    data.child("a.txt").write_str("Hello World").unwrap();
    data.child("b.txt").write_str("Test content").unwrap();
    data.child("nested/c.bin").write_binary(&[7u8; 4096]).unwrap();

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args([
            "encode",
            "demo_data",
            "--out",
            "archive",
            "--profile",
            "A",
            "--seed",
            "42",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("merkle root"));

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args(["verify", "archive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("merkle OK"));

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args(["decode", "archive", "--out", "restored"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK "));

    for rel in ["a.txt", "b.txt", "nested/c.bin"] {
        assert_eq!(
            sha256_file(&data.child(rel).path().to_path_buf()),
            sha256_file(&td.child("restored").child(rel).path().to_path_buf()),
            "mismatch for {rel}"
        );
    }
}

#[test]
fn hard_decode_flag_works() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("src");
    data.create_dir_all().unwrap();
    data.child("f.txt").write_str("hard decision payload").unwrap();

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args(["encode", "src", "--out", "archive"])
        .assert()
        .success();

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args(["decode", "archive", "--out", "restored", "--hard"])
        .assert()
        .success();
}

#[test]
fn tampered_manifest_exits_uncorrectable() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("src");
    data.create_dir_all().unwrap();
    data.child("f.txt").write_str("tamper target").unwrap();

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args(["encode", "src", "--out", "archive"])
        .assert()
        .success();

    // Flip the recorded interleaver seed behind the self-hash's back.
    let mpath = td.child("archive/manifest.json").path().to_path_buf();
    let text = std::fs::read_to_string(&mpath).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
    value["encoding"]["interleaving"]["seed"] = serde_json::json!(1337);
    std::fs::write(&mpath, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args(["decode", "archive", "--out", "restored"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("manifest"));
}

#[test]
fn signed_archive_verifies() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("src");
    data.create_dir_all().unwrap();
    data.child("f.txt").write_str("signed payload").unwrap();

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args(["encode", "src", "--out", "archive", "--sign"])
        .assert()
        .success()
        .stdout(predicate::str::contains("public key"));

    Command::cargo_bin("crystal")
        .unwrap()
        .current_dir(td.path())
        .args(["verify", "archive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("signature OK"));
}

#[test]
fn simulate_reports_recovery_rate() {
    Command::cargo_bin("crystal")
        .unwrap()
        .args([
            "simulate",
            "--tile-loss",
            "0.05",
            "--bitflip",
            "0.0",
            "--runs",
            "1",
            "--seed",
            "7",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("recovery 1/1"));
}
