#![forbid(unsafe_code)]

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::Path;
use assert_cmd::Command;

fn yaca() -> Command {
    let mut cmd = Command::cargo_bin("yaca").unwrap();
    cmd.env_remove("YACA_CONFIG").env_remove("YACA_PASSWORD").env("YACA_LOG_LEVEL", "error");
    cmd
}

fn keygen(key_type: &str, length: &str, file_format: &str, out: &Path) {
    yaca()
        .args(["keygen", "--type", key_type, "--length", length, "--file-format", file_format, "--out"])
        .arg(out)
        .assert()
        .success();
}

#[test]
fn digest_of_stdin() {
    yaca()
        .args(["digest", "--algorithm", "sha256"])
        .write_stdin("abc")
        .assert()
        .success()
        .stdout("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\n");
}

#[test]
fn encrypt_then_decrypt() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("aes.key");
    keygen("symmetric", "256", "base64", &key);

    let out = yaca()
        .args(["encrypt", "--algorithm", "aes", "--mode", "cbc", "--key"])
        .arg(&key)
        .write_stdin("YACA")
        .output()
        .unwrap();
    assert!(out.status.success());
    let envelope = String::from_utf8(out.stdout).unwrap();
    assert!(envelope.contains("\"mode\": \"cbc\""));
    assert!(envelope.contains("\"iv\""));

    yaca().args(["decrypt", "--key"]).arg(&key).write_stdin(envelope).assert().success().stdout("YACA");
}

#[test]
fn des_family_uses_des_keys() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("3des.key");
    keygen("des", "192", "raw", &key);
    let out = yaca()
        .args(["encrypt", "--algorithm", "3des-3tdea", "--mode", "ecb", "--key"])
        .arg(&key)
        .write_stdin("eight by")
        .output()
        .unwrap();
    assert!(out.status.success());
    yaca().args(["decrypt", "--key"]).arg(&key).write_stdin(out.stdout).assert().success().stdout("eight by");
}

#[test]
fn seal_then_open() {
    let dir = tempfile::tempdir().unwrap();
    let private = dir.path().join("rsa.pem");
    let public = dir.path().join("rsa.pub.pem");
    keygen("rsa-private", "1024", "pem", &private);
    yaca()
        .args(["pubkey", "--type", "rsa-private", "--in"])
        .arg(&private)
        .arg("--out")
        .arg(&public)
        .assert()
        .success();

    let sealed = yaca()
        .args(["seal", "--algorithm", "aes", "--mode", "ctr", "--key-bits", "128", "--pubkey"])
        .arg(&public)
        .write_stdin("sealed payload")
        .output()
        .unwrap();
    assert!(sealed.status.success());
    yaca()
        .args(["open", "--key"])
        .arg(&private)
        .write_stdin(sealed.stdout)
        .assert()
        .success()
        .stdout("sealed payload");
}

#[test]
fn sign_and_verify_with_encrypted_ec_key() {
    let dir = tempfile::tempdir().unwrap();
    let private = dir.path().join("ec.pem");
    let public = dir.path().join("ec.pub.pem");
    let data = dir.path().join("msg.txt");
    std::fs::write(&data, b"signed message").unwrap();
    yaca()
        .args(["keygen", "--type", "ec-private", "--length", "prime256v1", "--format", "pkcs8"])
        .args(["--password", "hunter2", "--out"])
        .arg(&private)
        .assert()
        .success();
    yaca()
        .args(["pubkey", "--type", "ec-private", "--password", "hunter2", "--in"])
        .arg(&private)
        .arg("--out")
        .arg(&public)
        .assert()
        .success();

    yaca()
        .args(["sign", "--type", "ec-private", "--key"])
        .arg(&private)
        .arg("--in")
        .arg(&data)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid password"));

    let sig = yaca()
        .args(["sign", "--type", "ec-private", "--password", "hunter2", "--key"])
        .arg(&private)
        .arg("--in")
        .arg(&data)
        .output()
        .unwrap();
    assert!(sig.status.success());
    let sig = String::from_utf8(sig.stdout).unwrap();

    yaca()
        .args(["verify", "--type", "ec-public", "--signature", sig.trim(), "--key"])
        .arg(&public)
        .arg("--in")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\":true"));
    yaca()
        .args(["verify", "--type", "ec-public", "--signature", sig.trim(), "--key"])
        .arg(&public)
        .write_stdin("tampered")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"ok\":false"));
}

#[test]
fn unknown_descriptors_are_usage_errors() {
    yaca()
        .args(["digest", "--algorithm", "sha3"])
        .write_stdin("x")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown DigestAlgorithm"));
}
