//! Binary-level tests for the `edgehub` command.

use assert_cmd::Command;
use edgehub_ca::RootOfTrust;
use predicates::prelude::*;
use std::path::Path;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let root = RootOfTrust::generate("cli test root").unwrap();
    let cert_path = dir.join("rootCA.crt");
    let key_path = dir.join("rootCA.key");
    std::fs::write(&cert_path, root.cert_pem()).unwrap();
    std::fs::write(&key_path, root.key_pair().serialize_pem()).unwrap();

    let config_path = dir.join("edgehub.toml");
    std::fs::write(
        &config_path,
        format!(
            "[ca]\ncert_path = {:?}\nkey_path = {:?}\n",
            cert_path.display().to_string(),
            key_path.display().to_string()
        ),
    )
    .unwrap();
    config_path
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("edgehub")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve").and(predicate::str::contains("token")));
}

#[test]
fn test_token_prints_jwt() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    Command::cargo_bin("edgehub")
        .unwrap()
        .args(["token", "--ttl-hours", "1", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[\w-]+\.[\w-]+\.[\w-]+\n$").unwrap());
}

#[test]
fn test_token_without_ca_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("edgehub.toml");
    std::fs::write(
        &config,
        "[ca]\ncert_path = \"/nonexistent/ca.crt\"\nkey_path = \"/nonexistent/ca.key\"\n",
    )
    .unwrap();

    Command::cargo_bin("edgehub")
        .unwrap()
        .args(["token", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load root of trust"));
}

#[test]
fn test_serve_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("edgehub.toml");
    std::fs::write(&config, "edge_cert_signing_days = 0\n").unwrap();

    Command::cargo_bin("edgehub")
        .unwrap()
        .args(["serve", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}
