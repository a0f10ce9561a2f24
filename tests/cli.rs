use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn kiln() -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("KILN_REGISTRY")
        .env_remove("KILN_DEPENDENCY_DIR");
    cmd
}

fn write_manifest(dir: &std::path::Path, body: &str) {
    std::fs::write(dir.join("package.json"), body).unwrap();
}

#[test]
fn test_version_flag() {
    kiln()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_init_creates_manifest() {
    let dir = tempdir().unwrap();

    kiln()
        .args(["init", "--yes", "--name", "demo-app", "--cwd"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("demo-app"));

    let raw = std::fs::read_to_string(dir.path().join("package.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(manifest["name"], "demo-app");
    assert_eq!(manifest["version"], "1.0.0");
}

#[test]
fn test_list_without_manifest_fails() {
    let dir = tempdir().unwrap();

    kiln()
        .arg("ls")
        .arg("--cwd")
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("kiln init"));
}

#[test]
fn test_list_reports_installed_versions() {
    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"{ "name": "app", "dependencies": { "left-pad": "^1.3.0", "missing": "*" } }"#,
    );
    let installed = dir.path().join("node_modules/left-pad");
    std::fs::create_dir_all(&installed).unwrap();
    std::fs::write(
        installed.join("package.json"),
        r#"{ "name": "left-pad", "version": "1.3.0" }"#,
    )
    .unwrap();

    let output = kiln()
        .args(["list", "--json", "--cwd"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let deps = listing["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 2);
    assert_eq!(deps[0]["name"], "left-pad");
    assert_eq!(deps[0]["installed"], "1.3.0");
    assert_eq!(deps[0]["satisfied"], true);
    assert_eq!(deps[1]["name"], "missing");
    assert!(deps[1]["installed"].is_null());
}

#[cfg(unix)]
#[test]
fn test_run_script_with_args() {
    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"{ "name": "app", "scripts": { "greet": "echo hello" } }"#,
    );

    kiln()
        .arg("--cwd")
        .arg(dir.path())
        .args(["run", "greet", "world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"));
}

#[cfg(unix)]
#[test]
fn test_run_finds_linked_executables() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"{ "name": "app", "scripts": { "hi": "kiln-fixture-hello" } }"#,
    );
    let bin = dir.path().join("node_modules/.bin");
    std::fs::create_dir_all(&bin).unwrap();
    let tool = bin.join("kiln-fixture-hello");
    std::fs::write(&tool, "#!/bin/sh\necho from-bin\n").unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    kiln()
        .arg("--cwd")
        .arg(dir.path())
        .args(["run", "hi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from-bin"));
}

#[cfg(unix)]
#[test]
fn test_failing_script_exits_one() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), r#"{ "name": "app", "scripts": { "boom": "exit 7" } }"#);

    kiln()
        .arg("--cwd")
        .arg(dir.path())
        .args(["run", "boom"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("boom"));
}

#[test]
fn test_run_unknown_script() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), r#"{ "name": "app", "scripts": { "build": "true" } }"#);

    kiln()
        .arg("--cwd")
        .arg(dir.path())
        .args(["run", "deploy"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Available scripts: build"));
}

#[test]
fn test_install_with_nothing_declared() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), r#"{ "name": "app" }"#);

    kiln()
        .args(["install", "--cwd"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No dependencies to install"));
}

#[test]
fn test_install_unreachable_registry_keeps_manifest_update() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), r#"{ "name": "app", "private": true }"#);

    kiln()
        .args(["install", "left-pad@^1.3.0", "--cwd"])
        .arg(dir.path())
        .env("KILN_REGISTRY", "http://127.0.0.1:9")
        .env("KILN_TIMEOUT", "5")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error:"));

    let raw = std::fs::read_to_string(dir.path().join("package.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(manifest["dependencies"]["left-pad"], "^1.3.0");
    assert_eq!(manifest["private"], true);
}

#[test]
fn test_uninstall_removes_entry_and_directory() {
    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"{ "name": "app", "dependencies": { "a": "^1.0.0", "b": "^2.0.0" } }"#,
    );
    let deps = dir.path().join("node_modules");
    std::fs::create_dir_all(deps.join("a")).unwrap();
    std::fs::create_dir_all(deps.join(".kiln/a@0.9.0")).unwrap();
    std::fs::create_dir_all(deps.join("b")).unwrap();
    std::fs::create_dir_all(deps.join(".bin")).unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("../a/cli.js", deps.join(".bin/a-cli")).unwrap();

    kiln()
        .args(["rm", "a", "--cwd"])
        .arg(dir.path())
        .assert()
        .success();

    assert!(!deps.join("a").exists());
    assert!(!deps.join(".kiln/a@0.9.0").exists());
    assert!(deps.join("b").exists());
    assert!(std::fs::symlink_metadata(deps.join(".bin/a-cli")).is_err());

    let raw = std::fs::read_to_string(dir.path().join("package.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(manifest["dependencies"].get("a").is_none());
    assert_eq!(manifest["dependencies"]["b"], "^2.0.0");
}
