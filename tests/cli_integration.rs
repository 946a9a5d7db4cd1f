// CLI integration tests for platform/resolve/load flows.
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use sha2::{Digest, Sha256};
use turso_loader::api::{OsProbe, PlatformKey};

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_turso-loader");
    let mut command = Command::new(exe);
    command.env_remove("TURSO_GO_CACHE_DIR").env_remove("RUST_LOG");
    command
}

fn parse_json(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    serde_json::from_str(line).expect("valid json")
}

fn write_bundle(root: &Path, payload: &[u8]) -> (PlatformKey, String) {
    let key = PlatformKey::detect(&OsProbe).expect("supported test platform");
    let hash: String = Sha256::digest(payload)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    let dir = root.join(key.bundle_root());
    let filename = key.library_filename();
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join(&filename), payload).expect("lib");
    std::fs::write(dir.join(format!("{filename}.sha256")), &hash).expect("hash");
    (key, hash)
}

#[test]
fn platform_reports_filename_and_root() {
    let output = cmd().arg("platform").output().expect("platform");
    assert!(output.status.success());
    let value = parse_json(&output.stdout);
    let key = PlatformKey::detect(&OsProbe).expect("key");
    assert_eq!(value["filename"], key.library_filename());
    assert_eq!(value["bundle_root"], key.bundle_root());
}

#[test]
fn resolve_extracts_then_reuses() {
    let bundle = tempfile::tempdir().expect("bundle");
    let cache = tempfile::tempdir().expect("cache");
    let (key, hash) = write_bundle(bundle.path(), b"payload");

    let run = || {
        cmd()
            .env("TURSO_GO_CACHE_DIR", cache.path())
            .args(["resolve", "--bundle-dir"])
            .arg(bundle.path())
            .output()
            .expect("resolve")
    };

    let first = run();
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let first_json = parse_json(&first.stdout);
    assert_eq!(first_json["source"], "embedded");
    assert_eq!(first_json["cache"], "extracted");
    assert_eq!(first_json["sha256"], hash.as_str());
    let expected = cache
        .path()
        .join("turso-go")
        .join(&hash[..8])
        .join(key.library_filename());
    assert_eq!(first_json["path"], expected.display().to_string());

    let second = run();
    assert!(second.status.success());
    let second_json = parse_json(&second.stdout);
    assert_eq!(second_json["cache"], "reused");
    assert_eq!(second_json["path"], first_json["path"]);
}

#[test]
fn corrupt_sidecar_exits_with_json_error() {
    let bundle = tempfile::tempdir().expect("bundle");
    let cache = tempfile::tempdir().expect("cache");
    let (key, _) = write_bundle(bundle.path(), b"payload");
    let sidecar = bundle
        .path()
        .join(key.bundle_root())
        .join(format!("{}.sha256", key.library_filename()));
    std::fs::write(&sidecar, "abc123").expect("corrupt");

    let output = cmd()
        .args(["resolve", "--bundle-dir"])
        .arg(bundle.path())
        .arg("--cache-dir")
        .arg(cache.path())
        .output()
        .expect("resolve");
    assert_eq!(output.status.code(), Some(5));
    let err = parse_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "CorruptMetadata");
}

#[test]
fn load_of_non_library_is_load_error() {
    let bundle = tempfile::tempdir().expect("bundle");
    let cache = tempfile::tempdir().expect("cache");
    write_bundle(bundle.path(), b"definitely not a shared object");

    let output = cmd()
        .args(["load", "--bundle-dir"])
        .arg(bundle.path())
        .arg("--cache-dir")
        .arg(cache.path())
        .output()
        .expect("load");
    assert_eq!(output.status.code(), Some(8));
    let err = parse_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "Load");
    assert!(err["error"]["path"].as_str().expect("path").contains("turso-go"));
}

#[test]
fn system_strategy_without_install_is_not_found() {
    let cache = tempfile::tempdir().expect("cache");
    let output = cmd()
        .current_dir(cache.path())
        .env("LD_LIBRARY_PATH", cache.path())
        .args(["resolve", "--strategy", "system"])
        .output()
        .expect("resolve");
    assert_eq!(output.status.code(), Some(3));
    let err = parse_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");
}
