#[path = "../build.rs"]
#[allow(dead_code)]
mod build_script;

use build_script::{platform_roots, watched_dirs};

#[test]
fn missing_libs_dir_is_not_watched() {
    let temp = tempfile::tempdir().expect("tempdir");
    let libs = temp.path().join("libs");
    let roots = platform_roots("linux", "x86_64");
    assert!(watched_dirs(&libs, &roots).is_empty());
}

#[test]
fn only_existing_platform_dirs_are_watched() {
    let temp = tempfile::tempdir().expect("tempdir");
    let libs = temp.path().join("libs");
    std::fs::create_dir_all(libs.join("linux_amd64")).expect("mkdir");
    // A file with a platform's name is not a directory to watch.
    std::fs::write(libs.join("linux_amd64_musl"), b"").expect("write");

    let roots = platform_roots("linux", "x86_64");
    assert_eq!(roots, ["linux_amd64", "linux_amd64_musl"]);
    assert_eq!(watched_dirs(&libs, &roots), vec![libs.clone(), libs.join("linux_amd64")]);
}

#[test]
fn platform_roots_use_bundle_names() {
    assert_eq!(platform_roots("macos", "aarch64"), ["darwin_arm64"]);
    assert_eq!(platform_roots("windows", "x86"), ["windows_386"]);
}
