//! Purpose: Compile the prebuilt libraries for the target platform into the loader.
//! Role: Cargo build-script; writes `embedded_libs.rs` (a static entry table) into `OUT_DIR`.
//! Invariants: Only `libs/<os>_<arch>` (plus `_musl` on Linux) for the compile target is embedded.
//! Invariants: A missing libs directory produces an empty table, never a build failure.
//! Invariants: Only directories that exist are passed to `rerun-if-changed`.
//! Invariants: Uses only Cargo-provided env vars plus the optional `TURSO_LOADER_LIBS_DIR`.
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let libs_dir = env::var_os("TURSO_LOADER_LIBS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("libs"));

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let roots = platform_roots(&target_os, &target_arch);

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=TURSO_LOADER_LIBS_DIR");
    for dir in watched_dirs(&libs_dir, &roots) {
        println!("cargo:rerun-if-changed={}", dir.display());
    }

    let mut entries = Vec::new();
    for root in &roots {
        collect_entries(root, &libs_dir.join(root), &mut entries);
    }
    entries.sort();

    let mut table = String::from("pub(crate) static EMBEDDED_LIBS: &[(&str, &[u8])] = &[\n");
    for (entry, path) in &entries {
        println!("cargo:rerun-if-changed={}", path.display());
        let _ = writeln!(
            table,
            "    ({entry:?}, include_bytes!({:?})),",
            path.display().to_string()
        );
    }
    table.push_str("];\n");

    fs::write(out_dir.join("embedded_libs.rs"), table).expect("failed to write embedded_libs.rs");
}

pub(crate) fn platform_roots(target_os: &str, target_arch: &str) -> Vec<String> {
    let os = match target_os {
        "macos" => "darwin",
        other => other,
    };
    let arch = match target_arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    };
    let base = format!("{os}_{arch}");
    if os == "linux" {
        vec![base.clone(), format!("{base}_musl")]
    } else {
        vec![base]
    }
}

/// The libs directory and its platform subdirectories, skipping any that do not exist.
pub(crate) fn watched_dirs(libs_dir: &Path, roots: &[String]) -> Vec<PathBuf> {
    std::iter::once(libs_dir.to_path_buf())
        .chain(roots.iter().map(|root| libs_dir.join(root)))
        .filter(|dir| dir.is_dir())
        .collect()
}

fn collect_entries(root: &str, dir: &Path, entries: &mut Vec<(String, PathBuf)>) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };
    for item in read_dir.flatten() {
        let path = item.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        entries.push((format!("{root}/{name}"), path.clone()));
    }
}
