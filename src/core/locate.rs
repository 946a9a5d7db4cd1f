//! Purpose: Locate the platform library in the embedded bundle or in system directories.
//! Exports: `open_embedded`, `SearchPaths`, `system_search`.
//! Role: Produces candidate artifacts; integrity checks happen in `core::cache`.
//! Invariants: Search order is the env var's directories in order, then the working directory.
//! Invariants: Environment is read only by `SearchPaths::from_env`; search itself is pure.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::core::bundle::{EmbeddedBundle, entry_path};
use crate::core::error::{Error, ErrorKind};
use crate::core::platform::{Os, PlatformKey};

/// Opens the bundle entry for `key`; `NotFound` means nothing is embedded for the platform.
pub fn open_embedded<'a>(
    bundle: &'a dyn EmbeddedBundle,
    key: &PlatformKey,
) -> Result<Box<dyn Read + 'a>, Error> {
    let entry = entry_path(&key.bundle_root(), &key.library_filename());
    match bundle.open(&entry) {
        Ok(Some(reader)) => Ok(reader),
        Ok(None) => Err(Error::new(ErrorKind::NotFound)
            .with_message(format!("library {entry} is not embedded for platform {key}"))),
        Err(err) => Err(Error::new(ErrorKind::Io)
            .with_message(format!("can't open embedded library {entry}"))
            .with_source(err)),
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchPaths {
    var: String,
    dirs: Vec<PathBuf>,
}

impl SearchPaths {
    /// Splits `value` on the OS separator and appends `cwd` as the last candidate.
    pub fn new(os: Os, value: Option<OsString>, cwd: PathBuf) -> Self {
        let mut dirs = value
            .as_deref()
            .map(|value| split_search_var(value, os.search_path_separator()))
            .unwrap_or_default();
        dirs.push(cwd);
        Self {
            var: os.search_path_var().to_string(),
            dirs,
        }
    }

    pub fn from_env(os: Os) -> Result<Self, Error> {
        let cwd = std::env::current_dir().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to get working directory")
                .with_source(err)
        })?;
        Ok(Self::new(os, std::env::var_os(os.search_path_var()), cwd))
    }

    pub fn var(&self) -> &str {
        &self.var
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

/// Splits without a UTF-8 round trip so non-UTF-8 directory names survive.
#[cfg(unix)]
fn split_search_var(value: &OsStr, separator: char) -> Vec<PathBuf> {
    use std::os::unix::ffi::OsStrExt;

    let separator = separator as u8;
    value
        .as_bytes()
        .split(|byte| *byte == separator)
        .filter(|dir| !dir.is_empty())
        .map(|dir| PathBuf::from(OsStr::from_bytes(dir)))
        .collect()
}

#[cfg(windows)]
fn split_search_var(value: &OsStr, separator: char) -> Vec<PathBuf> {
    use std::os::windows::ffi::{OsStrExt, OsStringExt};

    let separator = separator as u16;
    let wide: Vec<u16> = value.encode_wide().collect();
    wide.split(|unit| *unit == separator)
        .filter(|dir| !dir.is_empty())
        .map(|dir| PathBuf::from(OsString::from_wide(dir)))
        .collect()
}

#[cfg(not(any(unix, windows)))]
fn split_search_var(value: &OsStr, separator: char) -> Vec<PathBuf> {
    value
        .to_string_lossy()
        .split(separator)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub fn system_search(filename: &str, paths: &SearchPaths) -> Result<PathBuf, Error> {
    for dir in paths.dirs() {
        let candidate = dir.join(filename);
        if is_regular_file(&candidate) {
            tracing::debug!(path = %candidate.display(), "found system library");
            return Ok(candidate);
        }
    }
    Err(Error::new(ErrorKind::NotFound)
        .with_message(format!(
            "library file {filename} not found at paths listed in {} env var",
            paths.var()
        ))
        .with_hint(format!(
            "Add the directory containing {filename} to {} or run from that directory.",
            paths.var()
        )))
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file())
}
