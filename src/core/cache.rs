//! Purpose: Materialize the embedded library into a content-addressed on-disk cache.
//! Exports: `materialize_embedded`, `embedded_hash`, `parse_sidecar`, `resolve_cache_root`,
//!          `CacheEntry`, `CacheOutcome`, `Materialized`, `sha256_file`.
//! Role: Integrity gate between the read-only bundle and the native loader.
//! Invariants: Cache layout is `<root>/turso-go/<hash[0..8]>/<filename>`.
//! Invariants: A cached file is trusted only after its SHA-256 is recomputed and matches.
//! Invariants: Fresh copies are written to a temp file unique to the call, verified, then
//!             renamed, so the final path never holds partial or unverified bytes.
//! Invariants: Mismatches are surfaced as errors; nothing is repaired or retried.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::core::bundle::{EmbeddedBundle, sidecar_path};
use crate::core::error::{Error, ErrorKind};
use crate::core::locate::open_embedded;
use crate::core::platform::PlatformKey;

pub const CACHE_DIR_ENV: &str = "TURSO_GO_CACHE_DIR";
pub const CACHE_NAMESPACE: &str = "turso-go";

const HASH_HEX_LEN: usize = 64;
const HASH_PREFIX_LEN: usize = 8;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheOutcome {
    /// An existing cache file matched the declared hash; nothing was written.
    Reused,
    /// The artifact was copied out of the bundle and verified.
    Extracted,
}

impl CacheOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reused => "reused",
            Self::Extracted => "extracted",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    pub dir: PathBuf,
    pub path: PathBuf,
    pub hash: String,
}

impl CacheEntry {
    /// Directory is named by the first eight characters of `hash` (all of it when shorter).
    pub fn new(cache_root: &Path, hash: &str, filename: &str) -> Self {
        let prefix = hash.get(..HASH_PREFIX_LEN).unwrap_or(hash);
        let dir = cache_root.join(CACHE_NAMESPACE).join(prefix);
        let path = dir.join(filename);
        Self {
            dir,
            path,
            hash: hash.to_string(),
        }
    }

    /// `<filename>.<pid>.<n>.tmp`; `n` is process-wide so threads never share a temp file.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        name.push(format!(".{}.{n}.tmp", std::process::id()));
        self.dir.join(name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Materialized {
    pub path: PathBuf,
    pub hash: String,
    pub outcome: CacheOutcome,
}

/// Picks the cache root: explicit value, then `TURSO_GO_CACHE_DIR`, then the user cache
/// directory, then the temp directory.
pub fn resolve_cache_root(explicit: Option<PathBuf>) -> PathBuf {
    cache_root_from(
        explicit,
        std::env::var_os(CACHE_DIR_ENV),
        dirs::cache_dir(),
        std::env::temp_dir(),
    )
}

fn cache_root_from(
    explicit: Option<PathBuf>,
    env_value: Option<OsString>,
    user_cache: Option<PathBuf>,
    temp: PathBuf,
) -> PathBuf {
    explicit
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| env_value.filter(|value| !value.is_empty()).map(PathBuf::from))
        .or(user_cache)
        .unwrap_or(temp)
}

/// Validates sidecar contents and returns the lowercase digest.
pub fn parse_sidecar(text: &str) -> Result<String, Error> {
    let hash = text.trim();
    if hash.len() != HASH_HEX_LEN || !hash.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(Error::new(ErrorKind::CorruptMetadata)
            .with_message(format!("invalid sha256 hash embedded in the loader: {hash:?}")));
    }
    Ok(hash.to_ascii_lowercase())
}

/// Declared hash of the embedded artifact, `None` when the platform has no sidecar.
pub fn embedded_hash(
    bundle: &dyn EmbeddedBundle,
    key: &PlatformKey,
) -> Result<Option<String>, Error> {
    let entry = sidecar_path(&key.bundle_root(), &key.library_filename());
    let Some(bytes) = bundle.read_bytes(&entry).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("can't read embedded hash sidecar {entry}"))
            .with_source(err)
    })?
    else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&bytes).map_err(|err| {
        Error::new(ErrorKind::CorruptMetadata)
            .with_message(format!("embedded hash sidecar {entry} is not valid UTF-8"))
            .with_source(err)
    })?;
    parse_sidecar(text).map(Some)
}

/// Extracts (or revalidates) the embedded library for `key` under `cache_root`.
/// `Ok(None)` means the bundle carries nothing for this platform.
pub fn materialize_embedded(
    bundle: &dyn EmbeddedBundle,
    key: &PlatformKey,
    cache_root: &Path,
) -> Result<Option<Materialized>, Error> {
    let Some(hash) = embedded_hash(bundle, key)? else {
        tracing::debug!(platform = %key, "no embedded library for platform");
        return Ok(None);
    };
    let entry = CacheEntry::new(cache_root, &hash, &key.library_filename());
    create_cache_dir(&entry.dir)?;

    if let Some(reused) = revalidate(&entry)? {
        return Ok(Some(reused));
    }

    let reader = open_embedded(bundle, key).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            Error::new(ErrorKind::CorruptMetadata)
                .with_message("embedded hash sidecar has no matching library")
                .with_source(err)
        } else {
            err
        }
    })?;
    extract(&entry, reader)?;
    tracing::info!(path = %entry.path.display(), "extracted embedded library");
    Ok(Some(Materialized {
        path: entry.path,
        hash: entry.hash,
        outcome: CacheOutcome::Extracted,
    }))
}

fn create_cache_dir(dir: &Path) -> Result<(), Error> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(dir)
        .map_err(|err| Error::io("failed to create cache dir for library extraction", dir, err))
}

fn revalidate(entry: &CacheEntry) -> Result<Option<Materialized>, Error> {
    let len = match std::fs::metadata(&entry.path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(Error::io("unable to stat cached library", &entry.path, err));
        }
    };
    if len == 0 {
        return Ok(None);
    }

    let digest = sha256_file(&entry.path)?;
    if digest != entry.hash {
        tracing::warn!(
            path = %entry.path.display(),
            expected = %entry.hash,
            actual = %digest,
            "cached library hash mismatch"
        );
        return Err(Error::new(ErrorKind::HashMismatch)
            .with_message("cached library file hash sum mismatch")
            .with_path(&entry.path)
            .with_hash(&entry.hash, digest)
            .with_hint("Delete the cached file so it can be extracted again."));
    }
    tracing::debug!(path = %entry.path.display(), "reusing cached library");
    Ok(Some(Materialized {
        path: entry.path.clone(),
        hash: digest,
        outcome: CacheOutcome::Reused,
    }))
}

fn extract(entry: &CacheEntry, reader: Box<dyn Read + '_>) -> Result<(), Error> {
    let temp = entry.temp_path();
    let result = write_verified(entry, &temp, reader).and_then(|()| {
        std::fs::rename(&temp, &entry.path).map_err(|err| {
            Error::io("failed to move extracted library into place", &entry.path, err)
        })
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

fn write_verified(
    entry: &CacheEntry,
    temp: &Path,
    reader: Box<dyn Read + '_>,
) -> Result<(), Error> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp)
        .map_err(|err| Error::io("failed to create cache file on disk", temp, err))?;

    let mut hashing = HashingReader::new(reader);
    io::copy(&mut hashing, &mut file)
        .and_then(|_| file.flush())
        .and_then(|()| file.sync_all())
        .map_err(|err| Error::io("failed to write library to the cache file", temp, err))?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp, std::fs::Permissions::from_mode(0o755)).map_err(
            |err| Error::io("failed to change library cache file permissions to 0755", temp, err),
        )?;
    }

    let digest = hashing.finish();
    if digest != entry.hash {
        tracing::warn!(expected = %entry.hash, actual = %digest, "embedded library hash mismatch");
        return Err(Error::new(ErrorKind::HashMismatch)
            .with_message("embedded library file hash sum mismatch")
            .with_path(&entry.path)
            .with_hash(&entry.hash, digest));
    }
    Ok(())
}

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub fn sha256_file(path: &Path) -> Result<String, Error> {
    let file = File::open(path)
        .map_err(|err| Error::io("unable to read cached library to check hash", path, err))?;
    let mut hashing = HashingReader::new(file);
    io::copy(&mut hashing, &mut io::sink())
        .map_err(|err| Error::io("unable to validate cached library hash", path, err))?;
    Ok(hashing.finish())
}

/// Reader adapter that hashes every byte passing through it.
struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> String {
        to_hex(&self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
