//! Purpose: Read-only access to the bundle of prebuilt libraries shipped with the loader.
//! Exports: `EmbeddedBundle`, `StaticBundle`, `DirBundle`, `sidecar_path`.
//! Role: Storage abstraction behind the artifact locator and the cache manager.
//! Invariants: Entry paths are `/`-separated and relative to the bundle root.
//! Invariants: A missing entry is `None`, never an error; callers decide what absence means.

use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

pub trait EmbeddedBundle {
    /// Opens an entry for streaming, `Ok(None)` when the bundle has no such entry.
    fn open(&self, entry: &str) -> io::Result<Option<Box<dyn Read + '_>>>;

    fn read_bytes(&self, entry: &str) -> io::Result<Option<Vec<u8>>> {
        let Some(mut reader) = self.open(entry)? else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }
}

pub fn entry_path(root: &str, filename: &str) -> String {
    format!("{root}/{filename}")
}

pub fn sidecar_path(root: &str, filename: &str) -> String {
    format!("{root}/{filename}.sha256")
}

/// Bundle compiled into the binary as `(entry, bytes)` pairs.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticBundle {
    entries: &'static [(&'static str, &'static [u8])],
}

impl StaticBundle {
    pub const fn new(entries: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|(name, _)| *name)
    }
}

impl EmbeddedBundle for StaticBundle {
    fn open(&self, entry: &str) -> io::Result<Option<Box<dyn Read + '_>>> {
        Ok(self
            .entries
            .iter()
            .find(|(name, _)| *name == entry)
            .map(|(_, bytes)| Box::new(Cursor::new(*bytes)) as Box<dyn Read>))
    }
}

/// Bundle laid out on disk with the same `<platform>/<file>` structure.
#[derive(Clone, Debug)]
pub struct DirBundle {
    root: PathBuf,
}

impl DirBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl EmbeddedBundle for DirBundle {
    fn open(&self, entry: &str) -> io::Result<Option<Box<dyn Read + '_>>> {
        let mut path = self.root.clone();
        path.extend(entry.split('/').filter(|part| !part.is_empty()));
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(Box::new(std::fs::File::open(&path)?))),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DirBundle, EmbeddedBundle, StaticBundle, sidecar_path};
    use std::io::Read;

    static ENTRIES: &[(&str, &[u8])] = &[
        ("linux_amd64/libx.so", b"\x7fELF"),
        ("linux_amd64/libx.so.sha256", b"  abc\n"),
    ];

    #[test]
    fn static_bundle_finds_entries() {
        let bundle = StaticBundle::new(ENTRIES);
        let mut bytes = Vec::new();
        bundle
            .open("linux_amd64/libx.so")
            .expect("open")
            .expect("entry")
            .read_to_end(&mut bytes)
            .expect("read");
        assert_eq!(bytes, b"\x7fELF");
        assert!(bundle.open("darwin_arm64/libx.dylib").expect("open").is_none());
        assert_eq!(bundle.entries().count(), 2);
    }

    #[test]
    fn dir_bundle_reads_sidecar_and_ignores_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("linux_amd64")).expect("mkdir");
        std::fs::write(temp.path().join("linux_amd64/libx.so.sha256"), "ff\n").expect("write");

        let bundle = DirBundle::new(temp.path());
        let bytes = bundle
            .read_bytes(&sidecar_path("linux_amd64", "libx.so"))
            .expect("read")
            .expect("sidecar");
        assert_eq!(bytes, b"ff\n");
        assert!(bundle.open("linux_amd64").expect("open").is_none());
        assert!(bundle.open("linux_amd64/libx.so").expect("open").is_none());
    }
}
