//! Purpose: Choose between the embedded and system-installed library per configured strategy.
//! Exports: `LoadStrategy`, `Resolver`, `Resolution`, `Source`.
//! Role: Composes platform identification, cache materialization, and system search.
//! Invariants: `Mixed` falls back to system search only when nothing is embedded;
//!             embedded integrity or I/O failures are never masked by the fallback.
//! Invariants: In `Mixed`, total failure reports the system-search error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::bundle::EmbeddedBundle;
use crate::core::cache::{CacheOutcome, materialize_embedded};
use crate::core::error::{Error, ErrorKind};
use crate::core::locate::{SearchPaths, system_search};
use crate::core::platform::PlatformKey;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LoadStrategy {
    #[default]
    Embedded,
    System,
    Mixed,
}

impl LoadStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::System => "system",
            Self::Mixed => "mixed",
        }
    }
}

impl FromStr for LoadStrategy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "embedded" => Ok(Self::Embedded),
            "system" => Ok(Self::System),
            "mixed" => Ok(Self::Mixed),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown library load strategy: {other:?}"))
                .with_hint("Use one of: embedded, system, mixed.")),
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Source {
    Embedded(CacheOutcome),
    System,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub path: PathBuf,
    pub source: Source,
    /// Verified digest; only known for embedded artifacts.
    pub hash: Option<String>,
    pub platform: PlatformKey,
}

pub struct Resolver<'a> {
    bundle: &'a dyn EmbeddedBundle,
    platform: PlatformKey,
    cache_root: PathBuf,
    search: SearchPaths,
}

impl<'a> Resolver<'a> {
    pub fn new(
        bundle: &'a dyn EmbeddedBundle,
        platform: PlatformKey,
        cache_root: PathBuf,
        search: SearchPaths,
    ) -> Self {
        Self {
            bundle,
            platform,
            cache_root,
            search,
        }
    }

    pub fn platform(&self) -> &PlatformKey {
        &self.platform
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn resolve(&self, strategy: LoadStrategy) -> Result<Resolution, Error> {
        tracing::debug!(%strategy, platform = %self.platform, "resolving library");
        match strategy {
            LoadStrategy::Embedded => self.embedded()?.ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!(
                        "library is not embedded for platform {}",
                        self.platform
                    ))
                    .with_hint("Use the system or mixed strategy to load an installed library.")
            }),
            LoadStrategy::System => self.system(),
            LoadStrategy::Mixed => match self.embedded()? {
                Some(resolution) => Ok(resolution),
                None => {
                    tracing::info!(
                        platform = %self.platform,
                        "no embedded library, falling back to system search"
                    );
                    self.system()
                }
            },
        }
    }

    fn embedded(&self) -> Result<Option<Resolution>, Error> {
        let materialized = materialize_embedded(self.bundle, &self.platform, &self.cache_root)?;
        Ok(materialized.map(|materialized| Resolution {
            path: materialized.path,
            source: Source::Embedded(materialized.outcome),
            hash: Some(materialized.hash),
            platform: self.platform,
        }))
    }

    fn system(&self) -> Result<Resolution, Error> {
        let path = system_search(&self.platform.library_filename(), &self.search)?;
        Ok(Resolution {
            path,
            source: Source::System,
            hash: None,
            platform: self.platform,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{LoadStrategy, Resolver, Source};
    use crate::core::bundle::{DirBundle, StaticBundle};
    use crate::core::cache::CacheOutcome;
    use crate::core::error::ErrorKind;
    use crate::core::locate::SearchPaths;
    use crate::core::platform::{Arch, Libc, Os, PlatformKey};
    use sha2::{Digest, Sha256};
    use std::path::Path;

    const PAYLOAD: &[u8] = b"embedded library bytes";

    fn key() -> PlatformKey {
        PlatformKey {
            os: Os::Linux,
            arch: Arch::Arm64,
            libc: Some(Libc::Musl),
        }
    }

    fn hex(bytes: &[u8]) -> String {
        Sha256::digest(bytes)
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }

    fn bundle_with_library(root: &Path) -> DirBundle {
        let dir = root.join("linux_arm64_musl");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("libturso_sync_sdk_kit.a"), PAYLOAD).expect("lib");
        std::fs::write(dir.join("libturso_sync_sdk_kit.a.sha256"), hex(PAYLOAD)).expect("hash");
        DirBundle::new(root)
    }

    fn search_in(dir: &Path) -> SearchPaths {
        SearchPaths::new(Os::Linux, None, dir.to_path_buf())
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("".parse::<LoadStrategy>().expect("empty"), LoadStrategy::Embedded);
        assert_eq!("embedded".parse::<LoadStrategy>().expect("e"), LoadStrategy::Embedded);
        assert_eq!("System".parse::<LoadStrategy>().expect("s"), LoadStrategy::System);
        assert_eq!(" mixed ".parse::<LoadStrategy>().expect("m"), LoadStrategy::Mixed);
        let err = "bundled".parse::<LoadStrategy>().expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(LoadStrategy::default(), LoadStrategy::Embedded);
    }

    #[test]
    fn embedded_without_artifact_is_not_found() {
        let cache = tempfile::tempdir().expect("cache");
        let bundle = StaticBundle::default();
        let resolver = Resolver::new(&bundle, key(), cache.path().into(), search_in(cache.path()));
        let err = resolver.resolve(LoadStrategy::Embedded).expect_err("absent");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.message().expect("message").contains("not embedded"));
    }

    #[test]
    fn embedded_resolves_same_path_twice() {
        let bundle_dir = tempfile::tempdir().expect("bundle");
        let cache = tempfile::tempdir().expect("cache");
        let bundle = bundle_with_library(bundle_dir.path());
        let resolver = Resolver::new(&bundle, key(), cache.path().into(), search_in(cache.path()));

        let first = resolver.resolve(LoadStrategy::Embedded).expect("first");
        let second = resolver.resolve(LoadStrategy::Embedded).expect("second");
        assert_eq!(first.path, second.path);
        assert_eq!(first.source, Source::Embedded(CacheOutcome::Extracted));
        assert_eq!(second.source, Source::Embedded(CacheOutcome::Reused));
        assert_eq!(second.hash.as_deref(), Some(hex(PAYLOAD).as_str()));
    }

    #[test]
    fn system_strategy_ignores_bundle() {
        let bundle_dir = tempfile::tempdir().expect("bundle");
        let cache = tempfile::tempdir().expect("cache");
        let system = tempfile::tempdir().expect("system");
        std::fs::write(system.path().join("libturso_sync_sdk_kit.a"), b"sys").expect("write");
        let bundle = bundle_with_library(bundle_dir.path());
        let resolver = Resolver::new(&bundle, key(), cache.path().into(), search_in(system.path()));

        let resolution = resolver.resolve(LoadStrategy::System).expect("system");
        assert_eq!(resolution.source, Source::System);
        assert_eq!(resolution.path, system.path().join("libturso_sync_sdk_kit.a"));
        assert!(!cache.path().join("turso-go").exists());
    }

    #[test]
    fn mixed_prefers_embedded() {
        let bundle_dir = tempfile::tempdir().expect("bundle");
        let cache = tempfile::tempdir().expect("cache");
        let system = tempfile::tempdir().expect("system");
        std::fs::write(system.path().join("libturso_sync_sdk_kit.a"), b"sys").expect("write");
        let bundle = bundle_with_library(bundle_dir.path());
        let resolver = Resolver::new(&bundle, key(), cache.path().into(), search_in(system.path()));

        let resolution = resolver.resolve(LoadStrategy::Mixed).expect("mixed");
        assert_eq!(resolution.source, Source::Embedded(CacheOutcome::Extracted));
    }

    #[test]
    fn mixed_falls_back_and_reports_system_error() {
        let cache = tempfile::tempdir().expect("cache");
        let bundle = StaticBundle::default();
        let resolver = Resolver::new(&bundle, key(), cache.path().into(), search_in(cache.path()));

        let err = resolver.resolve(LoadStrategy::Mixed).expect_err("nothing anywhere");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let message = err.message().expect("message");
        assert!(message.contains("LD_LIBRARY_PATH"), "{message}");
        assert!(!message.contains("not embedded"));

        std::fs::write(cache.path().join("libturso_sync_sdk_kit.a"), b"sys").expect("write");
        let resolution = resolver.resolve(LoadStrategy::Mixed).expect("fallback");
        assert_eq!(resolution.source, Source::System);
    }

    #[test]
    fn mixed_does_not_mask_corrupt_metadata() {
        let bundle_dir = tempfile::tempdir().expect("bundle");
        let cache = tempfile::tempdir().expect("cache");
        let dir = bundle_dir.path().join("linux_arm64_musl");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("libturso_sync_sdk_kit.a.sha256"), "deadbeef").expect("hash");
        std::fs::write(cache.path().join("libturso_sync_sdk_kit.a"), b"sys").expect("write");
        let bundle = DirBundle::new(bundle_dir.path());
        let resolver = Resolver::new(&bundle, key(), cache.path().into(), search_in(cache.path()));

        let err = resolver.resolve(LoadStrategy::Mixed).expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::CorruptMetadata);
    }
}
