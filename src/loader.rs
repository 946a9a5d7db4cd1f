//! Purpose: One-call entry points that resolve and open the native library.
//! Exports: `LoaderConfig`, `LoadedLibrary`, `resolve_library`, `load_library`, `*_with_bundle`.
//! Role: Fills unset configuration from the environment, then runs the resolution pipeline.
//! Invariants: Environment is read here and in `from_env` constructors only.
//! Invariants: Nothing is retried; the first failure is returned with its context.

use std::path::PathBuf;

use crate::core::bundle::EmbeddedBundle;
use crate::core::cache::resolve_cache_root;
use crate::core::error::Error;
use crate::core::locate::SearchPaths;
use crate::core::native::NativeHandle;
use crate::core::platform::{OsProbe, PlatformKey};
use crate::core::strategy::{LoadStrategy, Resolution, Resolver};

#[derive(Clone, Debug, Default)]
pub struct LoaderConfig {
    pub strategy: LoadStrategy,
    /// Overrides `TURSO_GO_CACHE_DIR` and the OS cache directory.
    pub cache_root: Option<PathBuf>,
    /// Overrides the `PATH`/`LD_LIBRARY_PATH` search list.
    pub search: Option<SearchPaths>,
    /// Skips platform detection; mostly useful for tooling and tests.
    pub platform: Option<PlatformKey>,
}

impl LoaderConfig {
    pub fn with_strategy(strategy: LoadStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct LoadedLibrary {
    pub resolution: Resolution,
    pub handle: NativeHandle,
}

/// Resolves the library path using the bundle compiled into this crate.
pub fn resolve_library(config: &LoaderConfig) -> Result<Resolution, Error> {
    resolve_library_with_bundle(&crate::embedded::bundle(), config)
}

pub fn resolve_library_with_bundle(
    bundle: &dyn EmbeddedBundle,
    config: &LoaderConfig,
) -> Result<Resolution, Error> {
    let platform = match config.platform {
        Some(platform) => platform,
        None => PlatformKey::detect(&OsProbe)?,
    };
    let search = match &config.search {
        Some(search) => search.clone(),
        None => SearchPaths::from_env(platform.os)?,
    };
    let cache_root = resolve_cache_root(config.cache_root.clone());
    Resolver::new(bundle, platform, cache_root, search).resolve(config.strategy)
}

/// Resolves and opens the library; the handle stays loaded for the rest of the process.
pub fn load_library(config: &LoaderConfig) -> Result<LoadedLibrary, Error> {
    load_library_with_bundle(&crate::embedded::bundle(), config)
}

pub fn load_library_with_bundle(
    bundle: &dyn EmbeddedBundle,
    config: &LoaderConfig,
) -> Result<LoadedLibrary, Error> {
    let resolution = resolve_library_with_bundle(bundle, config)?;
    let handle = NativeHandle::open(&resolution.path)?;
    tracing::info!(
        path = %resolution.path.display(),
        strategy = %config.strategy,
        "loaded native library"
    );
    Ok(LoadedLibrary { resolution, handle })
}
