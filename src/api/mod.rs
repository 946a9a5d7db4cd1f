//! Purpose: Define the stable public Rust API boundary for the loader.
//! Exports: Strategy/config types, resolution results, the native handle, and errors.
//! Role: Public, additive-only surface used by host applications and the CLI.
//! Invariants: Everything a caller needs to load the library is reachable from here.

pub use crate::core::bundle::{DirBundle, EmbeddedBundle, StaticBundle};
pub use crate::core::cache::{CACHE_DIR_ENV, CACHE_NAMESPACE, CacheOutcome, sha256_file};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::locate::SearchPaths;
pub use crate::core::native::NativeHandle;
pub use crate::core::platform::{Arch, EnvProbe, Libc, Os, OsProbe, PlatformKey};
pub use crate::core::strategy::{LoadStrategy, Resolution, Resolver, Source};
pub use crate::embedded::bundle as compiled_bundle;
pub use crate::loader::{
    LoadedLibrary, LoaderConfig, load_library, load_library_with_bundle, resolve_library,
    resolve_library_with_bundle,
};
