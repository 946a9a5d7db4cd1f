//! Purpose: Resolve, cache, verify, and open the native Turso sync library.
//! Exports: `api` (stable surface), `core` (pipeline stages), `load_library`.
//! Role: Library backing the `turso-loader` CLI and host applications.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
//! Invariants: Environment variables are read only at the `loader` boundary.
pub mod api;
pub mod core;
mod embedded;
mod loader;

pub use loader::{
    LoadedLibrary, LoaderConfig, load_library, load_library_with_bundle, resolve_library,
    resolve_library_with_bundle,
};
