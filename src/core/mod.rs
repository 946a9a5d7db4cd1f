// Resolution pipeline stages, leaf-first.
pub mod bundle;
pub mod cache;
pub mod error;
pub mod locate;
pub mod native;
pub mod platform;
pub mod strategy;
