//! Environment configuration persistence for skyrun.
//!
//! Provides the [`ConfigStore`] trait, a [`JsonFileStore`] backend for
//! the `~/.skyrun/config.json` document, and a [`MemoryStore`] for
//! tests.

pub mod backend;
pub mod error;
pub mod json_file;
pub mod memory;
pub mod region;

pub use backend::ConfigStore;
pub use error::{Result, StoreError};
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use region::resolve_region;
