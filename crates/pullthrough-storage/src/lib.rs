//! # Pullthrough Storage
//!
//! Local storage backends for the Pullthrough registry cache.
//!
//! Both backends implement [`RepositoryStorage`](pullthrough_core::RepositoryStorage),
//! handing out per-repository [`ManifestService`](pullthrough_core::ManifestService)
//! and [`TagService`](pullthrough_core::TagService) instances:
//!
//! - [`MemoryStorage`] - process-local maps, for tests and ephemeral caches
//! - [`FsStorage`] - manifests and tag links on disk under a root directory

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod filesystem;
mod memory;

pub use filesystem::{FsManifestStore, FsStorage, FsTagStore, StorageConfig};
pub use memory::{MemoryManifestStore, MemoryStorage, MemoryTagStore};
