//! # Pullthrough Core
//!
//! Core types and capability contracts for the Pullthrough registry cache.
//!
//! This crate provides the data model shared by every other Pullthrough
//! crate:
//!
//! - [`Digest`] - Content-derived identity of a payload
//! - [`Descriptor`] - Digest, size and media type of a piece of content
//! - [`Manifest`] - Closed set of recognized manifest variants
//! - [`Reference`] - Repository name combined with a tag or digest
//! - [`RegistryError`] - The single error type every capability reports
//!
//! and the capability traits the proxy is composed from:
//! [`ManifestService`], [`TagService`], [`AuthChallenger`],
//! [`EvictionScheduler`], [`ProxyMetrics`] and [`RepositoryStorage`].
//!
//! ## Example
//!
//! ```rust
//! use pullthrough_core::{Digest, Reference, RepositoryName};
//!
//! let name = RepositoryName::parse("lib/app")?;
//! let reference = Reference::with_digest(&name, &Digest::from_bytes(b"{}"))?;
//! assert!(reference.to_string().starts_with("lib/app@sha256:"));
//! # Ok::<(), pullthrough_core::RegistryError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod descriptor;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod reference;
pub mod service;

pub use descriptor::{Descriptor, MediaType, Platform};
pub use digest::Digest;
pub use error::{RegistryError, Result};
pub use manifest::{
    FsLayer, History, ImageManifest, Manifest, ManifestList, OciManifest, SignedManifest,
    UnrecognizedManifest,
};
pub use reference::{Reference, RepositoryName};
pub use service::{
    AuthChallenger, EvictionScheduler, ManifestOptions, ManifestService, ProxyMetrics,
    RepositoryStorage, TagService,
};
