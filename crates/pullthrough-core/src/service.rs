//! Capability contracts.
//!
//! The proxy resolvers are assembled from these traits: a pair of manifest
//! services and a pair of tag services (local and remote), plus the auth
//! challenger, eviction scheduler, and metrics sink collaborators.

use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::reference::{Reference, RepositoryName};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Per-request manifest options, forwarded unchanged between services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestOptions {
    /// Tag the digest was resolved from, if any.
    pub tag: Option<String>,

    /// Media types the caller accepts. Empty means every recognized type.
    pub accept: Vec<String>,

    /// Address a `put` stores the manifest under. `None` means the
    /// manifest's own sha256 digest.
    pub digest: Option<Digest>,
}

impl ManifestOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the tag the request was resolved from.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Restricts the accepted media types.
    #[must_use]
    pub fn with_accept(mut self, media_type: impl Into<String>) -> Self {
        self.accept.push(media_type.into());
        self
    }

    /// Stores the manifest under `digest` instead of its sha256 digest.
    #[must_use]
    pub fn with_digest(mut self, digest: Digest) -> Self {
        self.digest = Some(digest);
        self
    }

    /// Returns the address a `put` of `manifest` is stored under.
    #[must_use]
    pub fn storage_digest(&self, manifest: &Manifest) -> Digest {
        self.digest.clone().unwrap_or_else(|| manifest.digest())
    }
}

/// Manifest storage for one repository.
#[async_trait]
pub trait ManifestService: Send + Sync {
    /// Returns true if a manifest with this digest is stored.
    async fn exists(&self, digest: &Digest) -> Result<bool>;

    /// Retrieves the manifest identified by `digest`.
    async fn get(&self, digest: &Digest, options: &ManifestOptions) -> Result<Manifest>;

    /// Stores a manifest and returns its digest.
    async fn put(&self, manifest: &Manifest, options: &ManifestOptions) -> Result<Digest>;

    /// Removes the manifest identified by `digest`.
    async fn delete(&self, digest: &Digest) -> Result<()>;
}

/// Tag storage for one repository.
#[async_trait]
pub trait TagService: Send + Sync {
    /// Returns the descriptor currently bound to `tag`.
    async fn get(&self, tag: &str) -> Result<Descriptor>;

    /// Binds `tag` to `descriptor`, replacing any previous binding.
    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<()>;

    /// Removes the binding for `tag`.
    async fn untag(&self, tag: &str) -> Result<()>;

    /// Lists every tag name in the repository.
    async fn all(&self) -> Result<Vec<String>>;

    /// Lists the tags bound to `descriptor`.
    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>>;
}

/// Gate run before every call to the remote origin.
///
/// Implementations must be idempotent and safe to call concurrently.
#[async_trait]
pub trait AuthChallenger: Send + Sync {
    /// Establishes whatever challenge state remote calls need.
    async fn try_establish_challenges(&self) -> Result<()>;
}

/// Time-based eviction of cached entries.
pub trait EvictionScheduler: Send + Sync {
    /// Registers `reference` for removal once `ttl` has elapsed.
    ///
    /// Must not block beyond enqueueing the registration.
    fn add_manifest(&self, reference: &Reference, ttl: Duration);
}

/// Counters for manifest traffic through the proxy.
pub trait ProxyMetrics: Send + Sync {
    /// Records a manifest payload served to a caller.
    fn manifest_served(&self, bytes: u64);

    /// Records a manifest payload fetched from the remote origin.
    fn manifest_fetched(&self, bytes: u64);
}

/// Storage namespace handing out per-repository services.
pub trait RepositoryStorage: Send + Sync {
    /// Returns the manifest service for `name`.
    fn manifests(&self, name: &RepositoryName) -> Arc<dyn ManifestService>;

    /// Returns the tag service for `name`.
    fn tags(&self, name: &RepositoryName) -> Arc<dyn TagService>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_options_builder() {
        let options = ManifestOptions::new()
            .with_tag("latest")
            .with_accept("application/vnd.oci.image.manifest.v1+json");

        assert_eq!(options.tag.as_deref(), Some("latest"));
        assert_eq!(options.accept.len(), 1);
        assert_eq!(ManifestOptions::default(), ManifestOptions::new());
    }
}
