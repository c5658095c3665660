//! Pull-through manifest resolver.

use crate::config::DEFAULT_EVICTION_TTL;
use async_trait::async_trait;
use pullthrough_core::{
    AuthChallenger, Digest, EvictionScheduler, Manifest, ManifestOptions, ManifestService,
    ProxyMetrics, Reference, RegistryError, RepositoryName, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Manifest service that serves from local storage and falls back to the
/// remote origin on a miss.
///
/// Manifests fetched from the remote are written through to local storage
/// and registered with the eviction scheduler. Only the manifest reference
/// is scheduled; the blobs it points to are left to their own lifecycle.
pub struct ProxyManifestStore {
    repository: RepositoryName,
    local: Arc<dyn ManifestService>,
    remote: Arc<dyn ManifestService>,
    challenger: Arc<dyn AuthChallenger>,
    scheduler: Arc<dyn EvictionScheduler>,
    metrics: Arc<dyn ProxyMetrics>,
    ttl: Duration,
}

impl ProxyManifestStore {
    /// Creates a resolver for `repository` with the default eviction horizon.
    pub fn new(
        repository: RepositoryName,
        local: Arc<dyn ManifestService>,
        remote: Arc<dyn ManifestService>,
        challenger: Arc<dyn AuthChallenger>,
        scheduler: Arc<dyn EvictionScheduler>,
        metrics: Arc<dyn ProxyMetrics>,
    ) -> Self {
        Self {
            repository,
            local,
            remote,
            challenger,
            scheduler,
            metrics,
            ttl: DEFAULT_EVICTION_TTL,
        }
    }

    /// Overrides the eviction horizon for write-through manifests.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the repository this resolver serves.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// Returns the eviction horizon.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn cache_and_schedule(
        &self,
        digest: &Digest,
        manifest: &Manifest,
        options: &ManifestOptions,
    ) -> Result<()> {
        // Cached under the requested digest so lookups and eviction use one key.
        let options = options.clone().with_digest(digest.clone());
        self.local.put(manifest, &options).await?;

        // The local write stays committed if this fails.
        let reference = Reference::with_digest(&self.repository, digest).map_err(|e| {
            error!(
                repository = %self.repository,
                digest = %digest,
                error = %e,
                "Error creating reference"
            );
            e
        })?;

        self.scheduler.add_manifest(&reference, self.ttl);
        Ok(())
    }
}

impl std::fmt::Debug for ProxyManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyManifestStore")
            .field("repository", &self.repository)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ManifestService for ProxyManifestStore {
    async fn exists(&self, digest: &Digest) -> Result<bool> {
        if self.local.exists(digest).await? {
            return Ok(true);
        }

        self.challenger.try_establish_challenges().await?;
        self.remote.exists(digest).await
    }

    async fn get(&self, digest: &Digest, options: &ManifestOptions) -> Result<Manifest> {
        let (manifest, from_remote) = match self.local.get(digest, options).await {
            Ok(manifest) => {
                debug!(repository = %self.repository, digest = %digest, "Manifest cache hit");
                (manifest, false)
            }
            Err(e) => {
                debug!(
                    repository = %self.repository,
                    digest = %digest,
                    reason = %e,
                    "Manifest cache miss, fetching from remote"
                );
                self.challenger.try_establish_challenges().await?;
                (self.remote.get(digest, options).await?, true)
            }
        };

        let size = manifest.size();
        self.metrics.manifest_served(size);

        if from_remote {
            self.metrics.manifest_fetched(size);
            self.cache_and_schedule(digest, &manifest, options).await?;
        }

        Ok(manifest)
    }

    async fn put(&self, manifest: &Manifest, options: &ManifestOptions) -> Result<Digest> {
        match manifest {
            Manifest::Signed(_) | Manifest::Schema2(_) | Manifest::Oci(_) | Manifest::List(_) => {
                self.local.put(manifest, options).await
            }
            Manifest::Unrecognized(unrecognized) => Err(RegistryError::UnrecognizedManifestType {
                media_type: unrecognized.media_type.to_string(),
            }),
        }
    }

    async fn delete(&self, _digest: &Digest) -> Result<()> {
        Err(RegistryError::unsupported("delete manifest"))
    }
}
