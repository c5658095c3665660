//! Per-repository assembly of the pull-through resolvers.

use crate::config::DEFAULT_EVICTION_TTL;
use crate::manifest_store::ProxyManifestStore;
use crate::tag_service::ProxyTagService;
use pullthrough_core::{
    AuthChallenger, EvictionScheduler, ManifestService, ProxyMetrics, RepositoryName,
    RepositoryStorage, TagService,
};
use std::sync::Arc;
use std::time::Duration;

/// Shared collaborators from which per-repository resolvers are built.
#[derive(Clone)]
pub struct ProxyRegistry {
    local: Arc<dyn RepositoryStorage>,
    remote: Arc<dyn RepositoryStorage>,
    challenger: Arc<dyn AuthChallenger>,
    scheduler: Arc<dyn EvictionScheduler>,
    metrics: Arc<dyn ProxyMetrics>,
    eviction_ttl: Duration,
}

impl ProxyRegistry {
    /// Creates a proxy registry over local storage and a remote origin.
    pub fn new(
        local: Arc<dyn RepositoryStorage>,
        remote: Arc<dyn RepositoryStorage>,
        challenger: Arc<dyn AuthChallenger>,
        scheduler: Arc<dyn EvictionScheduler>,
        metrics: Arc<dyn ProxyMetrics>,
    ) -> Self {
        Self {
            local,
            remote,
            challenger,
            scheduler,
            metrics,
            eviction_ttl: DEFAULT_EVICTION_TTL,
        }
    }

    /// Overrides the eviction horizon for every repository.
    #[must_use]
    pub const fn with_eviction_ttl(mut self, ttl: Duration) -> Self {
        self.eviction_ttl = ttl;
        self
    }

    /// Returns the eviction horizon.
    #[must_use]
    pub const fn eviction_ttl(&self) -> Duration {
        self.eviction_ttl
    }

    /// Builds the resolvers for `name`.
    #[must_use]
    pub fn repository(&self, name: &RepositoryName) -> ProxyRepository {
        let manifests = ProxyManifestStore::new(
            name.clone(),
            self.local.manifests(name),
            self.remote.manifests(name),
            Arc::clone(&self.challenger),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.metrics),
        )
        .with_ttl(self.eviction_ttl);

        let tags = ProxyTagService::new(
            self.local.tags(name),
            self.remote.tags(name),
            Arc::clone(&self.challenger),
        );

        ProxyRepository {
            name: name.clone(),
            manifests: Arc::new(manifests),
            tags: Arc::new(tags),
        }
    }
}

impl std::fmt::Debug for ProxyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRegistry")
            .field("eviction_ttl", &self.eviction_ttl)
            .finish_non_exhaustive()
    }
}

impl RepositoryStorage for ProxyRegistry {
    fn manifests(&self, name: &RepositoryName) -> Arc<dyn ManifestService> {
        self.repository(name).manifests
    }

    fn tags(&self, name: &RepositoryName) -> Arc<dyn TagService> {
        self.repository(name).tags
    }
}

/// The client-facing manifest and tag services of one repository.
#[derive(Clone)]
pub struct ProxyRepository {
    name: RepositoryName,
    manifests: Arc<dyn ManifestService>,
    tags: Arc<dyn TagService>,
}

impl ProxyRepository {
    /// Returns the repository name.
    #[must_use]
    pub const fn name(&self) -> &RepositoryName {
        &self.name
    }

    /// Returns the manifest resolver.
    #[must_use]
    pub fn manifests(&self) -> Arc<dyn ManifestService> {
        Arc::clone(&self.manifests)
    }

    /// Returns the tag resolver.
    #[must_use]
    pub fn tags(&self) -> Arc<dyn TagService> {
        Arc::clone(&self.tags)
    }
}

impl std::fmt::Debug for ProxyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRepository")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
