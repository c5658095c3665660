//! Pull-through tag resolver.

use async_trait::async_trait;
use pullthrough_core::{AuthChallenger, Descriptor, RegistryError, Result, TagService};
use std::sync::Arc;
use tracing::debug;

/// Tag service that answers point lookups locally when it can and prefers
/// the remote origin for full enumeration.
///
/// Tag bindings are mutable at the origin; a cached binding is refreshed
/// only on the next local miss.
pub struct ProxyTagService {
    local: Arc<dyn TagService>,
    remote: Arc<dyn TagService>,
    challenger: Arc<dyn AuthChallenger>,
}

impl ProxyTagService {
    /// Creates a tag resolver over a local and a remote tag service.
    pub fn new(
        local: Arc<dyn TagService>,
        remote: Arc<dyn TagService>,
        challenger: Arc<dyn AuthChallenger>,
    ) -> Self {
        Self {
            local,
            remote,
            challenger,
        }
    }

    async fn remote_tags(&self) -> Result<Vec<String>> {
        self.challenger.try_establish_challenges().await?;
        self.remote.all().await
    }
}

impl std::fmt::Debug for ProxyTagService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTagService").finish_non_exhaustive()
    }
}

#[async_trait]
impl TagService for ProxyTagService {
    async fn get(&self, tag: &str) -> Result<Descriptor> {
        if let Ok(descriptor) = self.local.get(tag).await {
            return Ok(descriptor);
        }

        self.challenger.try_establish_challenges().await?;

        let descriptor = self.remote.get(tag).await?;
        self.local.tag(tag, &descriptor).await?;
        debug!(tag, digest = %descriptor.digest, "Cached remote tag binding");

        Ok(descriptor)
    }

    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<()> {
        self.local.tag(tag, descriptor).await
    }

    async fn untag(&self, tag: &str) -> Result<()> {
        self.local.untag(tag).await
    }

    async fn all(&self) -> Result<Vec<String>> {
        match self.remote_tags().await {
            Ok(tags) => Ok(tags),
            Err(e) => {
                debug!(error = %e, "Remote tag listing failed, using local tags");
                self.local.all().await
            }
        }
    }

    async fn lookup(&self, _descriptor: &Descriptor) -> Result<Vec<String>> {
        Err(RegistryError::unsupported("tag lookup"))
    }
}
