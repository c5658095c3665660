//! Removal of expired manifests from local storage.

use crate::scheduler::ExpiryHandler;
use async_trait::async_trait;
use pullthrough_core::{Reference, RegistryError, RepositoryStorage, Result};
use std::sync::Arc;
use tracing::debug;

/// [`ExpiryHandler`] that deletes expired manifests from local storage.
pub struct LocalEvictor {
    storage: Arc<dyn RepositoryStorage>,
}

impl LocalEvictor {
    /// Creates an evictor over `storage`.
    pub fn new(storage: Arc<dyn RepositoryStorage>) -> Self {
        Self { storage }
    }
}

impl std::fmt::Debug for LocalEvictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEvictor").finish_non_exhaustive()
    }
}

#[async_trait]
impl ExpiryHandler for LocalEvictor {
    async fn on_manifest_expire(&self, reference: &Reference) -> Result<()> {
        let digest = reference
            .digest()
            .ok_or_else(|| RegistryError::InvalidReference {
                reference: reference.to_string(),
            })?;

        match self.storage.manifests(reference.name()).delete(digest).await {
            Ok(()) => {
                debug!(reference = %reference, "Evicted manifest");
                Ok(())
            }
            // Already gone.
            Err(RegistryError::ManifestUnknown { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
