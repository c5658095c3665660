//! In-memory storage.

use async_trait::async_trait;
use parking_lot::RwLock;
use pullthrough_core::{
    Descriptor, Digest, Manifest, ManifestOptions, ManifestService, RegistryError,
    RepositoryName, RepositoryStorage, Result, TagService,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct RepositoryState {
    manifests: RwLock<HashMap<Digest, Manifest>>,
    tags: RwLock<HashMap<String, Descriptor>>,
}

/// Process-local storage keeping every repository in memory.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    repositories: Arc<RwLock<HashMap<RepositoryName, Arc<RepositoryState>>>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the manifest store for `name`.
    #[must_use]
    pub fn manifest_store(&self, name: &RepositoryName) -> MemoryManifestStore {
        MemoryManifestStore {
            state: self.repository(name),
        }
    }

    /// Returns the tag store for `name`.
    #[must_use]
    pub fn tag_store(&self, name: &RepositoryName) -> MemoryTagStore {
        MemoryTagStore {
            state: self.repository(name),
        }
    }

    fn repository(&self, name: &RepositoryName) -> Arc<RepositoryState> {
        if let Some(state) = self.repositories.read().get(name) {
            return Arc::clone(state);
        }
        Arc::clone(self.repositories.write().entry(name.clone()).or_default())
    }
}

impl RepositoryStorage for MemoryStorage {
    fn manifests(&self, name: &RepositoryName) -> Arc<dyn ManifestService> {
        Arc::new(self.manifest_store(name))
    }

    fn tags(&self, name: &RepositoryName) -> Arc<dyn TagService> {
        Arc::new(self.tag_store(name))
    }
}

/// Manifest store for one in-memory repository.
#[derive(Debug, Clone)]
pub struct MemoryManifestStore {
    state: Arc<RepositoryState>,
}

impl MemoryManifestStore {
    /// Returns the number of stored manifests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.manifests.read().len()
    }

    /// Returns true if no manifests are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.manifests.read().is_empty()
    }
}

#[async_trait]
impl ManifestService for MemoryManifestStore {
    async fn exists(&self, digest: &Digest) -> Result<bool> {
        Ok(self.state.manifests.read().contains_key(digest))
    }

    async fn get(&self, digest: &Digest, _options: &ManifestOptions) -> Result<Manifest> {
        self.state
            .manifests
            .read()
            .get(digest)
            .cloned()
            .ok_or_else(|| RegistryError::ManifestUnknown {
                digest: digest.to_string(),
            })
    }

    async fn put(&self, manifest: &Manifest, options: &ManifestOptions) -> Result<Digest> {
        let digest = options.storage_digest(manifest);
        self.state
            .manifests
            .write()
            .insert(digest.clone(), manifest.clone());
        Ok(digest)
    }

    async fn delete(&self, digest: &Digest) -> Result<()> {
        self.state
            .manifests
            .write()
            .remove(digest)
            .map(|_| ())
            .ok_or_else(|| RegistryError::ManifestUnknown {
                digest: digest.to_string(),
            })
    }
}

/// Tag store for one in-memory repository.
#[derive(Debug, Clone)]
pub struct MemoryTagStore {
    state: Arc<RepositoryState>,
}

#[async_trait]
impl TagService for MemoryTagStore {
    async fn get(&self, tag: &str) -> Result<Descriptor> {
        self.state
            .tags
            .read()
            .get(tag)
            .cloned()
            .ok_or_else(|| RegistryError::TagUnknown {
                tag: tag.to_string(),
            })
    }

    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<()> {
        self.state
            .tags
            .write()
            .insert(tag.to_string(), descriptor.clone());
        Ok(())
    }

    async fn untag(&self, tag: &str) -> Result<()> {
        self.state
            .tags
            .write()
            .remove(tag)
            .map(|_| ())
            .ok_or_else(|| RegistryError::TagUnknown {
                tag: tag.to_string(),
            })
    }

    async fn all(&self) -> Result<Vec<String>> {
        let mut tags: Vec<String> = self.state.tags.read().keys().cloned().collect();
        tags.sort();
        Ok(tags)
    }

    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>> {
        let mut tags: Vec<String> = self
            .state
            .tags
            .read()
            .iter()
            .filter(|(_, bound)| bound.digest == descriptor.digest)
            .map(|(tag, _)| tag.clone())
            .collect();
        tags.sort();
        Ok(tags)
    }
}
