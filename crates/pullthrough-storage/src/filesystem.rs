//! Filesystem storage for cached manifests and tags.
//!
//! Layout under the storage root:
//!
//! ```text
//! repositories/<name>/_manifests/<algorithm>/<hex>.data   payload bytes
//! repositories/<name>/_manifests/<algorithm>/<hex>.meta   media type, cached_at
//! repositories/<name>/_tags/<tag>.json                    bound descriptor
//! ```

use async_trait::async_trait;
use pullthrough_core::reference::is_valid_tag;
use pullthrough_core::{
    Descriptor, Digest, Manifest, ManifestOptions, ManifestService, RegistryError,
    RepositoryName, RepositoryStorage, Result, TagService,
};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Configuration for filesystem storage.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage root (default: `<user cache dir>/pullthrough`).
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root_dir(),
        }
    }
}

impl StorageConfig {
    /// Creates a configuration rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Default storage root.
fn default_root_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pullthrough")
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestMeta {
    media_type: String,
    cached_at: String,
}

/// Manifest and tag storage on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    config: StorageConfig,
}

impl FsStorage {
    /// Creates filesystem storage, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the repositories directory cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pullthrough_storage::{FsStorage, StorageConfig};
    ///
    /// let storage = FsStorage::new(StorageConfig::new("/var/lib/pullthrough"))?;
    /// # Ok::<(), pullthrough_core::RegistryError>(())
    /// ```
    pub fn new(config: StorageConfig) -> Result<Self> {
        let repositories = config.root.join("repositories");
        std::fs::create_dir_all(&repositories).map_err(|e| RegistryError::IoError {
            path: repositories,
            source: e,
        })?;

        Ok(Self { config })
    }

    /// Returns the storage configuration.
    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the directory holding everything stored for `name`.
    #[must_use]
    pub fn repository_path(&self, name: &RepositoryName) -> PathBuf {
        self.config.root.join("repositories").join(name.as_str())
    }

    /// Returns the manifest store for `name`.
    #[must_use]
    pub fn manifest_store(&self, name: &RepositoryName) -> FsManifestStore {
        FsManifestStore {
            dir: self.repository_path(name).join("_manifests"),
        }
    }

    /// Returns the tag store for `name`.
    #[must_use]
    pub fn tag_store(&self, name: &RepositoryName) -> FsTagStore {
        FsTagStore {
            dir: self.repository_path(name).join("_tags"),
        }
    }
}

impl RepositoryStorage for FsStorage {
    fn manifests(&self, name: &RepositoryName) -> Arc<dyn ManifestService> {
        Arc::new(self.manifest_store(name))
    }

    fn tags(&self, name: &RepositoryName) -> Arc<dyn TagService> {
        Arc::new(self.tag_store(name))
    }
}

/// Manifest store for one repository directory.
#[derive(Debug, Clone)]
pub struct FsManifestStore {
    dir: PathBuf,
}

impl FsManifestStore {
    /// Returns the payload path for a digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] if the digest is malformed.
    pub fn payload_path(&self, digest: &Digest) -> Result<PathBuf> {
        digest.validate()?;
        Ok(self
            .dir
            .join(digest.algorithm())
            .join(format!("{}.data", digest.hex())))
    }

    fn meta_path(&self, digest: &Digest) -> Result<PathBuf> {
        Ok(self.payload_path(digest)?.with_extension("meta"))
    }
}

#[async_trait]
impl ManifestService for FsManifestStore {
    async fn exists(&self, digest: &Digest) -> Result<bool> {
        let path = self.payload_path(digest)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| RegistryError::IoError { path, source: e })
    }

    async fn get(&self, digest: &Digest, _options: &ManifestOptions) -> Result<Manifest> {
        let payload_path = self.payload_path(digest)?;
        let not_found = || RegistryError::ManifestUnknown {
            digest: digest.to_string(),
        };

        let payload = match tokio::fs::read(&payload_path).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => {
                return Err(RegistryError::IoError {
                    path: payload_path,
                    source: e,
                })
            }
        };

        let meta_path = self.meta_path(digest)?;
        let meta = match tokio::fs::read(&meta_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => {
                return Err(RegistryError::IoError {
                    path: meta_path,
                    source: e,
                })
            }
        };
        let meta: ManifestMeta = serde_json::from_slice(&meta)?;

        Manifest::from_payload(&meta.media_type, payload)
    }

    async fn put(&self, manifest: &Manifest, options: &ManifestOptions) -> Result<Digest> {
        let digest = options.storage_digest(manifest);
        let payload_path = self.payload_path(&digest)?;
        let meta_path = self.meta_path(&digest)?;

        if let Some(parent) = payload_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::IoError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let meta = ManifestMeta {
            media_type: manifest.media_type().to_string(),
            cached_at: chrono::Utc::now().to_rfc3339(),
        };

        // Metadata first: a payload file is only visible once its media type is.
        write_atomic(&meta_path, &serde_json::to_vec_pretty(&meta)?).await?;
        write_atomic(&payload_path, manifest.payload()).await?;

        tracing::debug!(%digest, path = %payload_path.display(), "Stored manifest");
        Ok(digest)
    }

    async fn delete(&self, digest: &Digest) -> Result<()> {
        let payload_path = self.payload_path(digest)?;
        match tokio::fs::remove_file(&payload_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RegistryError::ManifestUnknown {
                    digest: digest.to_string(),
                })
            }
            Err(e) => {
                return Err(RegistryError::IoError {
                    path: payload_path,
                    source: e,
                })
            }
        }

        let meta_path = self.meta_path(digest)?;
        if let Err(e) = tokio::fs::remove_file(&meta_path).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    path = %meta_path.display(),
                    error = %e,
                    "Failed to remove manifest metadata"
                );
            }
        }

        tracing::debug!(%digest, "Deleted manifest");
        Ok(())
    }
}

/// Tag store for one repository directory.
#[derive(Debug, Clone)]
pub struct FsTagStore {
    dir: PathBuf,
}

impl FsTagStore {
    /// Returns the link file path for a tag.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if the tag is malformed.
    pub fn tag_path(&self, tag: &str) -> Result<PathBuf> {
        if !is_valid_tag(tag) {
            return Err(RegistryError::InvalidReference {
                reference: tag.to_string(),
            });
        }
        Ok(self.dir.join(format!("{tag}.json")))
    }

    async fn read_all(&self) -> Result<Vec<(String, Descriptor)>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RegistryError::IoError {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let mut tags = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(tag) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            if !is_valid_tag(tag) {
                continue;
            }

            let descriptor = read_descriptor(&path).await?;
            tags.push((tag.to_string(), descriptor));
        }

        tags.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(tags)
    }
}

#[async_trait]
impl TagService for FsTagStore {
    async fn get(&self, tag: &str) -> Result<Descriptor> {
        let path = self.tag_path(tag)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(RegistryError::TagUnknown {
                tag: tag.to_string(),
            }),
            Err(e) => Err(RegistryError::IoError { path, source: e }),
        }
    }

    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<()> {
        let path = self.tag_path(tag)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RegistryError::IoError {
                path: self.dir.clone(),
                source: e,
            })?;

        write_atomic(&path, &serde_json::to_vec_pretty(descriptor)?).await?;
        tracing::debug!(tag, digest = %descriptor.digest, "Tagged manifest");
        Ok(())
    }

    async fn untag(&self, tag: &str) -> Result<()> {
        let path = self.tag_path(tag)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(RegistryError::TagUnknown {
                tag: tag.to_string(),
            }),
            Err(e) => Err(RegistryError::IoError { path, source: e }),
        }
    }

    async fn all(&self) -> Result<Vec<String>> {
        Ok(self.read_all().await?.into_iter().map(|(tag, _)| tag).collect())
    }

    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|(_, bound)| bound.digest == descriptor.digest)
            .map(|(tag, _)| tag)
            .collect())
    }
}

async fn read_descriptor(path: &Path) -> Result<Descriptor> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RegistryError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Writes `data` next to `path` and renames it into place.
///
/// Each call uses its own temporary file, so concurrent writers of the same
/// content never trip over each other.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!(
        ".tmp-{}-{}",
        std::process::id(),
        NEXT_TMP.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| RegistryError::IoError {
            path: tmp.clone(),
            source: e,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| RegistryError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pullthrough_core::{ImageManifest, MediaType};
    use tempfile::TempDir;

    fn name(s: &str) -> RepositoryName {
        RepositoryName::parse(s).unwrap()
    }

    fn manifest() -> Manifest {
        let config = Descriptor::new(
            MediaType::new(MediaType::SCHEMA2_CONFIG),
            Digest::from_bytes(b"config"),
            6,
        );
        Manifest::Schema2(ImageManifest::new(config, Vec::new()).unwrap())
    }

    fn descriptor(digest: &str) -> Descriptor {
        Descriptor::new(MediaType::new(MediaType::SCHEMA2), Digest::new(digest), 10)
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert!(config.root.ends_with("pullthrough"));
    }

    #[test]
    fn test_paths() {
        let storage = FsStorage {
            config: StorageConfig::new("/cache"),
        };
        let store = storage.manifest_store(&name("lib/app"));
        assert_eq!(
            store.payload_path(&Digest::new("sha256:abc")).unwrap(),
            PathBuf::from("/cache/repositories/lib/app/_manifests/sha256/abc.data")
        );
        assert!(store.payload_path(&Digest::new("../../etc")).is_err());

        let tags = storage.tag_store(&name("lib/app"));
        assert_eq!(
            tags.tag_path("latest").unwrap(),
            PathBuf::from("/cache/repositories/lib/app/_tags/latest.json")
        );
        assert!(tags.tag_path("../x").is_err());
    }

    #[tokio::test]
    async fn test_manifest_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(StorageConfig::new(dir.path())).unwrap();
        let store = storage.manifest_store(&name("lib/app"));
        let manifest = manifest();

        let digest = store.put(&manifest, &ManifestOptions::new()).await.unwrap();
        assert!(store.exists(&digest).await.unwrap());

        // A fresh handle reads what the first one wrote.
        let reopened = FsStorage::new(StorageConfig::new(dir.path()))
            .unwrap()
            .manifests(&name("lib/app"));
        let fetched = reopened.get(&digest, &ManifestOptions::new()).await.unwrap();
        assert_eq!(fetched, manifest);

        reopened.delete(&digest).await.unwrap();
        assert!(!store.exists(&digest).await.unwrap());
        assert!(matches!(
            store.delete(&digest).await.unwrap_err(),
            RegistryError::ManifestUnknown { .. }
        ));
    }

    #[tokio::test]
    async fn test_manifest_put_under_requested_digest() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(StorageConfig::new(dir.path())).unwrap();
        let store = storage.manifest_store(&name("lib/app"));
        let manifest = manifest();
        let digest = Digest::from_bytes_with(Digest::SHA512, manifest.payload()).unwrap();

        let stored = store
            .put(&manifest, &ManifestOptions::new().with_digest(digest.clone()))
            .await
            .unwrap();

        assert_eq!(stored, digest);
        assert!(store.exists(&digest).await.unwrap());
        assert!(!store.exists(&manifest.digest()).await.unwrap());
        store.delete(&digest).await.unwrap();
        assert!(!store.exists(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_unsigned_schema1_roundtrip_keeps_media_type() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(StorageConfig::new(dir.path())).unwrap();
        let store = storage.manifest_store(&name("lib/app"));
        let payload = br#"{"schemaVersion": 1, "name": "lib/app", "tag": "v1", "fsLayers": []}"#;
        let manifest = Manifest::from_payload(MediaType::SCHEMA1, payload.to_vec()).unwrap();

        let digest = store.put(&manifest, &ManifestOptions::new()).await.unwrap();
        let fetched = store.get(&digest, &ManifestOptions::new()).await.unwrap();

        assert_eq!(fetched.media_type(), MediaType::SCHEMA1);
        assert_eq!(fetched, manifest);
    }

    #[tokio::test]
    async fn test_manifest_get_missing() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(StorageConfig::new(dir.path())).unwrap();
        let err = storage
            .manifest_store(&name("lib/app"))
            .get(&Digest::new("sha256:abc"), &ManifestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ManifestUnknown { .. }));
    }

    #[tokio::test]
    async fn test_tags_on_disk() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(StorageConfig::new(dir.path())).unwrap();
        let tags = storage.tag_store(&name("lib/app"));

        assert!(tags.all().await.unwrap().is_empty());

        tags.tag("latest", &descriptor("sha256:bb")).await.unwrap();
        tags.tag("v1", &descriptor("sha256:aa")).await.unwrap();
        tags.tag("v2", &descriptor("sha256:bb")).await.unwrap();

        assert_eq!(tags.get("v1").await.unwrap(), descriptor("sha256:aa"));
        assert_eq!(tags.all().await.unwrap(), vec!["latest", "v1", "v2"]);
        assert_eq!(
            tags.lookup(&descriptor("sha256:bb")).await.unwrap(),
            vec!["latest", "v2"]
        );

        tags.tag("latest", &descriptor("sha256:aa")).await.unwrap();
        assert_eq!(tags.get("latest").await.unwrap().digest.as_str(), "sha256:aa");

        tags.untag("v1").await.unwrap();
        assert!(matches!(
            tags.get("v1").await.unwrap_err(),
            RegistryError::TagUnknown { .. }
        ));
        assert!(tags.untag("v1").await.is_err());
    }
}
