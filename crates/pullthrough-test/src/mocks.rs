//! Recording and counting doubles for the capability traits.
//!
//! # Examples
//!
//! ```rust
//! use pullthrough_core::{EvictionScheduler, Reference};
//! use pullthrough_test::{fixtures, RecordingScheduler};
//! use std::time::Duration;
//!
//! let scheduler = RecordingScheduler::new();
//! let reference = Reference::with_tag(&fixtures::repository("lib/app"), "latest")?;
//! scheduler.add_manifest(&reference, Duration::from_secs(60));
//! assert_eq!(scheduler.registrations()[0].0, "lib/app:latest");
//! # Ok::<(), pullthrough_core::RegistryError>(())
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use pullthrough_core::{
    AuthChallenger, Descriptor, Digest, EvictionScheduler, Manifest, ManifestOptions,
    ManifestService, Reference, RegistryError, Result, TagService,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// [`AuthChallenger`] that counts calls and optionally fails every one.
#[derive(Debug, Default)]
pub struct RecordingChallenger {
    calls: AtomicUsize,
    failure: Option<String>,
}

impl RecordingChallenger {
    /// Creates a challenger that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a challenger that always fails with `Unauthorized { message }`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Some(message.into()),
        }
    }

    /// Returns how many times the challenger was invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthChallenger for RecordingChallenger {
    async fn try_establish_challenges(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(RegistryError::Unauthorized {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// [`EvictionScheduler`] that records every registration.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    registrations: Mutex<Vec<(String, Duration)>>,
}

impl RecordingScheduler {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded `(reference, ttl)` pairs in call order.
    #[must_use]
    pub fn registrations(&self) -> Vec<(String, Duration)> {
        self.registrations.lock().clone()
    }
}

impl EvictionScheduler for RecordingScheduler {
    fn add_manifest(&self, reference: &Reference, ttl: Duration) {
        self.registrations.lock().push((reference.to_string(), ttl));
    }
}

/// Per-operation call counter shared by the counting wrappers.
#[derive(Debug, Default)]
pub struct CallCounts {
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl CallCounts {
    fn record(&self, operation: &'static str) {
        *self.counts.lock().entry(operation).or_default() += 1;
    }

    /// Returns how many times `operation` was called.
    #[must_use]
    pub fn get(&self, operation: &str) -> usize {
        self.counts.lock().get(operation).copied().unwrap_or_default()
    }

    /// Returns the number of calls across all operations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

/// [`ManifestService`] wrapper that counts calls before delegating.
pub struct CountingManifestService {
    inner: Arc<dyn ManifestService>,
    counts: CallCounts,
}

impl CountingManifestService {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn ManifestService>) -> Self {
        Self {
            inner,
            counts: CallCounts::default(),
        }
    }

    /// Returns the call counts, keyed `exists`, `get`, `put` and `delete`.
    #[must_use]
    pub const fn counts(&self) -> &CallCounts {
        &self.counts
    }
}

#[async_trait]
impl ManifestService for CountingManifestService {
    async fn exists(&self, digest: &Digest) -> Result<bool> {
        self.counts.record("exists");
        self.inner.exists(digest).await
    }

    async fn get(&self, digest: &Digest, options: &ManifestOptions) -> Result<Manifest> {
        self.counts.record("get");
        self.inner.get(digest, options).await
    }

    async fn put(&self, manifest: &Manifest, options: &ManifestOptions) -> Result<Digest> {
        self.counts.record("put");
        self.inner.put(manifest, options).await
    }

    async fn delete(&self, digest: &Digest) -> Result<()> {
        self.counts.record("delete");
        self.inner.delete(digest).await
    }
}

/// [`TagService`] wrapper that counts calls before delegating.
pub struct CountingTagService {
    inner: Arc<dyn TagService>,
    counts: CallCounts,
}

impl CountingTagService {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn TagService>) -> Self {
        Self {
            inner,
            counts: CallCounts::default(),
        }
    }

    /// Returns the call counts, keyed `get`, `tag`, `untag`, `all` and `lookup`.
    #[must_use]
    pub const fn counts(&self) -> &CallCounts {
        &self.counts
    }
}

#[async_trait]
impl TagService for CountingTagService {
    async fn get(&self, tag: &str) -> Result<Descriptor> {
        self.counts.record("get");
        self.inner.get(tag).await
    }

    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<()> {
        self.counts.record("tag");
        self.inner.tag(tag, descriptor).await
    }

    async fn untag(&self, tag: &str) -> Result<()> {
        self.counts.record("untag");
        self.inner.untag(tag).await
    }

    async fn all(&self) -> Result<Vec<String>> {
        self.counts.record("all");
        self.inner.all().await
    }

    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>> {
        self.counts.record("lookup");
        self.inner.lookup(descriptor).await
    }
}

/// Remote double whose every call fails with HTTP 503.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnreachableRemote;

fn unavailable() -> RegistryError {
    RegistryError::HttpError {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

#[async_trait]
impl ManifestService for UnreachableRemote {
    async fn exists(&self, _digest: &Digest) -> Result<bool> {
        Err(unavailable())
    }

    async fn get(&self, _digest: &Digest, _options: &ManifestOptions) -> Result<Manifest> {
        Err(unavailable())
    }

    async fn put(&self, _manifest: &Manifest, _options: &ManifestOptions) -> Result<Digest> {
        Err(unavailable())
    }

    async fn delete(&self, _digest: &Digest) -> Result<()> {
        Err(unavailable())
    }
}

#[async_trait]
impl TagService for UnreachableRemote {
    async fn get(&self, _tag: &str) -> Result<Descriptor> {
        Err(unavailable())
    }

    async fn tag(&self, _tag: &str, _descriptor: &Descriptor) -> Result<()> {
        Err(unavailable())
    }

    async fn untag(&self, _tag: &str) -> Result<()> {
        Err(unavailable())
    }

    async fn all(&self) -> Result<Vec<String>> {
        Err(unavailable())
    }

    async fn lookup(&self, _descriptor: &Descriptor) -> Result<Vec<String>> {
        Err(unavailable())
    }
}

/// Read-only manifest source keyed by arbitrary digests.
///
/// Unlike a real store, the key does not have to match the manifest's
/// content digest, nor even be well formed.
#[derive(Debug, Default)]
pub struct FixtureManifestStore {
    manifests: HashMap<Digest, Manifest>,
}

impl FixtureManifestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `manifest` under `digest`.
    #[must_use]
    pub fn with_manifest(mut self, digest: impl Into<Digest>, manifest: Manifest) -> Self {
        self.manifests.insert(digest.into(), manifest);
        self
    }
}

#[async_trait]
impl ManifestService for FixtureManifestStore {
    async fn exists(&self, digest: &Digest) -> Result<bool> {
        Ok(self.manifests.contains_key(digest))
    }

    async fn get(&self, digest: &Digest, _options: &ManifestOptions) -> Result<Manifest> {
        self.manifests
            .get(digest)
            .cloned()
            .ok_or_else(|| RegistryError::ManifestUnknown {
                digest: digest.to_string(),
            })
    }

    async fn put(&self, _manifest: &Manifest, _options: &ManifestOptions) -> Result<Digest> {
        Err(RegistryError::unsupported("put"))
    }

    async fn delete(&self, _digest: &Digest) -> Result<()> {
        Err(RegistryError::unsupported("delete"))
    }
}
