//! Integration tests for the pull-through manifest resolver.
//!
//! Local storage is a [`MemoryStorage`] repository; the remote is either a
//! second in-memory repository or a fixed-behavior double. Both are wrapped
//! in call counters so tests can assert which side was consulted.

use std::sync::Arc;
use std::time::Duration;

use pullthrough_core::{
    Digest, Manifest, ManifestOptions, ManifestService, RegistryError, RepositoryName,
};
use pullthrough_metrics::{MetricsSnapshot, PrometheusMetrics};
use pullthrough_proxy::{ProxyManifestStore, DEFAULT_EVICTION_TTL};
use pullthrough_storage::{MemoryManifestStore, MemoryStorage};
use pullthrough_test::{
    fixtures, CountingManifestService, FixtureManifestStore, RecordingChallenger,
    RecordingScheduler, UnreachableRemote,
};

const WEEK: Duration = Duration::from_secs(168 * 60 * 60);

struct Harness {
    name: RepositoryName,
    local_store: MemoryManifestStore,
    local: Arc<CountingManifestService>,
    remote: Arc<CountingManifestService>,
    challenger: Arc<RecordingChallenger>,
    scheduler: Arc<RecordingScheduler>,
    metrics: Arc<PrometheusMetrics>,
    store: ProxyManifestStore,
}

impl Harness {
    fn new(remote: Arc<dyn ManifestService>, challenger: RecordingChallenger) -> Self {
        let name = fixtures::repository("lib/app");
        let local_store = MemoryStorage::new().manifest_store(&name);
        let local = Arc::new(CountingManifestService::new(Arc::new(local_store.clone())));
        let remote = Arc::new(CountingManifestService::new(remote));
        let challenger = Arc::new(challenger);
        let scheduler = Arc::new(RecordingScheduler::new());
        let metrics = Arc::new(PrometheusMetrics::new().unwrap());

        let store = ProxyManifestStore::new(
            name.clone(),
            local.clone(),
            remote.clone(),
            challenger.clone(),
            scheduler.clone(),
            metrics.clone(),
        );

        Self {
            name,
            local_store,
            local,
            remote,
            challenger,
            scheduler,
            metrics,
            store,
        }
    }

    async fn with_remote_manifests(manifests: &[Manifest]) -> Self {
        let remote = MemoryStorage::new().manifest_store(&fixtures::repository("lib/app"));
        for manifest in manifests {
            remote.put(manifest, &ManifestOptions::new()).await.unwrap();
        }
        Self::new(Arc::new(remote), RecordingChallenger::new())
    }

    async fn seed_local(&self, manifest: &Manifest) {
        self.local_store
            .put(manifest, &ManifestOptions::new())
            .await
            .unwrap();
    }
}

// =============================================================================
// Local-first
// =============================================================================

#[tokio::test]
async fn test_local_hit_skips_challenger_and_remote() {
    let manifest = fixtures::image_manifest("cached");
    let harness = Harness::new(Arc::new(UnreachableRemote), RecordingChallenger::new());
    harness.seed_local(&manifest).await;

    assert!(harness.store.exists(&manifest.digest()).await.unwrap());
    let fetched = harness
        .store
        .get(&manifest.digest(), &ManifestOptions::new())
        .await
        .unwrap();

    assert_eq!(fetched, manifest);
    assert_eq!(harness.challenger.calls(), 0);
    assert_eq!(harness.remote.counts().total(), 0);
    assert!(harness.scheduler.registrations().is_empty());
}

#[tokio::test]
async fn test_local_hit_records_served_only() {
    let manifest = fixtures::oci_manifest_of_size(700);
    let harness = Harness::new(Arc::new(UnreachableRemote), RecordingChallenger::new());
    harness.seed_local(&manifest).await;

    harness
        .store
        .get(&manifest.digest(), &ManifestOptions::new())
        .await
        .unwrap();

    assert_eq!(
        harness.metrics.snapshot(),
        MetricsSnapshot {
            requests_served: 1,
            bytes_served: 700,
            requests_fetched: 0,
            bytes_fetched: 0,
        }
    );
}

#[tokio::test]
async fn test_exists_falls_back_to_remote() {
    let manifest = fixtures::image_manifest("remote-only");
    let harness = Harness::with_remote_manifests(&[manifest.clone()]).await;

    assert!(harness.store.exists(&manifest.digest()).await.unwrap());
    assert_eq!(harness.challenger.calls(), 1);
    assert_eq!(harness.remote.counts().get("exists"), 1);

    // Exists never populates the cache.
    assert!(harness.local_store.is_empty());
}

#[tokio::test]
async fn test_exists_false_when_neither_has_it() {
    let harness = Harness::with_remote_manifests(&[]).await;
    let digest = fixtures::image_manifest("nowhere").digest();

    assert!(!harness.store.exists(&digest).await.unwrap());
}

#[tokio::test]
async fn test_exists_propagates_remote_error() {
    let harness = Harness::new(Arc::new(UnreachableRemote), RecordingChallenger::new());
    let digest = fixtures::image_manifest("missing").digest();

    let err = harness.store.exists(&digest).await.unwrap_err();
    assert!(matches!(err, RegistryError::HttpError { status: 503, .. }));
}

#[tokio::test]
async fn test_exists_propagates_challenger_error() {
    let harness = Harness::new(
        Arc::new(UnreachableRemote),
        RecordingChallenger::failing("no token"),
    );
    let digest = fixtures::image_manifest("missing").digest();

    let err = harness.store.exists(&digest).await.unwrap_err();
    assert_eq!(err.to_string(), "Unauthorized: no token");
    assert_eq!(harness.remote.counts().total(), 0);
}

// =============================================================================
// Remote fallback and write-through
// =============================================================================

#[tokio::test]
async fn test_fallback_writes_through_and_schedules_once() {
    let manifest = fixtures::manifest_list("multi");
    let harness = Harness::with_remote_manifests(&[manifest.clone()]).await;
    let digest = manifest.digest();

    let fetched = harness.store.get(&digest, &ManifestOptions::new()).await.unwrap();
    assert_eq!(fetched, manifest);

    // Now served locally without touching the remote again.
    let remote_calls = harness.remote.counts().total();
    assert!(harness.store.exists(&digest).await.unwrap());
    assert_eq!(harness.remote.counts().total(), remote_calls);
    assert_eq!(harness.challenger.calls(), 1);

    assert_eq!(
        harness.scheduler.registrations(),
        vec![(format!("lib/app@{digest}"), WEEK)]
    );
}

#[tokio::test]
async fn test_second_get_is_a_local_hit() {
    let manifest = fixtures::image_manifest("twice");
    let harness = Harness::with_remote_manifests(&[manifest.clone()]).await;
    let options = ManifestOptions::new();

    harness.store.get(&manifest.digest(), &options).await.unwrap();
    harness.store.get(&manifest.digest(), &options).await.unwrap();

    assert_eq!(harness.remote.counts().get("get"), 1);
    assert_eq!(harness.scheduler.registrations().len(), 1);

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.requests_served, 2);
    assert_eq!(snapshot.requests_fetched, 1);
}

#[tokio::test]
async fn test_custom_ttl_is_used() {
    let manifest = fixtures::image_manifest("ttl");
    let remote = MemoryStorage::new().manifest_store(&fixtures::repository("lib/app"));
    remote.put(&manifest, &ManifestOptions::new()).await.unwrap();

    let scheduler = Arc::new(RecordingScheduler::new());
    let store = ProxyManifestStore::new(
        fixtures::repository("lib/app"),
        Arc::new(MemoryStorage::new().manifest_store(&fixtures::repository("lib/app"))),
        Arc::new(remote),
        Arc::new(RecordingChallenger::new()),
        scheduler.clone(),
        Arc::new(PrometheusMetrics::new().unwrap()),
    )
    .with_ttl(Duration::from_secs(60));

    assert_eq!(DEFAULT_EVICTION_TTL, WEEK);
    store.get(&manifest.digest(), &ManifestOptions::new()).await.unwrap();
    assert_eq!(scheduler.registrations()[0].1, Duration::from_secs(60));
}

#[tokio::test]
async fn test_remote_not_found_passes_through() {
    let harness = Harness::with_remote_manifests(&[]).await;
    let digest = fixtures::image_manifest("absent").digest();

    let err = harness.store.get(&digest, &ManifestOptions::new()).await.unwrap_err();
    assert!(matches!(err, RegistryError::ManifestUnknown { .. }));
    assert!(harness.local_store.is_empty());
    assert!(harness.scheduler.registrations().is_empty());
    assert_eq!(harness.metrics.snapshot(), MetricsSnapshot::default());
}

#[tokio::test]
async fn test_reference_failure_keeps_local_write() {
    // The remote serves a valid manifest under a digest that cannot form a reference.
    let manifest = fixtures::image_manifest("bad-key");
    let remote = FixtureManifestStore::new().with_manifest("not-a-digest", manifest.clone());
    let harness = Harness::new(Arc::new(remote), RecordingChallenger::new());

    let err = harness
        .store
        .get(&Digest::new("not-a-digest"), &ManifestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::InvalidReference { .. }));
    // The write-through already happened and is not rolled back.
    assert!(harness.local_store.exists(&Digest::new("not-a-digest")).await.unwrap());
    assert!(harness.scheduler.registrations().is_empty());
    assert_eq!(harness.metrics.snapshot().requests_fetched, 1);
}

#[tokio::test]
async fn test_sha512_request_is_cached_under_requested_digest() {
    let manifest = fixtures::image_manifest("sha512");
    let digest = Digest::from_bytes_with(Digest::SHA512, manifest.payload()).unwrap();
    let remote = FixtureManifestStore::new().with_manifest(digest.as_str(), manifest.clone());
    let harness = Harness::new(Arc::new(remote), RecordingChallenger::new());
    let options = ManifestOptions::new();

    harness.store.get(&digest, &options).await.unwrap();
    assert!(harness.store.exists(&digest).await.unwrap());
    assert_eq!(harness.store.get(&digest, &options).await.unwrap(), manifest);

    assert_eq!(harness.remote.counts().total(), 1);
    assert!(harness.local_store.exists(&digest).await.unwrap());
    assert_eq!(
        harness.scheduler.registrations(),
        vec![(format!("lib/app@{digest}"), WEEK)]
    );
}

// =============================================================================
// Put and Delete
// =============================================================================

#[tokio::test]
async fn test_put_recognized_variants_go_to_local() {
    let harness = Harness::new(Arc::new(UnreachableRemote), RecordingChallenger::new());
    let manifests = [
        fixtures::image_manifest("put"),
        fixtures::oci_manifest("put"),
        fixtures::manifest_list("put"),
    ];

    for manifest in &manifests {
        let digest = harness.store.put(manifest, &ManifestOptions::new()).await.unwrap();
        assert_eq!(digest, manifest.digest());
    }

    assert_eq!(harness.local_store.len(), manifests.len());
    assert_eq!(harness.remote.counts().total(), 0);
    assert_eq!(harness.challenger.calls(), 0);
}

#[tokio::test]
async fn test_put_signed_manifest() {
    let payload = br#"{
        "schemaVersion": 1,
        "name": "lib/app",
        "tag": "v1",
        "architecture": "amd64",
        "fsLayers": [],
        "history": [],
        "signatures": []
    }"#;
    let manifest = Manifest::from_payload("", payload.to_vec()).unwrap();
    assert!(matches!(manifest, Manifest::Signed(_)));

    let harness = Harness::new(Arc::new(UnreachableRemote), RecordingChallenger::new());
    harness.store.put(&manifest, &ManifestOptions::new()).await.unwrap();
    assert_eq!(harness.local_store.len(), 1);
}

#[tokio::test]
async fn test_put_unrecognized_rejected_without_write() {
    let harness = Harness::new(Arc::new(UnreachableRemote), RecordingChallenger::new());

    let err = harness
        .store
        .put(&fixtures::unrecognized_manifest(), &ManifestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "unrecognized manifest type application/vnd.example.unknown+json"
    );
    assert_eq!(harness.local.counts().get("put"), 0);
    assert!(harness.local_store.is_empty());
}

#[tokio::test]
async fn test_delete_always_unsupported() {
    let manifest = fixtures::image_manifest("keep");
    let harness = Harness::new(Arc::new(UnreachableRemote), RecordingChallenger::new());
    harness.seed_local(&manifest).await;

    for digest in [manifest.digest(), Digest::new("sha256:abc"), Digest::new("garbage")] {
        let err = harness.store.delete(&digest).await.unwrap_err();
        assert!(matches!(err, RegistryError::Unsupported { .. }));
    }

    assert_eq!(harness.local.counts().get("delete"), 0);
    assert_eq!(harness.remote.counts().total(), 0);
    assert_eq!(harness.local_store.len(), 1);
}

// =============================================================================
// Scenarios
// =============================================================================

/// Remote-only manifest of 512 bytes in `lib/app`. The content digest of the
/// fixture payload plays the role of `sha256:abc`.
#[tokio::test]
async fn test_scenario_remote_fallback() {
    let manifest = fixtures::oci_manifest_of_size(512);
    let harness = Harness::with_remote_manifests(&[manifest.clone()]).await;
    let digest = manifest.digest();

    let fetched = harness.store.get(&digest, &ManifestOptions::new()).await.unwrap();
    assert_eq!(fetched.size(), 512);

    assert_eq!(
        harness.metrics.snapshot(),
        MetricsSnapshot {
            requests_served: 1,
            bytes_served: 512,
            requests_fetched: 1,
            bytes_fetched: 512,
        }
    );

    let remote_calls = harness.remote.counts().total();
    assert!(harness.store.exists(&digest).await.unwrap());
    assert_eq!(harness.remote.counts().total(), remote_calls);

    let registrations = harness.scheduler.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].0, format!("{}@{digest}", harness.name));
    assert_eq!(registrations[0].1, WEEK);
}

#[tokio::test]
async fn test_scenario_unauthorized() {
    let manifest = fixtures::image_manifest("secret");
    let remote = MemoryStorage::new().manifest_store(&fixtures::repository("lib/app"));
    remote.put(&manifest, &ManifestOptions::new()).await.unwrap();
    let harness = Harness::new(Arc::new(remote), RecordingChallenger::failing("unauthorized"));

    let err = harness
        .store
        .get(&manifest.digest(), &ManifestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Unauthorized: unauthorized");
    assert_eq!(harness.remote.counts().total(), 0);
    assert_eq!(harness.metrics.snapshot(), MetricsSnapshot::default());
    assert!(harness.local_store.is_empty());
    assert!(harness.scheduler.registrations().is_empty());
}
