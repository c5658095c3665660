//! Manifest and descriptor fixtures.
//!
//! Every fixture is deterministic: the same seed always yields the same
//! payload and therefore the same digest.

use pullthrough_core::{
    Descriptor, Digest, ImageManifest, Manifest, ManifestList, MediaType, OciManifest, Platform,
    RepositoryName, UnrecognizedManifest,
};

const PADDING_ANNOTATION: &str = "org.example.padding";

/// Parses a repository name.
///
/// # Panics
///
/// Panics if `name` is not a valid repository name.
#[must_use]
pub fn repository(name: &str) -> RepositoryName {
    RepositoryName::parse(name).unwrap_or_else(|e| panic!("invalid fixture repository {name}: {e}"))
}

/// Returns a layer descriptor whose digest is derived from `seed`.
#[must_use]
pub fn layer(seed: &str) -> Descriptor {
    Descriptor::new(
        MediaType::new(MediaType::SCHEMA2_LAYER),
        Digest::from_bytes(format!("layer:{seed}").as_bytes()),
        1024,
    )
}

/// Returns a config descriptor whose digest is derived from `seed`.
#[must_use]
pub fn config(seed: &str) -> Descriptor {
    Descriptor::new(
        MediaType::new(MediaType::SCHEMA2_CONFIG),
        Digest::from_bytes(format!("config:{seed}").as_bytes()),
        256,
    )
}

/// Returns an arbitrary manifest descriptor derived from `seed`, for tag fixtures.
#[must_use]
pub fn descriptor(seed: &str) -> Descriptor {
    Descriptor::new(
        MediaType::new(MediaType::OCI_MANIFEST),
        Digest::from_bytes(format!("manifest:{seed}").as_bytes()),
        512,
    )
}

/// Returns a Docker schema2 manifest.
///
/// # Panics
///
/// Panics if the manifest cannot be serialized.
#[must_use]
pub fn image_manifest(seed: &str) -> Manifest {
    ImageManifest::new(config(seed), vec![layer(seed)])
        .map(Manifest::Schema2)
        .unwrap_or_else(|e| panic!("schema2 fixture: {e}"))
}

/// Returns an OCI image manifest.
///
/// # Panics
///
/// Panics if the manifest cannot be serialized.
#[must_use]
pub fn oci_manifest(seed: &str) -> Manifest {
    OciManifest::new(config(seed), vec![layer(seed)])
        .map(Manifest::Oci)
        .unwrap_or_else(|e| panic!("OCI fixture: {e}"))
}

/// Returns an OCI manifest whose payload is exactly `size` bytes.
///
/// # Panics
///
/// Panics if `size` is smaller than the unpadded manifest.
#[must_use]
pub fn oci_manifest_of_size(size: usize) -> Manifest {
    let build = |padding: &str| {
        OciManifest::new(config("sized"), Vec::new())
            .and_then(|m| m.with_annotation(PADDING_ANNOTATION, padding))
            .map(Manifest::Oci)
            .unwrap_or_else(|e| panic!("sized OCI fixture: {e}"))
    };

    let base = build("").payload().len();
    assert!(size >= base, "manifest fixture needs at least {base} bytes, asked for {size}");

    let manifest = build(&"a".repeat(size - base));
    debug_assert_eq!(manifest.payload().len(), size);
    manifest
}

/// Returns a Docker manifest list over two platforms.
///
/// # Panics
///
/// Panics if the list cannot be serialized.
#[must_use]
pub fn manifest_list(seed: &str) -> Manifest {
    let amd64 = image_manifest(&format!("{seed}-amd64"))
        .descriptor()
        .with_platform(Platform::new("linux", "amd64"));
    let arm64 = image_manifest(&format!("{seed}-arm64"))
        .descriptor()
        .with_platform(Platform::new("linux", "arm64"));

    ManifestList::new(vec![amd64, arm64])
        .map(Manifest::List)
        .unwrap_or_else(|e| panic!("manifest list fixture: {e}"))
}

/// Returns a manifest of a media type outside the recognized set.
#[must_use]
pub fn unrecognized_manifest() -> Manifest {
    Manifest::Unrecognized(UnrecognizedManifest::new(
        MediaType::new("application/vnd.example.unknown+json"),
        br#"{"kind":"unknown"}"#.to_vec(),
    ))
}
