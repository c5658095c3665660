//! Manifest variants.
//!
//! A manifest is one of a closed set of recognized forms. Payloads with any
//! other media type are kept as [`Manifest::Unrecognized`] so they can be
//! carried around and explicitly rejected where only recognized kinds are
//! allowed.
//!
//! Each variant keeps the exact bytes it was created from. Those bytes are
//! what gets hashed, stored, and served; the parsed fields are a read-only
//! view over them.

use crate::descriptor::{Descriptor, MediaType};
use crate::digest::Digest;
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A manifest document in one of the recognized variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    /// Legacy signed schema1 manifest.
    Signed(SignedManifest),

    /// Docker schema2 single-platform image manifest.
    Schema2(ImageManifest),

    /// OCI single-platform image manifest.
    Oci(OciManifest),

    /// Multi-platform list (Docker manifest list or OCI index).
    List(ManifestList),

    /// Any payload whose media type is not one of the above.
    Unrecognized(UnrecognizedManifest),
}

impl Manifest {
    /// Interprets a payload according to its media type.
    ///
    /// An empty or generic JSON media type is resolved from the payload's own
    /// `mediaType` field, falling back to `schemaVersion: 1` for legacy
    /// manifests.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidManifest`] if the payload does not
    /// deserialize as the variant its media type names.
    ///
    /// # Examples
    ///
    /// ```
    /// use pullthrough_core::{Manifest, MediaType};
    ///
    /// let manifest = Manifest::from_payload("application/vnd.example+json", b"{}".to_vec())?;
    /// assert!(!manifest.is_recognized());
    /// # Ok::<(), pullthrough_core::RegistryError>(())
    /// ```
    pub fn from_payload(media_type: &str, payload: Vec<u8>) -> Result<Self, RegistryError> {
        let media_type = match media_type.split(';').next().map(str::trim) {
            None | Some("" | "application/json") => sniff_media_type(&payload)?,
            Some(explicit) => explicit.to_string(),
        };

        match media_type.as_str() {
            MediaType::SCHEMA1_SIGNED | MediaType::SCHEMA1 => {
                SignedManifest::from_slice(&media_type, payload).map(Self::Signed)
            }
            MediaType::SCHEMA2 => ImageManifest::from_slice(payload).map(Self::Schema2),
            MediaType::OCI_MANIFEST => OciManifest::from_slice(payload).map(Self::Oci),
            MediaType::MANIFEST_LIST | MediaType::OCI_INDEX => {
                ManifestList::from_slice(&media_type, payload).map(Self::List)
            }
            _ => Ok(Self::Unrecognized(UnrecognizedManifest::new(
                MediaType::new(media_type),
                payload,
            ))),
        }
    }

    /// Returns the media type of the payload.
    #[must_use]
    pub fn media_type(&self) -> &str {
        match self {
            Self::Signed(m) => m.media_type(),
            Self::Schema2(_) => MediaType::SCHEMA2,
            Self::Oci(_) => MediaType::OCI_MANIFEST,
            Self::List(list) => list.media_type.as_str(),
            Self::Unrecognized(other) => other.media_type.as_str(),
        }
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Signed(m) => &m.canonical,
            Self::Schema2(m) => &m.canonical,
            Self::Oci(m) => &m.canonical,
            Self::List(m) => &m.canonical,
            Self::Unrecognized(m) => &m.payload,
        }
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.payload().len() as u64
    }

    /// Computes the digest of the payload.
    #[must_use]
    pub fn digest(&self) -> Digest {
        Digest::from_bytes(self.payload())
    }

    /// Returns a descriptor pointing at this manifest.
    #[must_use]
    pub fn descriptor(&self) -> Descriptor {
        Descriptor::new(MediaType::new(self.media_type()), self.digest(), self.size())
    }

    /// Returns the descriptors of the content this manifest references.
    #[must_use]
    pub fn references(&self) -> Vec<Descriptor> {
        match self {
            Self::Signed(m) => m
                .fs_layers
                .iter()
                .map(|layer| {
                    Descriptor::new(
                        MediaType::new("application/octet-stream"),
                        layer.blob_sum.clone(),
                        0,
                    )
                })
                .collect(),
            Self::Schema2(m) => std::iter::once(m.config.clone())
                .chain(m.layers.iter().cloned())
                .collect(),
            Self::Oci(m) => std::iter::once(m.config.clone())
                .chain(m.layers.iter().cloned())
                .collect(),
            Self::List(m) => m.manifests.clone(),
            Self::Unrecognized(_) => Vec::new(),
        }
    }

    /// Returns true unless this is [`Manifest::Unrecognized`].
    #[must_use]
    pub const fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

fn sniff_media_type(payload: &[u8]) -> Result<String, RegistryError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Versioned {
        #[serde(default)]
        schema_version: u32,
        #[serde(default)]
        media_type: Option<String>,
    }

    let versioned: Versioned =
        serde_json::from_slice(payload).map_err(|e| RegistryError::InvalidManifest {
            message: format!("Failed to read manifest header: {e}"),
        })?;

    Ok(match (versioned.media_type, versioned.schema_version) {
        (Some(media_type), _) => media_type,
        (None, 1) => MediaType::SCHEMA1_SIGNED.to_string(),
        (None, _) => String::new(),
    })
}

fn invalid(kind: &str, err: &serde_json::Error) -> RegistryError {
    RegistryError::InvalidManifest {
        message: format!("Failed to parse {kind}: {err}"),
    }
}

/// Layer entry of a schema1 manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    /// Digest of the layer blob.
    pub blob_sum: Digest,
}

/// History entry of a schema1 manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Raw v1 image JSON.
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// Legacy signed schema1 manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedManifest {
    /// Schema version (always 1).
    pub schema_version: u32,

    /// Repository name.
    pub name: String,

    /// Tag the manifest was pushed under.
    pub tag: String,

    /// Image architecture.
    #[serde(default)]
    pub architecture: String,

    /// Layer blobs, top-most first.
    pub fs_layers: Vec<FsLayer>,

    /// Per-layer v1 history.
    #[serde(default)]
    pub history: Vec<History>,

    /// JWS signatures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<serde_json::Value>,

    #[serde(skip, default = "default_schema1_media_type")]
    media_type: MediaType,

    #[serde(skip)]
    canonical: Vec<u8>,
}

fn default_schema1_media_type() -> MediaType {
    MediaType::new(MediaType::SCHEMA1_SIGNED)
}

impl SignedManifest {
    /// Parses a schema1 payload served as `media_type` (signed or unsigned).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidManifest`] if the payload is malformed.
    pub fn from_slice(media_type: &str, payload: Vec<u8>) -> Result<Self, RegistryError> {
        let mut manifest: Self =
            serde_json::from_slice(&payload).map_err(|e| invalid("schema1 manifest", &e))?;
        manifest.media_type = MediaType::new(media_type);
        manifest.canonical = payload;
        Ok(manifest)
    }

    /// Returns the schema1 media type the payload was served as.
    #[must_use]
    pub fn media_type(&self) -> &str {
        self.media_type.as_str()
    }
}

/// Docker schema2 image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this manifest.
    pub media_type: MediaType,

    /// Image configuration blob.
    pub config: Descriptor,

    /// Layer blobs, base first.
    pub layers: Vec<Descriptor>,

    #[serde(skip)]
    canonical: Vec<u8>,
}

impl ImageManifest {
    /// Builds a schema2 manifest and serializes its canonical payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JsonError`] if serialization fails.
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Result<Self, RegistryError> {
        let mut manifest = Self {
            schema_version: 2,
            media_type: MediaType::new(MediaType::SCHEMA2),
            config,
            layers,
            canonical: Vec::new(),
        };
        manifest.canonical = serde_json::to_vec_pretty(&manifest)?;
        Ok(manifest)
    }

    /// Parses a schema2 payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidManifest`] if the payload is malformed.
    pub fn from_slice(payload: Vec<u8>) -> Result<Self, RegistryError> {
        let mut manifest: Self =
            serde_json::from_slice(&payload).map_err(|e| invalid("schema2 manifest", &e))?;
        manifest.canonical = payload;
        Ok(manifest)
    }
}

/// OCI image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciManifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this manifest, optional in OCI payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    /// Configuration descriptor.
    pub config: Descriptor,

    /// Layers that make up the image or artifact.
    pub layers: Vec<Descriptor>,

    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,

    /// Optional artifact type (OCI 1.1+).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// Optional subject descriptor for the referrers API (OCI 1.1+).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    #[serde(skip)]
    canonical: Vec<u8>,
}

impl OciManifest {
    /// Builds an OCI manifest and serializes its canonical payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JsonError`] if serialization fails.
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Result<Self, RegistryError> {
        let mut manifest = Self {
            schema_version: 2,
            media_type: Some(MediaType::new(MediaType::OCI_MANIFEST)),
            config,
            layers,
            annotations: None,
            artifact_type: None,
            subject: None,
            canonical: Vec::new(),
        };
        manifest.canonical = serde_json::to_vec_pretty(&manifest)?;
        Ok(manifest)
    }

    /// Adds an annotation and re-serializes the canonical payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JsonError`] if serialization fails.
    pub fn with_annotation(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        self.annotations
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self.canonical = serde_json::to_vec_pretty(&self)?;
        Ok(self)
    }

    /// Parses an OCI manifest payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidManifest`] if the payload is malformed.
    pub fn from_slice(payload: Vec<u8>) -> Result<Self, RegistryError> {
        let mut manifest: Self =
            serde_json::from_slice(&payload).map_err(|e| invalid("OCI manifest", &e))?;
        manifest.canonical = payload;
        Ok(manifest)
    }
}

/// Multi-platform manifest list or OCI index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Either the Docker manifest list or the OCI index media type.
    #[serde(default = "default_list_media_type")]
    pub media_type: MediaType,

    /// Per-platform manifests.
    pub manifests: Vec<Descriptor>,

    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,

    #[serde(skip)]
    canonical: Vec<u8>,
}

fn default_list_media_type() -> MediaType {
    MediaType::new(MediaType::OCI_INDEX)
}

impl ManifestList {
    /// Builds a Docker manifest list and serializes its canonical payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JsonError`] if serialization fails.
    pub fn new(manifests: Vec<Descriptor>) -> Result<Self, RegistryError> {
        let mut list = Self {
            schema_version: 2,
            media_type: MediaType::new(MediaType::MANIFEST_LIST),
            manifests,
            annotations: None,
            canonical: Vec::new(),
        };
        list.canonical = serde_json::to_vec_pretty(&list)?;
        Ok(list)
    }

    /// Parses a manifest list or index payload served as `media_type`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidManifest`] if the payload is malformed.
    pub fn from_slice(media_type: &str, payload: Vec<u8>) -> Result<Self, RegistryError> {
        let mut list: Self =
            serde_json::from_slice(&payload).map_err(|e| invalid("manifest list", &e))?;
        list.media_type = MediaType::new(media_type);
        list.canonical = payload;
        Ok(list)
    }
}

/// A payload of a media type outside the recognized set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedManifest {
    /// Declared media type.
    pub media_type: MediaType,

    /// Raw payload.
    pub payload: Vec<u8>,
}

impl UnrecognizedManifest {
    /// Wraps a raw payload.
    #[must_use]
    pub const fn new(media_type: MediaType, payload: Vec<u8>) -> Self {
        Self {
            media_type,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(n: u8) -> Descriptor {
        Descriptor::new(
            MediaType::new(MediaType::SCHEMA2_LAYER),
            Digest::from_bytes(&[n]),
            u64::from(n) * 100,
        )
    }

    fn config() -> Descriptor {
        Descriptor::new(
            MediaType::new(MediaType::SCHEMA2_CONFIG),
            Digest::from_bytes(b"config"),
            42,
        )
    }

    #[test]
    fn test_schema2_payload_matches_digest() {
        let image = ImageManifest::new(config(), vec![layer(1), layer(2)]).unwrap();
        let manifest = Manifest::Schema2(image);

        assert_eq!(manifest.media_type(), MediaType::SCHEMA2);
        assert_eq!(manifest.digest(), Digest::from_bytes(manifest.payload()));
        assert_eq!(manifest.size(), manifest.payload().len() as u64);
        assert_eq!(manifest.references().len(), 3);
    }

    #[test]
    fn test_from_payload_schema2_keeps_bytes() {
        let original = ImageManifest::new(config(), vec![layer(1)]).unwrap();
        let bytes = Manifest::Schema2(original.clone()).payload().to_vec();

        let parsed = Manifest::from_payload(MediaType::SCHEMA2, bytes.clone()).unwrap();
        assert_eq!(parsed, Manifest::Schema2(original));
        assert_eq!(parsed.payload(), bytes.as_slice());
    }

    #[test]
    fn test_from_payload_oci_index() {
        let payload = br#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:abc",
                "size": 10,
                "platform": {"architecture": "amd64", "os": "linux"}
            }]
        }"#;

        let manifest = Manifest::from_payload(MediaType::OCI_INDEX, payload.to_vec()).unwrap();
        let Manifest::List(list) = &manifest else {
            panic!("expected a manifest list, got {manifest:?}");
        };
        assert_eq!(list.media_type.as_str(), MediaType::OCI_INDEX);
        assert_eq!(list.manifests[0].platform.as_ref().unwrap().architecture, "amd64");
        assert_eq!(manifest.references().len(), 1);
    }

    #[test]
    fn test_from_payload_sniffs_schema1() {
        let payload = br#"{
            "schemaVersion": 1,
            "name": "lib/app",
            "tag": "latest",
            "architecture": "amd64",
            "fsLayers": [{"blobSum": "sha256:abc"}],
            "history": [{"v1Compatibility": "{}"}]
        }"#;

        let manifest = Manifest::from_payload("application/json", payload.to_vec()).unwrap();
        assert!(matches!(&manifest, Manifest::Signed(m) if m.name == "lib/app"));
        assert_eq!(manifest.media_type(), MediaType::SCHEMA1_SIGNED);
        assert_eq!(manifest.references()[0].digest.as_str(), "sha256:abc");
    }

    #[test]
    fn test_unsigned_schema1_keeps_media_type() {
        let payload = br#"{"schemaVersion": 1, "name": "lib/app", "tag": "v1", "fsLayers": []}"#;

        let manifest = Manifest::from_payload(MediaType::SCHEMA1, payload.to_vec()).unwrap();
        assert!(matches!(manifest, Manifest::Signed(_)));
        assert_eq!(manifest.media_type(), MediaType::SCHEMA1);
        assert_eq!(manifest.descriptor().media_type.as_str(), MediaType::SCHEMA1);
    }

    #[test]
    fn test_from_payload_strips_parameters() {
        let payload = Manifest::Oci(OciManifest::new(config(), vec![layer(3)]).unwrap())
            .payload()
            .to_vec();
        let manifest = Manifest::from_payload(
            "application/vnd.oci.image.manifest.v1+json; charset=utf-8",
            payload,
        )
        .unwrap();
        assert!(matches!(manifest, Manifest::Oci(_)));
    }

    #[test]
    fn test_unknown_media_type_is_unrecognized() {
        let manifest =
            Manifest::from_payload("application/vnd.example.thing+json", b"not json".to_vec())
                .unwrap();
        assert!(!manifest.is_recognized());
        assert_eq!(manifest.media_type(), "application/vnd.example.thing+json");
        assert!(manifest.references().is_empty());
    }

    #[test]
    fn test_malformed_recognized_payload_is_rejected() {
        let err =
            Manifest::from_payload(MediaType::SCHEMA2, b"{\"layers\": 3}".to_vec()).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest { .. }));
    }

    #[test]
    fn test_manifest_list_new() {
        let entry =
            Manifest::Schema2(ImageManifest::new(config(), vec![layer(1)]).unwrap()).descriptor();
        let list = Manifest::List(ManifestList::new(vec![entry.clone()]).unwrap());
        assert_eq!(list.media_type(), MediaType::MANIFEST_LIST);
        assert_eq!(list.references(), vec![entry]);
    }
}
