//! Error types for registry cache operations.
//!
//! Every capability (local storage, remote origin, auth challenger) reports
//! failures through [`RegistryError`], so the proxy resolvers can propagate
//! them with `?` without translating them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`RegistryError`] as the error type.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry cache operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to the remote registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The remote registry rejected the request credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Error message.
        message: String,
    },

    /// Manifest not found.
    #[error("Manifest unknown: {digest}")]
    ManifestUnknown {
        /// Requested digest.
        digest: String,
    },

    /// Tag not found.
    #[error("Tag unknown: {tag}")]
    TagUnknown {
        /// Requested tag.
        tag: String,
    },

    /// The operation is not offered by this service.
    #[error("Operation not supported: {operation}")]
    Unsupported {
        /// Operation name.
        operation: String,
    },

    /// Put of a manifest whose variant is not one of the recognized kinds.
    #[error("unrecognized manifest type {media_type}")]
    UnrecognizedManifestType {
        /// Media type of the rejected manifest.
        media_type: String,
    },

    /// Manifest payload could not be interpreted.
    #[error("Invalid manifest: {message}")]
    InvalidManifest {
        /// Error message.
        message: String,
    },

    /// Invalid reference format.
    #[error("Invalid reference format: {reference}")]
    InvalidReference {
        /// Reference string.
        reference: String,
    },

    /// Invalid digest format.
    #[error("Invalid digest: {digest}")]
    InvalidDigest {
        /// Digest string.
        digest: String,
    },

    /// Local storage operation failed.
    #[error("Storage operation failed: {message}")]
    StorageError {
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP error from the remote registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// Client configuration could not be applied (e.g., a malformed CA certificate).
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message.
        message: String,
    },
}

impl RegistryError {
    /// Creates an [`RegistryError::Unsupported`] error for the named operation.
    #[must_use]
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Returns true if this error means the entity does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ManifestUnknown { .. } | Self::TagUnknown { .. })
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else if err.is_status() {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                status,
                message: err.to_string(),
            }
        } else {
            Self::HttpError {
                status: 0,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}
