//! Content digests.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha384, Sha512};

/// Content-derived identity of a byte payload, in `algorithm:hex` form.
///
/// A `Digest` is an opaque string: constructing one does not validate it.
/// Call [`Digest::validate`] (or build a [`Reference`](crate::Reference))
/// to check the format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// The canonical digest algorithm.
    pub const SHA256: &'static str = "sha256";

    /// SHA-384.
    pub const SHA384: &'static str = "sha384";

    /// SHA-512.
    pub const SHA512: &'static str = "sha512";

    /// Wraps a digest string without validating it.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Computes the SHA-256 digest of `data`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pullthrough_core::Digest;
    ///
    /// let digest = Digest::from_bytes(b"hello");
    /// assert_eq!(digest.algorithm(), "sha256");
    /// assert_eq!(digest.hex().len(), 64);
    /// ```
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(format!("{}:{}", Self::SHA256, hex::encode(hasher.finalize())))
    }

    /// Computes the digest of `data` with a named algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] unless `algorithm` is one of
    /// `sha256`, `sha384` or `sha512`.
    pub fn from_bytes_with(algorithm: &str, data: &[u8]) -> Result<Self, RegistryError> {
        let encoded = match algorithm {
            Self::SHA256 => encode::<Sha256>(data),
            Self::SHA384 => encode::<Sha384>(data),
            Self::SHA512 => encode::<Sha512>(data),
            _ => {
                return Err(RegistryError::InvalidDigest {
                    digest: format!("{algorithm}:"),
                })
            }
        };
        Ok(Self(format!("{algorithm}:{encoded}")))
    }

    /// Returns true if `data` hashes to this digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] if the digest is malformed or
    /// its algorithm is not supported.
    pub fn verify(&self, data: &[u8]) -> Result<bool, RegistryError> {
        self.ensure_supported()?;
        Ok(Self::from_bytes_with(self.algorithm(), data)? == *self)
    }

    /// Checks the format and that the algorithm is one this crate can compute.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] otherwise.
    pub fn ensure_supported(&self) -> Result<(), RegistryError> {
        self.validate()?;
        match self.algorithm() {
            Self::SHA256 | Self::SHA384 | Self::SHA512 => Ok(()),
            _ => Err(RegistryError::InvalidDigest {
                digest: self.0.clone(),
            }),
        }
    }

    /// Parses and validates a digest string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] if the string is not of the
    /// form `algorithm:hex`.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let digest = Self::new(input.trim());
        digest.validate()?;
        Ok(digest)
    }

    /// Checks that the digest has the `algorithm:hex` shape.
    ///
    /// The algorithm is one or more lowercase alphanumeric components joined
    /// by `+`, `.`, `_` or `-`; the encoded part is non-empty lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDigest`] when the format is wrong.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let invalid = || RegistryError::InvalidDigest {
            digest: self.0.clone(),
        };

        let (algorithm, encoded) = self.0.split_once(':').ok_or_else(invalid)?;

        let algorithm_ok = !algorithm.is_empty()
            && algorithm.split(['+', '.', '_', '-']).all(|component| {
                !component.is_empty()
                    && component
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            });
        let encoded_ok = !encoded.is_empty()
            && encoded
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        if algorithm_ok && encoded_ok {
            Ok(())
        } else {
            Err(invalid())
        }
    }

    /// Returns the digest algorithm (e.g., "sha256").
    #[must_use]
    pub fn algorithm(&self) -> &str {
        self.0.split(':').next().unwrap_or(Self::SHA256)
    }

    /// Returns the encoded value (without algorithm prefix).
    #[must_use]
    pub fn hex(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, hex)| hex)
    }

    /// Returns the digest string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn encode<D: sha2::Digest>(data: &[u8]) -> String {
    hex::encode(D::digest(data))
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Digest {
    fn from(s: String) -> Self {
        Self(s)
    }
}
