//! Repository names and references.
//!
//! Supports the following reference formats:
//! - `lib/app` → repository name only
//! - `lib/app:latest` → repository name with tag
//! - `lib/app@sha256:abc...` → repository name with digest
//! - `registry.example.com:5000/lib/app:v1` → host-qualified name with tag

use crate::digest::Digest;
use crate::error::RegistryError;

/// Maximum total length of a repository name.
pub const NAME_TOTAL_LENGTH_MAX: usize = 255;

/// Maximum length of a tag.
pub const TAG_LENGTH_MAX: usize = 128;

/// A validated repository name (e.g., `library/ubuntu`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Parses and validates a repository name.
    ///
    /// Path components are lowercase alphanumerics, optionally separated by
    /// `.`, `_`, `__` or runs of `-`. The first component may instead be a
    /// registry host with an optional port.
    ///
    /// # Examples
    ///
    /// ```
    /// use pullthrough_core::RepositoryName;
    ///
    /// assert!(RepositoryName::parse("lib/app").is_ok());
    /// assert!(RepositoryName::parse("localhost:5000/my_app").is_ok());
    /// assert!(RepositoryName::parse("Lib/App").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if the name is malformed
    /// or longer than [`NAME_TOTAL_LENGTH_MAX`].
    pub fn parse(name: &str) -> Result<Self, RegistryError> {
        let invalid = || RegistryError::InvalidReference {
            reference: name.to_string(),
        };

        if name.is_empty() || name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(invalid());
        }

        let mut components = name.split('/').peekable();
        let first = components.next().ok_or_else(invalid)?;
        let has_more = components.peek().is_some();

        let first_ok = if has_more && looks_like_host(first) {
            is_valid_host(first)
        } else {
            is_valid_component(first)
        };

        if first_ok && components.all(is_valid_component) {
            Ok(Self(name.to_string()))
        } else {
            Err(invalid())
        }
    }

    /// Returns the name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A repository name optionally combined with a tag and/or digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    name: RepositoryName,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl Reference {
    /// Creates a name-only reference.
    #[must_use]
    pub const fn named(name: RepositoryName) -> Self {
        Self {
            name,
            tag: None,
            digest: None,
        }
    }

    /// Combines a repository name with a digest.
    ///
    /// # Examples
    ///
    /// ```
    /// use pullthrough_core::{Digest, Reference, RepositoryName};
    ///
    /// let name = RepositoryName::parse("lib/app")?;
    /// let reference = Reference::with_digest(&name, &Digest::new("sha256:abc"))?;
    /// assert_eq!(reference.to_string(), "lib/app@sha256:abc");
    /// # Ok::<(), pullthrough_core::RegistryError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if the digest is malformed.
    pub fn with_digest(name: &RepositoryName, digest: &Digest) -> Result<Self, RegistryError> {
        digest.validate().map_err(|_| RegistryError::InvalidReference {
            reference: format!("{name}@{digest}"),
        })?;

        Ok(Self {
            name: name.clone(),
            tag: None,
            digest: Some(digest.clone()),
        })
    }

    /// Combines a repository name with a tag.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if the tag is malformed.
    pub fn with_tag(name: &RepositoryName, tag: &str) -> Result<Self, RegistryError> {
        if !is_valid_tag(tag) {
            return Err(RegistryError::InvalidReference {
                reference: format!("{name}:{tag}"),
            });
        }

        Ok(Self {
            name: name.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        })
    }

    /// Parses `name`, `name:tag`, `name@digest` or `name:tag@digest`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if any part is malformed.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let input = input.trim();
        let invalid = || RegistryError::InvalidReference {
            reference: input.to_string(),
        };

        let (remainder, digest) = match input.split_once('@') {
            Some((remainder, digest)) => {
                let digest = Digest::new(digest);
                digest.validate().map_err(|_| invalid())?;
                (remainder, Some(digest))
            }
            None => (input, None),
        };

        // A ':' after the last '/' introduces the tag; earlier ones are ports.
        let last_slash = remainder.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match remainder[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&remainder[..split], Some(&remainder[split + 1..]))
            }
            None => (remainder, None),
        };

        let name = RepositoryName::parse(name).map_err(|_| invalid())?;
        if let Some(tag) = tag {
            if !is_valid_tag(tag) {
                return Err(invalid());
            }
        }

        Ok(Self {
            name,
            tag: tag.map(ToString::to_string),
            digest,
        })
    }

    /// Returns the repository name.
    #[must_use]
    pub const fn name(&self) -> &RepositoryName {
        &self.name
    }

    /// Returns the tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns the digest, if any.
    #[must_use]
    pub const fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Returns true if `tag` matches `[\w][\w.-]{0,127}`.
#[must_use]
pub fn is_valid_tag(tag: &str) -> bool {
    let word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let bytes = tag.as_bytes();

    match bytes.split_first() {
        Some((&first, rest)) => {
            tag.len() <= TAG_LENGTH_MAX
                && word(first)
                && rest.iter().all(|&b| word(b) || b == b'.' || b == b'-')
        }
        None => false,
    }
}

fn looks_like_host(component: &str) -> bool {
    component.contains(['.', ':']) || component == "localhost"
}

fn is_valid_host(host: &str) -> bool {
    let (domain, port) = match host.split_once(':') {
        Some((domain, port)) => (domain, Some(port)),
        None => (host, None),
    };

    let label_ok = |label: &str| {
        let bytes = label.as_bytes();
        !bytes.is_empty()
            && bytes[0].is_ascii_alphanumeric()
            && bytes[bytes.len() - 1].is_ascii_alphanumeric()
            && bytes.iter().all(|&b| b.is_ascii_alphanumeric() || b == b'-')
    };

    domain.split('.').all(label_ok)
        && port.map_or(true, |p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

fn is_valid_component(component: &str) -> bool {
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = component.as_bytes();

    if bytes.is_empty() || !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }

    let mut separator = String::new();
    for &b in bytes {
        if alnum(b) {
            let ok = matches!(separator.as_str(), "" | "." | "_" | "__")
                || separator.bytes().all(|s| s == b'-');
            if !ok {
                return false;
            }
            separator.clear();
        } else if matches!(b, b'.' | b'_' | b'-') {
            separator.push(char::from(b));
        } else {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_repository_name_valid() {
        for name in [
            "app",
            "lib/app",
            "a/b/c",
            "my_app",
            "my__app",
            "my---app",
            "my.app",
            "registry.example.com/lib/app",
            "localhost:5000/app",
            "localhost/app",
        ] {
            assert!(RepositoryName::parse(name).is_ok(), "expected {name:?} to be valid");
        }
    }

    #[test]
    fn test_repository_name_invalid() {
        for name in [
            "",
            "Lib/app",
            "lib//app",
            "/app",
            "app/",
            "my___app",
            "my.-app",
            "-app",
            "app_",
            "lib/app:tag",
        ] {
            assert!(RepositoryName::parse(name).is_err(), "expected {name:?} to be invalid");
        }
    }

    #[test]
    fn test_repository_name_length_limit() {
        let name = "a".repeat(NAME_TOTAL_LENGTH_MAX + 1);
        assert!(RepositoryName::parse(&name).is_err());
        let name = "a".repeat(NAME_TOTAL_LENGTH_MAX);
        assert!(RepositoryName::parse(&name).is_ok());
    }

    #[test]
    fn test_with_digest() {
        let name = RepositoryName::parse("lib/app").unwrap();
        let reference = Reference::with_digest(&name, &Digest::new("sha256:abc")).unwrap();
        assert_eq!(reference.to_string(), "lib/app@sha256:abc");
        assert_eq!(reference.digest().unwrap().as_str(), "sha256:abc");
        assert!(reference.tag().is_none());
    }

    #[test]
    fn test_with_digest_rejects_malformed_digest() {
        let name = RepositoryName::parse("lib/app").unwrap();
        let err = Reference::with_digest(&name, &Digest::new("not-a-digest")).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidReference { reference } if reference == "lib/app@not-a-digest"
        ));
    }

    #[test]
    fn test_with_tag() {
        let name = RepositoryName::parse("lib/app").unwrap();
        assert_eq!(Reference::with_tag(&name, "v1.2.3").unwrap().to_string(), "lib/app:v1.2.3");
        assert!(Reference::with_tag(&name, ".hidden").is_err());
        assert!(Reference::with_tag(&name, &"t".repeat(TAG_LENGTH_MAX + 1)).is_err());
    }

    #[test]
    fn test_parse_forms() {
        let r = Reference::parse("lib/app").unwrap();
        assert_eq!(r.name().as_str(), "lib/app");
        assert!(r.tag().is_none() && r.digest().is_none());

        let r = Reference::parse("lib/app:latest").unwrap();
        assert_eq!(r.tag(), Some("latest"));

        let r = Reference::parse("lib/app@sha256:abc").unwrap();
        assert_eq!(r.digest().map(Digest::as_str), Some("sha256:abc"));

        let r = Reference::parse("localhost:5000/lib/app:v1@sha256:abc").unwrap();
        assert_eq!(r.name().as_str(), "localhost:5000/lib/app");
        assert_eq!(r.tag(), Some("v1"));
        assert_eq!(r.to_string(), "localhost:5000/lib/app:v1@sha256:abc");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Reference::parse("lib/app@nope").is_err());
        assert!(Reference::parse("lib/app:").is_err());
        assert!(Reference::parse("LIB/app").is_err());
    }

    proptest! {
        #[test]
        fn prop_digest_reference_display_roundtrips(
            name in "[a-z0-9]{1,10}(/[a-z0-9]{1,10}){0,3}",
            hex in "[0-9a-f]{1,64}",
        ) {
            let name = RepositoryName::parse(&name).unwrap();
            let digest = Digest::new(format!("sha256:{hex}"));
            let reference = Reference::with_digest(&name, &digest).unwrap();
            let parsed = Reference::parse(&reference.to_string()).unwrap();
            prop_assert_eq!(parsed, reference);
        }

        #[test]
        fn prop_valid_tags_accepted(tag in "[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}") {
            prop_assert!(is_valid_tag(&tag));
        }

        #[test]
        fn prop_uppercase_names_rejected(name in "[a-z]{0,5}[A-Z][a-z]{0,5}") {
            prop_assert!(RepositoryName::parse(&name).is_err());
        }
    }
}
