//! OCI Distribution API client for the remote origin.
//!
//! [`RemoteRegistry`] exposes the origin through the same
//! [`ManifestService`] and [`TagService`] contracts as local storage. The
//! remote side is read-only: put, delete, tag, untag and lookup all return
//! [`RegistryError::Unsupported`].

use crate::config::{RemoteAuth, RemoteConfig};
use async_trait::async_trait;
use pullthrough_core::{
    Descriptor, Digest, Manifest, ManifestOptions, ManifestService, MediaType, RegistryError,
    RepositoryName, RepositoryStorage, Result, TagService,
};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LINK,
};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Response body of `GET /v2/<name>/tags/list`.
#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// HTTP plumbing shared by the remote services and the auth challenger.
#[derive(Debug)]
pub(crate) struct RemoteClient {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl RemoteClient {
    fn new(config: RemoteConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self { config, http })
    }

    pub(crate) fn base_url(&self) -> &str {
        self.config.base_url()
    }

    pub(crate) const fn has_credentials(&self) -> bool {
        self.config.auth.has_credentials()
    }

    pub(crate) fn get(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self.http.get(url).headers(self.auth_headers()?))
    }

    fn head(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self.http.head(url).headers(self.auth_headers()?))
    }

    fn repository_url(&self, repository: &RepositoryName, path: &str) -> String {
        format!("{}/v2/{repository}/{path}", self.base_url())
    }

    /// Creates authentication headers based on configuration.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        match &self.config.auth {
            RemoteAuth::None => {}
            RemoteAuth::Basic { username, password } => {
                let credentials = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{username}:{password}"),
                );
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Basic {credentials}")).map_err(|_| {
                        RegistryError::Unauthorized {
                            message: "Invalid credentials".to_string(),
                        }
                    })?,
                );
            }
            RemoteAuth::Bearer { token } => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                        RegistryError::Unauthorized {
                            message: "Invalid token".to_string(),
                        }
                    })?,
                );
            }
        }

        Ok(headers)
    }
}

/// Maps a non-success response to an error.
pub(crate) async fn error_from_response(response: Response) -> RegistryError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED {
        RegistryError::Unauthorized { message }
    } else {
        RegistryError::HttpError {
            status: status.as_u16(),
            message,
        }
    }
}

/// Builds the HTTP client with proper configuration.
fn build_http_client(config: &RemoteConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(&config.user_agent);

    if let Some(ref tls) = config.tls {
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref ca_cert) = tls.ca_cert {
            let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                path: ca_cert.clone(),
                source: e,
            })?;
            let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                RegistryError::InvalidConfiguration {
                    message: format!("Invalid CA certificate: {e}"),
                }
            })?;
            builder = builder.add_root_certificate(cert);
        }
    }

    builder.build().map_err(|e| RegistryError::ConnectionFailed {
        url: config.url.clone(),
        source: e,
    })
}

/// The remote origin registry.
#[derive(Debug, Clone)]
pub struct RemoteRegistry {
    client: Arc<RemoteClient>,
}

impl RemoteRegistry {
    /// Creates a client for the configured origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    ///
    /// # Examples
    ///
    /// ```
    /// use pullthrough_proxy::{RemoteConfig, RemoteRegistry};
    ///
    /// let remote = RemoteRegistry::new(RemoteConfig::new("https://registry.example.com"))?;
    /// assert_eq!(remote.config().base_url(), "https://registry.example.com");
    /// # Ok::<(), pullthrough_core::RegistryError>(())
    /// ```
    pub fn new(config: RemoteConfig) -> Result<Self> {
        config.validate().map_err(|_| RegistryError::InvalidUrl {
            url: config.url.clone(),
        })?;

        Ok(Self {
            client: Arc::new(RemoteClient::new(config)?),
        })
    }

    /// Returns the remote configuration.
    #[must_use]
    pub fn config(&self) -> &RemoteConfig {
        &self.client.config
    }

    /// Returns the manifest service for `repository`.
    #[must_use]
    pub fn manifest_service(&self, repository: &RepositoryName) -> RemoteManifestService {
        RemoteManifestService {
            client: Arc::clone(&self.client),
            repository: repository.clone(),
        }
    }

    /// Returns the tag service for `repository`.
    #[must_use]
    pub fn tag_service(&self, repository: &RepositoryName) -> RemoteTagService {
        RemoteTagService {
            client: Arc::clone(&self.client),
            repository: repository.clone(),
        }
    }

    pub(crate) fn client(&self) -> Arc<RemoteClient> {
        Arc::clone(&self.client)
    }
}

impl RepositoryStorage for RemoteRegistry {
    fn manifests(&self, name: &RepositoryName) -> Arc<dyn ManifestService> {
        Arc::new(self.manifest_service(name))
    }

    fn tags(&self, name: &RepositoryName) -> Arc<dyn TagService> {
        Arc::new(self.tag_service(name))
    }
}

fn accept_header(options: &ManifestOptions) -> String {
    if options.accept.is_empty() {
        MediaType::manifest_accept_list().join(", ")
    } else {
        options.accept.join(", ")
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Read-only manifest access to one remote repository.
#[derive(Debug, Clone)]
pub struct RemoteManifestService {
    client: Arc<RemoteClient>,
    repository: RepositoryName,
}

impl RemoteManifestService {
    async fn fetch(&self, reference: &str, options: &ManifestOptions) -> Result<Manifest> {
        let url = self
            .client
            .repository_url(&self.repository, &format!("manifests/{reference}"));

        let response = self
            .client
            .get(&url)?
            .header(ACCEPT, accept_header(options))
            .send()
            .await?;

        if !response.status().is_success() {
            if response.status() == StatusCode::NOT_FOUND {
                return Err(RegistryError::ManifestUnknown {
                    digest: reference.to_string(),
                });
            }
            return Err(error_from_response(response).await);
        }

        let media_type = header_str(response.headers(), CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_string();
        let payload = response.bytes().await?.to_vec();

        Manifest::from_payload(&media_type, payload)
    }
}

#[async_trait]
impl ManifestService for RemoteManifestService {
    async fn exists(&self, digest: &Digest) -> Result<bool> {
        digest.validate()?;
        let url = self
            .client
            .repository_url(&self.repository, &format!("manifests/{digest}"));

        let response = self
            .client
            .head(&url)?
            .header(ACCEPT, accept_header(&ManifestOptions::default()))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_from_response(response).await),
        }
    }

    async fn get(&self, digest: &Digest, options: &ManifestOptions) -> Result<Manifest> {
        digest.ensure_supported()?;
        let manifest = self.fetch(digest.as_str(), options).await?;

        if !digest.verify(manifest.payload())? {
            let actual = Digest::from_bytes_with(digest.algorithm(), manifest.payload())?;
            return Err(RegistryError::InvalidManifest {
                message: format!("Digest mismatch: expected {digest}, got {actual}"),
            });
        }

        debug!(
            repository = %self.repository,
            digest = %digest,
            size = manifest.size(),
            "Fetched remote manifest"
        );
        Ok(manifest)
    }

    async fn put(&self, _manifest: &Manifest, _options: &ManifestOptions) -> Result<Digest> {
        Err(RegistryError::unsupported("put manifest to remote"))
    }

    async fn delete(&self, _digest: &Digest) -> Result<()> {
        Err(RegistryError::unsupported("delete manifest from remote"))
    }
}

/// Read-only tag access to one remote repository.
#[derive(Debug, Clone)]
pub struct RemoteTagService {
    client: Arc<RemoteClient>,
    repository: RepositoryName,
}

impl RemoteTagService {
    /// Resolves a tag with a full GET when the origin omits the digest header.
    async fn get_by_content(&self, tag: &str) -> Result<Descriptor> {
        let manifests = RemoteManifestService {
            client: Arc::clone(&self.client),
            repository: self.repository.clone(),
        };

        let manifest = manifests
            .fetch(tag, &ManifestOptions::new().with_tag(tag))
            .await
            .map_err(|e| match e {
                RegistryError::ManifestUnknown { .. } => RegistryError::TagUnknown {
                    tag: tag.to_string(),
                },
                other => other,
            })?;

        Ok(manifest.descriptor())
    }
}

/// Returns the `rel="next"` target of a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = header_str(headers, LINK.as_str())?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"" || p.trim() == "rel=next");
        is_next.then(|| {
            target
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}

#[async_trait]
impl TagService for RemoteTagService {
    async fn get(&self, tag: &str) -> Result<Descriptor> {
        if !pullthrough_core::reference::is_valid_tag(tag) {
            return Err(RegistryError::InvalidReference {
                reference: format!("{}:{tag}", self.repository),
            });
        }

        let url = self
            .client
            .repository_url(&self.repository, &format!("manifests/{tag}"));

        let response = self
            .client
            .head(&url)?
            .header(ACCEPT, accept_header(&ManifestOptions::default()))
            .send()
            .await?;

        if !response.status().is_success() {
            if response.status() == StatusCode::NOT_FOUND {
                return Err(RegistryError::TagUnknown {
                    tag: tag.to_string(),
                });
            }
            return Err(error_from_response(response).await);
        }

        let headers = response.headers();
        let Some(digest) = header_str(headers, DOCKER_CONTENT_DIGEST) else {
            return self.get_by_content(tag).await;
        };

        let digest = Digest::parse(digest)?;
        let media_type = header_str(headers, CONTENT_TYPE.as_str()).unwrap_or_default();
        let size = header_str(headers, CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        Ok(Descriptor::new(MediaType::new(media_type), digest, size))
    }

    async fn tag(&self, _tag: &str, _descriptor: &Descriptor) -> Result<()> {
        Err(RegistryError::unsupported("tag on remote"))
    }

    async fn untag(&self, _tag: &str) -> Result<()> {
        Err(RegistryError::unsupported("untag on remote"))
    }

    async fn all(&self) -> Result<Vec<String>> {
        let first = self.client.repository_url(&self.repository, "tags/list");
        let first =
            url::Url::parse(&first).map_err(|_| RegistryError::InvalidUrl { url: first })?;
        let mut next = Some(first);
        let mut tags = Vec::new();

        while let Some(url) = next.take() {
            let response = self.client.get(url.as_str())?.send().await?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            next = match next_link(response.headers()) {
                Some(link) => Some(
                    url.join(&link)
                        .map_err(|_| RegistryError::InvalidUrl { url: link })?,
                ),
                None => None,
            };

            let page: TagList = response.json().await?;
            tags.extend(page.tags.unwrap_or_default());
        }

        Ok(tags)
    }

    async fn lookup(&self, _descriptor: &Descriptor) -> Result<Vec<String>> {
        Err(RegistryError::unsupported("tag lookup on remote"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;

    fn client(auth: RemoteAuth) -> RemoteClient {
        RemoteClient::new(RemoteConfig::new("https://example.com/").with_auth(auth)).unwrap()
    }

    #[test]
    fn test_remote_creation() {
        assert!(RemoteRegistry::new(RemoteConfig::new("https://registry.example.com")).is_ok());
    }

    #[test]
    fn test_remote_rejects_bad_url() {
        let err = RemoteRegistry::new(RemoteConfig::new("registry.example.com")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl { .. }));
    }

    #[test]
    fn test_missing_ca_cert() {
        let config = RemoteConfig::new("https://example.com")
            .with_tls(TlsConfig::new().with_ca_cert("/nonexistent/ca.pem"));
        assert!(matches!(
            RemoteRegistry::new(config),
            Err(RegistryError::IoError { .. })
        ));
    }

    #[test]
    fn test_auth_headers_none() {
        assert!(client(RemoteAuth::None).auth_headers().unwrap().is_empty());
    }

    #[test]
    fn test_auth_headers_basic() {
        let headers = client(RemoteAuth::basic("user", "pass")).auth_headers().unwrap();
        // base64("user:pass")
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_auth_headers_bearer() {
        let headers = client(RemoteAuth::bearer("my-token")).auth_headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer my-token");
    }

    #[test]
    fn test_repository_url() {
        let name = RepositoryName::parse("lib/app").unwrap();
        assert_eq!(
            client(RemoteAuth::None).repository_url(&name, "tags/list"),
            "https://example.com/v2/lib/app/tags/list"
        );
    }

    #[test]
    fn test_accept_header() {
        let default = accept_header(&ManifestOptions::default());
        assert!(default.contains(MediaType::OCI_MANIFEST));
        assert!(default.contains(MediaType::MANIFEST_LIST));

        let options = ManifestOptions::new().with_accept(MediaType::SCHEMA2);
        assert_eq!(accept_header(&options), MediaType::SCHEMA2);
    }

    #[test]
    fn test_next_link() {
        let mut headers = HeaderMap::new();
        assert_eq!(next_link(&headers), None);

        headers.insert(
            LINK,
            HeaderValue::from_static("</v2/lib/app/tags/list?last=b&n=2>; rel=\"next\""),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("/v2/lib/app/tags/list?last=b&n=2")
        );

        headers.insert(LINK, HeaderValue::from_static("</v2/other>; rel=\"prev\""));
        assert_eq!(next_link(&headers), None);
    }

    #[tokio::test]
    async fn test_remote_writes_unsupported() {
        let remote = RemoteRegistry::new(RemoteConfig::new("https://example.com")).unwrap();
        let name = RepositoryName::parse("lib/app").unwrap();
        let digest = Digest::from_bytes(b"{}");

        let manifests = remote.manifests(&name);
        assert!(matches!(
            manifests.delete(&digest).await,
            Err(RegistryError::Unsupported { .. })
        ));

        let tags = remote.tags(&name);
        let descriptor = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), digest, 2);
        assert!(matches!(
            tags.tag("latest", &descriptor).await,
            Err(RegistryError::Unsupported { .. })
        ));
        assert!(matches!(
            tags.untag("latest").await,
            Err(RegistryError::Unsupported { .. })
        ));
        assert!(matches!(
            tags.lookup(&descriptor).await,
            Err(RegistryError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_tag_rejected_before_request() {
        let remote = RemoteRegistry::new(RemoteConfig::new("https://example.com")).unwrap();
        let name = RepositoryName::parse("lib/app").unwrap();
        let err = remote.tag_service(&name).get("../escape").await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidReference { .. }));
    }
}
