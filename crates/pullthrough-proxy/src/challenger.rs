//! Authentication challenge discovery for the remote origin.

use crate::remote::{error_from_response, RemoteClient, RemoteRegistry};
use async_trait::async_trait;
use pullthrough_core::{AuthChallenger, RegistryError, Result};
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Lowercased scheme (e.g., `bearer`, `basic`).
    pub scheme: String,

    /// Challenge parameters keyed by lowercased name.
    pub parameters: HashMap<String, String>,
}

impl AuthChallenge {
    /// Parses one challenge such as
    /// `Bearer realm="https://auth.example.com/token",service="registry"`.
    ///
    /// Returns `None` if the header has no scheme.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
        if scheme.is_empty() {
            return None;
        }

        Some(Self {
            scheme: scheme.to_ascii_lowercase(),
            parameters: parse_parameters(rest),
        })
    }

    /// Returns the `realm` parameter, if present.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.parameters.get("realm").map(String::as_str)
    }
}

fn parse_parameters(input: &str) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    let mut rest = input.trim_start();

    while let Some((key, after_key)) = rest.split_once('=') {
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after_key = after_key.trim_start();

        let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            let mut end = quoted.len();
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        end = i + 1;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            (value, &quoted[end..])
        } else {
            let end = after_key.find(',').unwrap_or(after_key.len());
            (after_key[..end].trim().to_string(), &after_key[end..])
        };

        if !key.is_empty() {
            parameters.insert(key, value);
        }
        rest = remainder.trim_start().trim_start_matches(',');
    }

    parameters
}

/// [`AuthChallenger`] that pings the origin's `/v2/` endpoint once and
/// records the challenges it answers with.
///
/// Concurrent callers share a single ping. A failed ping is not cached, so
/// the next call tries again.
pub struct RemoteAuthChallenger {
    client: Arc<RemoteClient>,
    challenges: OnceCell<Vec<AuthChallenge>>,
}

impl RemoteAuthChallenger {
    /// Creates a challenger for `remote`.
    #[must_use]
    pub fn new(remote: &RemoteRegistry) -> Self {
        Self {
            client: remote.client(),
            challenges: OnceCell::new(),
        }
    }

    /// Returns the challenges recorded by a successful ping.
    #[must_use]
    pub fn challenges(&self) -> Option<&[AuthChallenge]> {
        self.challenges.get().map(Vec::as_slice)
    }

    async fn ping(&self) -> Result<Vec<AuthChallenge>> {
        let url = format!("{}/v2/", self.client.base_url());
        let response = self.client.get(&url)?.send().await?;

        match response.status() {
            status if status.is_success() => Ok(Vec::new()),
            StatusCode::UNAUTHORIZED => {
                let challenges: Vec<_> = response
                    .headers()
                    .get_all(WWW_AUTHENTICATE)
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .filter_map(AuthChallenge::parse)
                    .collect();

                if !self.client.has_credentials() {
                    return Err(RegistryError::Unauthorized {
                        message: format!(
                            "{url} requires authentication and no credentials are configured"
                        ),
                    });
                }

                debug!(url = %url, count = challenges.len(), "Recorded remote auth challenges");
                Ok(challenges)
            }
            _ => Err(error_from_response(response).await),
        }
    }
}

impl std::fmt::Debug for RemoteAuthChallenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAuthChallenger")
            .field("base_url", &self.client.base_url())
            .field("challenges", &self.challenges.get())
            .finish()
    }
}

#[async_trait]
impl AuthChallenger for RemoteAuthChallenger {
    async fn try_establish_challenges(&self) -> Result<()> {
        self.challenges.get_or_try_init(|| self.ping()).await?;
        Ok(())
    }
}
