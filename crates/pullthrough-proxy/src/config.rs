//! Configuration types for the proxy.
//!
//! Every type can be built in code with `with_*` methods or loaded from YAML:
//!
//! ```yaml
//! remote:
//!   url: https://registry-1.docker.io
//!   auth:
//!     type: basic
//!     username: puller
//!     password: secret
//!   timeout_secs: 30
//! eviction_ttl_secs: 604800
//! scheduler:
//!   state_file: /var/lib/pullthrough/scheduler-state.json
//!   save_interval_secs: 5
//! ```

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default eviction horizon for manifests cached via remote fallback (7 days).
pub const DEFAULT_EVICTION_TTL: Duration = Duration::from_secs(168 * 60 * 60);

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Failed to read config at {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be parsed.
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Remote URL is not absolute http(s).
    #[error("Invalid remote URL '{url}': {reason}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A setting is outside its allowed range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Setting name as written in YAML.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Top-level proxy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Remote origin.
    pub remote: RemoteConfig,

    /// How long a manifest cached via remote fallback is kept.
    #[serde(
        rename = "eviction_ttl_secs",
        default = "default_eviction_ttl",
        deserialize_with = "deserialize_secs"
    )]
    pub eviction_ttl: Duration,

    /// Eviction scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_eviction_ttl() -> Duration {
    DEFAULT_EVICTION_TTL
}

impl ProxyConfig {
    /// Creates a configuration for the given remote origin URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use pullthrough_proxy::{ProxyConfig, DEFAULT_EVICTION_TTL};
    ///
    /// let config = ProxyConfig::new("https://registry.example.com");
    /// assert_eq!(config.eviction_ttl, DEFAULT_EVICTION_TTL);
    /// ```
    #[must_use]
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote: RemoteConfig::new(remote_url),
            eviction_ttl: DEFAULT_EVICTION_TTL,
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Sets the remote configuration.
    #[must_use]
    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }

    /// Sets the eviction horizon.
    #[must_use]
    pub const fn with_eviction_ttl(mut self, ttl: Duration) -> Self {
        self.eviction_ttl = ttl;
        self
    }

    /// Sets the scheduler configuration.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed, the remote URL is
    /// not an absolute http(s) URL, or the scheduler settings are invalid.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.remote.validate()?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Loads a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&yaml)
    }
}

/// Remote origin configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Registry URL (e.g., "<https://registry-1.docker.io>").
    pub url: String,

    /// Credentials presented to the origin.
    #[serde(default)]
    pub auth: RemoteAuth,

    /// Request timeout.
    #[serde(
        rename = "timeout_secs",
        default = "default_timeout",
        deserialize_with = "deserialize_secs"
    )]
    pub timeout: Duration,

    /// TLS configuration.
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("pullthrough/{}", env!("CARGO_PKG_VERSION"))
}

impl RemoteConfig {
    /// Creates a remote configuration for `url`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pullthrough_proxy::RemoteConfig;
    ///
    /// let config = RemoteConfig::new("https://registry.example.com/");
    /// assert_eq!(config.base_url(), "https://registry.example.com");
    /// ```
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: RemoteAuth::None,
            timeout: default_timeout(),
            tls: None,
            user_agent: default_user_agent(),
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: RemoteAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Returns the URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Checks that the URL is an absolute http(s) URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }
}

/// Credentials presented to the remote origin.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteAuth {
    /// Anonymous access.
    #[default]
    None,

    /// Basic authentication (username/password or username/token).
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },

    /// Pre-issued bearer token.
    Bearer {
        /// Token value.
        token: String,
    },
}

impl RemoteAuth {
    /// Creates basic authentication.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates bearer token authentication.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Returns true if any credentials are configured.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// TLS configuration for the origin connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// Path to an additional CA certificate (PEM).
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    /// Whether to skip certificate verification (NOT recommended for production).
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Creates a new TLS configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ca_cert: None,
            insecure_skip_verify: false,
        }
    }

    /// Sets the CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Enables insecure mode (skips certificate verification).
    ///
    /// # Warning
    ///
    /// This should only be used for testing. Never use in production.
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }
}

/// Configuration for the TTL eviction scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// File the pending evictions are persisted to. `None` keeps them in memory only.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// How often pending changes are flushed to the state file.
    #[serde(
        rename = "save_interval_secs",
        default = "default_save_interval",
        deserialize_with = "deserialize_secs"
    )]
    pub save_interval: Duration,
}

fn default_save_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            save_interval: default_save_interval(),
        }
    }
}

impl SchedulerConfig {
    /// Persists pending evictions to `path`.
    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Sets the state flush interval.
    #[must_use]
    pub const fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Checks that the flush interval is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero `save_interval`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.save_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "save_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
