//! # Pullthrough Proxy
//!
//! Pull-through cache resolvers for OCI container registries.
//!
//! A [`ProxyRegistry`] combines local storage with a remote origin. For each
//! repository it builds:
//!
//! - [`ProxyManifestStore`] - serves manifests locally, falls back to the
//!   remote on a miss, writes the result through and schedules its eviction
//! - [`ProxyTagService`] - resolves tags locally first, but lists them from
//!   the remote whenever it is reachable
//!
//! The collaborators it needs are provided here as well:
//! [`RemoteRegistry`] (origin client), [`RemoteAuthChallenger`] (auth gate),
//! [`TtlScheduler`] with [`LocalEvictor`] (time-based eviction).
//!
//! ## Example
//!
//! ```rust,no_run
//! use pullthrough_core::{ManifestOptions, ManifestService, RepositoryName, TagService};
//! use pullthrough_metrics::PrometheusMetrics;
//! use pullthrough_proxy::{
//!     LocalEvictor, ProxyConfig, ProxyRegistry, RemoteAuthChallenger, RemoteRegistry,
//!     TtlScheduler,
//! };
//! use pullthrough_storage::{FsStorage, StorageConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProxyConfig::from_file("pullthrough.yaml")?;
//!
//! let local = Arc::new(FsStorage::new(StorageConfig::default())?);
//! let remote = RemoteRegistry::new(config.remote.clone())?;
//! let challenger = Arc::new(RemoteAuthChallenger::new(&remote));
//! let evictor = Arc::new(LocalEvictor::new(local.clone()));
//! let scheduler = TtlScheduler::start(config.scheduler.clone(), evictor)?;
//!
//! let proxy = ProxyRegistry::new(
//!     local,
//!     Arc::new(remote),
//!     challenger,
//!     Arc::new(scheduler),
//!     Arc::new(PrometheusMetrics::new()?),
//! )
//! .with_eviction_ttl(config.eviction_ttl);
//!
//! let repository = proxy.repository(&RepositoryName::parse("library/alpine")?);
//! let descriptor = repository.tags().get("latest").await?;
//! let manifest = repository
//!     .manifests()
//!     .get(&descriptor.digest, &ManifestOptions::new().with_tag("latest"))
//!     .await?;
//! println!("{} bytes", manifest.size());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod challenger;
mod config;
mod evictor;
mod manifest_store;
mod remote;
mod repository;
mod scheduler;
mod tag_service;

pub use challenger::{AuthChallenge, RemoteAuthChallenger};
pub use config::{
    ConfigError, ProxyConfig, RemoteAuth, RemoteConfig, SchedulerConfig, TlsConfig,
    DEFAULT_EVICTION_TTL,
};
pub use evictor::LocalEvictor;
pub use manifest_store::ProxyManifestStore;
pub use remote::{RemoteManifestService, RemoteRegistry, RemoteTagService};
pub use repository::{ProxyRegistry, ProxyRepository};
pub use scheduler::{ExpiryHandler, ScheduledEntry, SchedulerError, TtlScheduler};
pub use tag_service::ProxyTagService;
