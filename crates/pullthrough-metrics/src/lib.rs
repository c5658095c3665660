//! # Pullthrough Metrics
//!
//! Prometheus counters for manifest traffic through the proxy.
//!
//! [`PrometheusMetrics`] keeps its own [`prometheus::Registry`] so several
//! instances (one per test, say) never collide on metric names. Expose
//! [`PrometheusMetrics::gather_text`] from whatever HTTP surface serves
//! `/metrics`.
//!
//! ```rust
//! use pullthrough_core::ProxyMetrics;
//! use pullthrough_metrics::PrometheusMetrics;
//!
//! let metrics = PrometheusMetrics::new()?;
//! metrics.manifest_served(512);
//! assert_eq!(metrics.snapshot().bytes_served, 512);
//! # Ok::<(), pullthrough_metrics::MetricsError>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::pedantic)]

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use pullthrough_core::ProxyMetrics;
use thiserror::Error;

/// Errors from metric registration or exposition.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registering or encoding a metric failed.
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Encoded output was not valid UTF-8.
    #[error("Metrics output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Point-in-time copy of the proxy counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Manifests served to callers.
    pub requests_served: u64,
    /// Manifest bytes served to callers.
    pub bytes_served: u64,
    /// Manifests fetched from the remote origin.
    pub requests_fetched: u64,
    /// Manifest bytes fetched from the remote origin.
    pub bytes_fetched: u64,
}

/// [`ProxyMetrics`] backed by Prometheus counters.
#[derive(Debug, Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    requests_served: IntCounter,
    bytes_served: IntCounter,
    requests_fetched: IntCounter,
    bytes_fetched: IntCounter,
}

impl PrometheusMetrics {
    /// Creates the counters on a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a counter cannot be registered.
    pub fn new() -> Result<Self, MetricsError> {
        Self::with_registry(Registry::new())
    }

    /// Creates the counters and registers them on `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if a counter cannot be created or is already
    /// registered on `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, MetricsError> {
        let counter = |name: &str, help: &str| -> Result<IntCounter, MetricsError> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            requests_served: counter(
                "pullthrough_manifest_requests_served_total",
                "Total number of manifests served to callers",
            )?,
            bytes_served: counter(
                "pullthrough_manifest_bytes_served_total",
                "Total manifest payload bytes served to callers",
            )?,
            requests_fetched: counter(
                "pullthrough_manifest_requests_fetched_total",
                "Total number of manifests fetched from the remote origin",
            )?,
            bytes_fetched: counter(
                "pullthrough_manifest_bytes_fetched_total",
                "Total manifest payload bytes fetched from the remote origin",
            )?,
            registry,
        })
    }

    /// Returns the registry the counters are registered on.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_served: self.requests_served.get(),
            bytes_served: self.bytes_served.get(),
            requests_fetched: self.requests_fetched.get(),
            bytes_fetched: self.bytes_fetched.get(),
        }
    }

    /// Encodes every registered metric in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn gather_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl ProxyMetrics for PrometheusMetrics {
    fn manifest_served(&self, bytes: u64) {
        self.requests_served.inc();
        self.bytes_served.inc_by(bytes);
    }

    fn manifest_fetched(&self, bytes: u64) {
        self.requests_fetched.inc();
        self.bytes_fetched.inc_by(bytes);
    }
}

/// [`ProxyMetrics`] that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl ProxyMetrics for NoopMetrics {
    fn manifest_served(&self, _bytes: u64) {}

    fn manifest_fetched(&self, _bytes: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.manifest_served(512);
        metrics.manifest_served(100);
        metrics.manifest_fetched(512);

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                requests_served: 2,
                bytes_served: 612,
                requests_fetched: 1,
                bytes_fetched: 512,
            }
        );
    }

    #[test]
    fn test_gather_text() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.manifest_fetched(7);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("pullthrough_manifest_bytes_fetched_total 7"));
        assert!(text.contains("pullthrough_manifest_requests_served_total 0"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        let _first = PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(matches!(
            PrometheusMetrics::with_registry(registry),
            Err(MetricsError::Prometheus(_))
        ));
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoopMetrics;
        metrics.manifest_served(1);
        metrics.manifest_fetched(1);
    }
}
