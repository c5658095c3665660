//! TTL-based eviction scheduler.
//!
//! [`TtlScheduler`] owns a single background task. Registrations arrive
//! over an unbounded channel so [`EvictionScheduler::add_manifest`] never
//! waits on the worker. When an entry's deadline passes, the worker hands
//! the reference to an [`ExpiryHandler`] on a separate task.
//!
//! Pending entries can be persisted to a JSON state file. The file is read
//! once on start, written every `save_interval` while entries change, and
//! written again on [`TtlScheduler::stop`]. Entries that expired while the
//! process was down fire as soon as the worker starts.

use crate::config::SchedulerConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pullthrough_core::{EvictionScheduler, Reference, Result as RegistryResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Receives references whose TTL has elapsed.
#[async_trait]
pub trait ExpiryHandler: Send + Sync {
    /// Removes the cached manifest addressed by `reference`.
    async fn on_manifest_expire(&self, reference: &Reference) -> RegistryResult<()>;
}

/// Errors from the eviction scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler was started outside a tokio runtime.
    #[error("Eviction scheduler requires a tokio runtime")]
    NoRuntime,

    /// The state file could not be read or written.
    #[error("Failed to access scheduler state at {path}: {source}")]
    State {
        /// State file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The state file does not contain valid scheduler state.
    #[error("Corrupt scheduler state at {path}: {source}")]
    Corrupt {
        /// State file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The scheduler configuration is unusable.
    #[error("Invalid scheduler configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The worker has already shut down.
    #[error("Eviction scheduler has stopped")]
    Stopped,
}

/// A pending eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    /// Reference to evict.
    #[serde(with = "reference_string")]
    pub reference: Reference,

    /// When the reference expires.
    pub expires_at: DateTime<Utc>,
}

impl ScheduledEntry {
    /// Creates an entry expiring `ttl` from now.
    #[must_use]
    pub fn new(reference: Reference, ttl: Duration) -> Self {
        Self {
            reference,
            expires_at: deadline_after(ttl),
        }
    }

    fn key(&self) -> String {
        self.reference.to_string()
    }
}

fn deadline_after(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

mod reference_string {
    use pullthrough_core::Reference;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        reference: &Reference,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(reference)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Reference, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Reference::parse(&raw).map_err(serde::de::Error::custom)
    }
}

enum Command {
    Add(ScheduledEntry),
    Entries(oneshot::Sender<Vec<ScheduledEntry>>),
    Stop(oneshot::Sender<()>),
}

/// Eviction scheduler running on a background tokio task.
#[derive(Debug, Clone)]
pub struct TtlScheduler {
    commands: mpsc::UnboundedSender<Command>,
}

impl TtlScheduler {
    /// Loads any persisted state and spawns the worker on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if no tokio runtime is running, the save interval is
    /// zero, or the state file exists but cannot be read or parsed.
    pub fn start(
        config: SchedulerConfig,
        handler: Arc<dyn ExpiryHandler>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let entries = match &config.state_file {
            Some(path) => load_state(path)?,
            None => Vec::new(),
        };
        debug!(restored = entries.len(), "Starting eviction scheduler");

        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = Worker {
            entries: entries.into_iter().map(|e| (e.key(), e)).collect(),
            handler,
            state_file: config.state_file,
            dirty: false,
        };
        runtime.spawn(worker.run(receiver, config.save_interval));

        Ok(Self { commands })
    }

    /// Returns the pending entries ordered by deadline.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Stopped`] if the worker has shut down.
    pub async fn entries(&self) -> Result<Vec<ScheduledEntry>, SchedulerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Entries(reply))
            .map_err(|_| SchedulerError::Stopped)?;
        response.await.map_err(|_| SchedulerError::Stopped)
    }

    /// Persists pending entries and shuts the worker down.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Stopped`] if the worker had already shut down.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stop(reply))
            .map_err(|_| SchedulerError::Stopped)?;
        response.await.map_err(|_| SchedulerError::Stopped)
    }
}

impl EvictionScheduler for TtlScheduler {
    fn add_manifest(&self, reference: &Reference, ttl: Duration) {
        let entry = ScheduledEntry::new(reference.clone(), ttl);
        if self.commands.send(Command::Add(entry)).is_err() {
            warn!(reference = %reference, "Eviction scheduler stopped, dropping registration");
        }
    }
}

struct Worker {
    entries: HashMap<String, ScheduledEntry>,
    handler: Arc<dyn ExpiryHandler>,
    state_file: Option<PathBuf>,
    dirty: bool,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        save_interval: Duration,
    ) {
        let mut save_tick = tokio::time::interval(save_interval);
        save_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let next_deadline = self.entries.values().map(|e| e.expires_at).min();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Add(entry)) => {
                        debug!(
                            reference = %entry.reference,
                            expires_at = %entry.expires_at,
                            "Scheduled eviction"
                        );
                        // Re-registration replaces the previous deadline.
                        self.entries.insert(entry.key(), entry);
                        self.dirty = true;
                    }
                    Some(Command::Entries(reply)) => {
                        let _ = reply.send(self.sorted_entries());
                    }
                    Some(Command::Stop(reply)) => {
                        self.save().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.save().await;
                        return;
                    }
                },
                () = wait_until(next_deadline) => self.fire_expired(),
                _ = save_tick.tick() => {
                    if self.dirty {
                        self.save().await;
                    }
                }
            }
        }
    }

    fn sorted_entries(&self) -> Vec<ScheduledEntry> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.key().cmp(&b.key())));
        entries
    }

    fn fire_expired(&mut self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            let Some(entry) = self.entries.remove(&key) else {
                continue;
            };
            self.dirty = true;

            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                debug!(reference = %entry.reference, "Evicting expired manifest");
                if let Err(e) = handler.on_manifest_expire(&entry.reference).await {
                    warn!(
                        reference = %entry.reference,
                        error = %e,
                        "Failed to evict expired manifest"
                    );
                }
            });
        }
    }

    async fn save(&mut self) {
        let Some(path) = self.state_file.clone() else {
            self.dirty = false;
            return;
        };

        match save_state(&path, &self.sorted_entries()).await {
            Ok(()) => self.dirty = false,
            Err(e) => warn!(error = %e, "Failed to save scheduler state"),
        }
    }
}

async fn wait_until(deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(deadline) => {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(remaining).await;
        }
        None => std::future::pending().await,
    }
}

fn load_state(path: &Path) -> Result<Vec<ScheduledEntry>, SchedulerError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(SchedulerError::State {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    serde_json::from_slice(&data).map_err(|e| SchedulerError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })
}

async fn save_state(path: &Path, entries: &[ScheduledEntry]) -> Result<(), SchedulerError> {
    let state_error = |source| SchedulerError::State {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(entries).map_err(|e| SchedulerError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(state_error)?;
    }

    let temp = path.with_extension("tmp");
    tokio::fs::write(&temp, json).await.map_err(state_error)?;
    tokio::fs::rename(&temp, path).await.map_err(state_error)
}
