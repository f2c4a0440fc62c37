//! Rules file watcher for hot-reload support.
//!
//! Polls the modification time of the IP allow rules file and rebuilds the
//! published table when it changes. Each reload attempt is reported as a
//! [`ReloadEvent`].

use crate::ip_allow::{ConfigSource, IpAllowError, IpAllowHandler, IpAllowResult, ReloadOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Polling interval for file changes.
    pub poll_interval: Duration,
    /// Wait after a change is seen before reloading, so writers can finish.
    pub debounce: Duration,
    /// Whether hot-reload is enabled.
    pub enabled: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            debounce: Duration::from_millis(500),
            enabled: false,
        }
    }
}

impl WatcherConfig {
    /// Create a new watcher config with hot-reload enabled.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the debounce duration.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Event emitted after a watcher-triggered reload.
#[derive(Debug, Clone)]
pub enum ReloadEvent {
    /// A new table was published.
    Reloaded(ReloadOutcome),
    /// The reload failed; the previous table is still published.
    Failed(String),
}

/// Watches the rules file and reloads the table on change.
pub struct RulesWatcher {
    /// Handler whose table is reloaded.
    handler: IpAllowHandler,
    /// Rules file, if the controller reads from one.
    rules_path: Option<PathBuf>,
    /// Watcher configuration.
    watcher_config: WatcherConfig,
    /// Last modification time.
    last_modified: Arc<RwLock<Option<SystemTime>>>,
    /// Shutdown signal.
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl std::fmt::Debug for RulesWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesWatcher")
            .field("rules_path", &self.rules_path)
            .field("watcher_config", &self.watcher_config)
            .field("running", &self.shutdown_tx.is_some())
            .finish_non_exhaustive()
    }
}

impl RulesWatcher {
    /// Create a watcher for the rules file behind `handler`.
    #[must_use]
    pub fn new(handler: IpAllowHandler, watcher_config: WatcherConfig) -> Self {
        let rules_path = match handler.controller().source() {
            ConfigSource::File(path) => Some(path.clone()),
            ConfigSource::Text { .. } => None,
        };
        let last_modified = rules_path.as_deref().and_then(Self::get_modified_time);

        Self {
            handler,
            rules_path,
            watcher_config,
            last_modified: Arc::new(RwLock::new(last_modified)),
            shutdown_tx: None,
        }
    }

    /// Start watching for rules file changes.
    ///
    /// Returns a receiver for reload events. Must be called from within a
    /// Tokio runtime.
    pub fn start(&mut self) -> mpsc::Receiver<ReloadEvent> {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        self.shutdown_tx = Some(shutdown_tx);

        if !self.watcher_config.enabled {
            return event_rx;
        }
        let Some(rules_path) = self.rules_path.clone() else {
            warn!("rules are not file backed, hot reload disabled");
            return event_rx;
        };

        let handler = self.handler.clone();
        let poll_interval = self.watcher_config.poll_interval.max(Duration::from_millis(1));
        let debounce = self.watcher_config.debounce;
        let last_modified = Arc::clone(&self.last_modified);

        info!(
            path = %rules_path.display(),
            poll_interval_ms = poll_interval.as_millis(),
            "watching rules file"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(new_mtime) = Self::get_modified_time(&rules_path) else {
                            continue;
                        };
                        if *last_modified.read().await == Some(new_mtime) {
                            continue;
                        }

                        debug!(path = %rules_path.display(), "rules file changed");
                        tokio::time::sleep(debounce).await;
                        // Record the time seen after settling so one edit
                        // triggers one reload.
                        let settled = Self::get_modified_time(&rules_path).unwrap_or(new_mtime);
                        *last_modified.write().await = Some(settled);

                        let event = match handler.spawn_reload().await {
                            Ok(Ok(outcome)) => ReloadEvent::Reloaded(outcome),
                            Ok(Err(e)) => ReloadEvent::Failed(e.to_string()),
                            Err(e) => ReloadEvent::Failed(format!("reload task failed: {e}")),
                        };
                        if event_tx.send(event).await.is_err() {
                            debug!("reload event receiver dropped");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!(path = %rules_path.display(), "rules watcher stopped");
                        break;
                    }
                }
            }
        });

        event_rx
    }

    /// Stop watching for rules file changes.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Force a reload of the rules.
    ///
    /// # Errors
    ///
    /// Returns the reload error; the previous table stays published.
    pub async fn reload(&self) -> IpAllowResult<ReloadOutcome> {
        let mtime = self.rules_path.as_deref().and_then(Self::get_modified_time);
        let outcome = self
            .handler
            .spawn_reload()
            .await
            .map_err(|e| IpAllowError::ReloadTask(e.to_string()))??;
        if mtime.is_some() {
            *self.last_modified.write().await = mtime;
        }
        Ok(outcome)
    }

    /// Rules file being watched.
    #[must_use]
    pub fn rules_path(&self) -> Option<&Path> {
        self.rules_path.as_deref()
    }

    fn get_modified_time(path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
    }
}
