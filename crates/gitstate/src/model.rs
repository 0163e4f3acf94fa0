//! The engine's upstream interface: opening and closing working copies and
//! fanning their events out to consumers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::broadcast::{ProgressBroadcaster, RepositoryEvent, StateBroadcaster};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::progress::ProgressEvent;
use crate::repository::Repository;
use crate::sequencer::Sequencer;
use crate::watcher::BackgroundWatcher;

struct OpenRepository {
    repository: Arc<Repository>,
    watcher: BackgroundWatcher,
    refresh_task: tokio::task::JoinHandle<()>,
}

/// Tracks every open repository and routes their events to subscribers.
pub struct Model {
    config: EngineConfig,
    repositories: Mutex<HashMap<PathBuf, OpenRepository>>,
    /// Serializes open calls per path so concurrent discovery triggers
    /// cannot register the same repository twice.
    open_sequencer: Sequencer<PathBuf>,
    events: StateBroadcaster,
    progress: ProgressBroadcaster,
}

impl Model {
    /// Creates an empty model.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            repositories: Mutex::new(HashMap::new()),
            open_sequencer: Sequencer::new(),
            events: StateBroadcaster::default(),
            progress: ProgressBroadcaster::default(),
        }
    }

    /// Subscribes to repository lifecycle and state-change events.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.events.subscribe()
    }

    /// Subscribes to operation progress events across all repositories.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Opens the repository at `path`, performing its initial
    /// reconciliation and starting its filesystem watcher.
    ///
    /// Opening the same path again returns the already-open instance.
    pub async fn open_repository(&self, path: impl AsRef<Path>) -> Result<Arc<Repository>> {
        let path = normalize(path.as_ref());

        self.open_sequencer
            .enqueue(path.clone(), || async {
                if let Some(entry) = self
                    .repositories
                    .lock()
                    .expect("repositories lock poisoned")
                    .get(&path)
                {
                    return Ok(Arc::clone(&entry.repository));
                }

                let repository = Arc::new(
                    Repository::open(
                        &path,
                        self.config.clone(),
                        self.events.clone(),
                        self.progress.clone(),
                    )
                    .await?,
                );

                if let Err(e) = repository.refresh().await {
                    log::warn!("initial reconciliation failed for {}: {}", path.display(), e);
                }

                let mut watcher =
                    BackgroundWatcher::new(&path, Duration::from_millis(self.config.debounce_ms));
                let mut triggers = watcher.subscribe();
                if self.config.auto_refresh {
                    watcher.start();
                }

                let task_repository = Arc::clone(&repository);
                let refresh_task = tokio::spawn(async move {
                    while triggers.recv().await.is_ok() {
                        if task_repository.is_disposed() {
                            break;
                        }
                        if !task_repository.should_auto_refresh() {
                            continue;
                        }
                        if let Err(e) = task_repository.refresh().await {
                            tracing::warn!(
                                repository = %task_repository.root().display(),
                                error = %e,
                                "auto refresh failed"
                            );
                        }
                    }
                });

                self.repositories
                    .lock()
                    .expect("repositories lock poisoned")
                    .insert(
                        path.clone(),
                        OpenRepository {
                            repository: Arc::clone(&repository),
                            watcher,
                            refresh_task,
                        },
                    );

                self.events
                    .send(RepositoryEvent::Opened { path: path.clone() });
                Ok(repository)
            })
            .await
    }

    /// Closes the repository at `path`, disposing its state and stopping
    /// its watcher.
    pub async fn close_repository(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = normalize(path.as_ref());

        let entry = self
            .repositories
            .lock()
            .expect("repositories lock poisoned")
            .remove(&path)
            .ok_or_else(|| EngineError::NotOpen(path.clone()))?;

        entry.repository.dispose();
        entry.refresh_task.abort();
        let mut watcher = entry.watcher;
        watcher.stop();

        self.events.send(RepositoryEvent::Closed { path });
        Ok(())
    }

    /// Returns the open repository at `path`, if any.
    pub fn repository(&self, path: impl AsRef<Path>) -> Option<Arc<Repository>> {
        let path = normalize(path.as_ref());
        self.repositories
            .lock()
            .expect("repositories lock poisoned")
            .get(&path)
            .map(|entry| Arc::clone(&entry.repository))
    }

    /// Roots of all open repositories.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.repositories
            .lock()
            .expect("repositories lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        let mut repositories = self
            .repositories
            .lock()
            .expect("repositories lock poisoned");
        for (_, entry) in repositories.drain() {
            entry.repository.dispose();
            entry.refresh_task.abort();
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
