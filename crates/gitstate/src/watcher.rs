//! Filesystem watcher that turns change notifications into refresh
//! triggers.
//!
//! Events are debounced by `notify-debouncer-mini`, lock-file churn is
//! filtered out, and trigger frequency is capped so heavy filesystem
//! activity cannot saturate the external process. Whether a trigger may
//! actually refresh is decided by the repository
//! ([`crate::repository::Repository::should_auto_refresh`]).

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use tokio::sync::broadcast;

use crate::error::{EngineError, Result};
use crate::sequencer::Throttle;

/// True when a changed path should trigger a refresh.
///
/// Lock files are write-ahead noise from the executable itself; reacting
/// to them would refresh mid-operation and immediately hit contention.
pub fn is_relevant_path(path: &Path) -> bool {
    let is_lock = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".lock"));
    if is_lock {
        return false;
    }

    // Object database churn carries no model-visible information that the
    // ref/status queries would not pick up from HEAD/refs/index changes.
    let mut components = path.components();
    let in_objects = components.any(|c| c == Component::Normal(".git".as_ref()))
        && components.next() == Some(Component::Normal("objects".as_ref()));
    !in_objects
}

/// Watches one working copy and broadcasts refresh triggers.
pub struct WorkingCopyWatcher {
    /// Root directory of the working copy.
    root: PathBuf,
    /// Channel for refresh triggers.
    sender: broadcast::Sender<()>,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Debounce window for filesystem events.
    debounce: Duration,
}

impl WorkingCopyWatcher {
    /// Creates a new watcher for the given working copy root.
    pub fn new(root: impl Into<PathBuf>, debounce: Duration) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            root: root.into(),
            sender,
            shutdown: Arc::new(AtomicBool::new(false)),
            debounce,
        }
    }

    /// Returns a receiver for refresh triggers.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Returns the watched root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts watching; blocks until the shutdown flag is set.
    pub fn watch(&self) -> Result<()> {
        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer: Debouncer<RecommendedWatcher> = new_debouncer(self.debounce, tx)
            .map_err(|e| EngineError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| EngineError::Watch(e.to_string()))?;

        log::info!("watching working copy: {}", self.root.display());

        // The debouncer already coalesces bursts; the throttle additionally
        // caps trigger frequency across consecutive batches.
        let throttle = Throttle::new(self.debounce);

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            // Use timeout to allow checking the shutdown flag
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(events)) => {
                    if self.has_relevant_event(&events) && throttle.allow() {
                        let _ = self.sender.send(());
                    }
                }
                Ok(Err(e)) => {
                    log::error!("watch error: {}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        log::info!("stopped watching working copy: {}", self.root.display());
        Ok(())
    }

    fn has_relevant_event(&self, events: &[DebouncedEvent]) -> bool {
        events.iter().any(|event| is_relevant_path(&event.path))
    }

    /// Signals the watcher to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Returns whether the watcher has been signaled to stop.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Runs a [`WorkingCopyWatcher`] on a background thread.
pub struct BackgroundWatcher {
    watcher: Arc<WorkingCopyWatcher>,
    handle: Option<std::thread::JoinHandle<Result<()>>>,
}

impl BackgroundWatcher {
    /// Creates a new background watcher.
    pub fn new(root: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            watcher: Arc::new(WorkingCopyWatcher::new(root, debounce)),
            handle: None,
        }
    }

    /// Starts watching in a background thread.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let watcher = Arc::clone(&self.watcher);
        self.handle = Some(std::thread::spawn(move || watcher.watch()));
    }

    /// Returns a receiver for refresh triggers.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.watcher.subscribe()
    }

    /// Stops the watcher and joins the thread.
    pub fn stop(&mut self) {
        self.watcher.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
