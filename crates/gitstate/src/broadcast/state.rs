//! Repository lifecycle and state-change event fan-out.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::resource::RepositorySnapshot;

/// Lifecycle and state events for open repositories.
///
/// `StatusChanged` carries the whole snapshot by value; consumers never
/// read shared mutable engine state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum RepositoryEvent {
    /// A repository was opened.
    Opened { path: PathBuf },
    /// A repository was closed and its state discarded.
    Closed { path: PathBuf },
    /// A reconciliation replaced the repository snapshot.
    StatusChanged {
        path: PathBuf,
        snapshot: RepositorySnapshot,
    },
}

impl RepositoryEvent {
    /// The repository the event concerns.
    pub fn path(&self) -> &PathBuf {
        match self {
            RepositoryEvent::Opened { path }
            | RepositoryEvent::Closed { path }
            | RepositoryEvent::StatusChanged { path, .. } => path,
        }
    }
}

/// Broadcasts repository events to all subscribers.
///
/// Dropping a receiver is the sole means of unsubscribing.
#[derive(Clone)]
pub struct StateBroadcaster {
    sender: Arc<broadcast::Sender<RepositoryEvent>>,
}

impl StateBroadcaster {
    /// Creates a broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: RepositoryEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.sender.subscribe()
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
