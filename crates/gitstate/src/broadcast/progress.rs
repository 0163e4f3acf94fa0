//! Progress broadcaster for streaming operation progress.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::operation::OperationKind;
use crate::progress::{OperationProgress, ProgressEvent};

/// Broadcasts operation progress events for streaming.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    sender: Arc<broadcast::Sender<ProgressEvent>>,
}

impl ProgressBroadcaster {
    /// Creates a new progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: ProgressEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a progress tracker for one operation.
    pub fn start_operation(&self, operation: OperationKind) -> OperationProgress {
        OperationProgress::new(operation, Arc::clone(&self.sender))
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
