//! Progress tracking for long-running git operations.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::git::CancelFlag;
use crate::operation::OperationKind;

// Pre-compiled regexes for parsing git progress output
static RE_PERCENTAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)%").unwrap());
static RE_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)/(\d+)\)").unwrap());

/// Phase of a git operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// Operation is starting.
    Starting,
    /// Counting objects (push/pull).
    Counting,
    /// Compressing objects (push).
    Compressing,
    /// Writing objects (push).
    Writing,
    /// Receiving objects (pull/fetch).
    Receiving,
    /// Resolving deltas (pull/fetch).
    Resolving,
    /// Operation completed successfully.
    Completed,
    /// Operation failed.
    Failed,
}

/// A progress event for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Unique identifier for this operation.
    pub operation_id: String,
    /// The operation being performed.
    pub operation: OperationKind,
    /// Current phase.
    pub phase: ProgressPhase,
    /// Human-readable status message.
    pub message: String,
    /// Progress percentage (0-100), if determinable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    /// Current number of objects processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    /// Total number of objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Raw git output line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    /// Error message if the operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Creates a new progress event.
    pub fn new(
        operation_id: &str,
        operation: OperationKind,
        phase: ProgressPhase,
        message: &str,
    ) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            operation,
            phase,
            message: message.to_string(),
            percentage: None,
            current: None,
            total: None,
            raw_output: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a completion event.
    pub fn completed(operation_id: &str, operation: OperationKind, message: &str) -> Self {
        Self::new(operation_id, operation, ProgressPhase::Completed, message)
    }

    /// Creates a failure event.
    pub fn failed(operation_id: &str, operation: OperationKind, error: &str) -> Self {
        let mut event = Self::new(operation_id, operation, ProgressPhase::Failed, "Operation failed");
        event.error = Some(error.to_string());
        event
    }
}

/// Parsed progress information from one line of git stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedProgress {
    pub phase: Option<ProgressPhase>,
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub percentage: Option<u8>,
}

/// Parses git `--progress` stderr output.
///
/// Patterns look like:
/// - `Counting objects: 100% (10/10), done.`
/// - `Receiving objects:  75% (75/100), 1.00 MiB | 512.00 KiB/s`
pub fn parse_progress_line(line: &str) -> ParsedProgress {
    let mut result = ParsedProgress::default();

    let line_lower = line.to_lowercase();
    if line_lower.contains("counting") || line_lower.contains("enumerating") {
        result.phase = Some(ProgressPhase::Counting);
    } else if line_lower.contains("compressing") {
        result.phase = Some(ProgressPhase::Compressing);
    } else if line_lower.contains("writing") {
        result.phase = Some(ProgressPhase::Writing);
    } else if line_lower.contains("receiving") {
        result.phase = Some(ProgressPhase::Receiving);
    } else if line_lower.contains("resolving") {
        result.phase = Some(ProgressPhase::Resolving);
    }

    if let Some(pct) = RE_PERCENTAGE.captures(line).and_then(|c| c.get(1)) {
        result.percentage = pct.as_str().parse().ok();
    }

    if let Some(count) = RE_COUNT.captures(line) {
        if let (Some(current), Some(total)) = (count.get(1), count.get(2)) {
            result.current = current.as_str().parse().ok();
            result.total = total.as_str().parse().ok();
        }
    }

    result
}

/// Tracks progress for a single operation, with cancellation support.
pub struct OperationProgress {
    operation_id: String,
    operation: OperationKind,
    sender: Arc<broadcast::Sender<ProgressEvent>>,
    cancel: CancelFlag,
}

impl OperationProgress {
    /// Creates a new operation progress tracker.
    pub fn new(operation: OperationKind, sender: Arc<broadcast::Sender<ProgressEvent>>) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            operation,
            sender,
            cancel: CancelFlag::new(),
        }
    }

    /// Gets the operation ID.
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// The operation this tracker reports on.
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Broadcasts a phase update.
    pub fn phase(&self, phase: ProgressPhase, message: &str) {
        let event = ProgressEvent::new(&self.operation_id, self.operation, phase, message);
        let _ = self.sender.send(event);
    }

    /// Parses one raw stderr line and broadcasts it when it carries
    /// progress information.
    pub fn raw_output(&self, line: &str) {
        let parsed = parse_progress_line(line);
        let Some(phase) = parsed.phase else {
            return;
        };

        let mut event = ProgressEvent::new(&self.operation_id, self.operation, phase, line);
        event.percentage = parsed.percentage;
        event.current = parsed.current;
        event.total = parsed.total;
        event.raw_output = Some(line.to_string());
        let _ = self.sender.send(event);
    }

    /// Broadcasts completion.
    pub fn completed(&self, message: &str) {
        let event = ProgressEvent::completed(&self.operation_id, self.operation, message);
        let _ = self.sender.send(event);
    }

    /// Broadcasts failure.
    pub fn failed(&self, error: &str) {
        let event = ProgressEvent::failed(&self.operation_id, self.operation, error);
        let _ = self.sender.send(event);
    }

    /// Requests cancellation of the underlying process.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.failed("Operation cancelled");
    }

    /// Returns true if the operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the shared cancellation flag for the process runner.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counting_objects() {
        let parsed = parse_progress_line("Counting objects: 100% (10/10), done.");
        assert_eq!(parsed.phase, Some(ProgressPhase::Counting));
        assert_eq!(parsed.percentage, Some(100));
        assert_eq!(parsed.current, Some(10));
        assert_eq!(parsed.total, Some(10));
    }

    #[test]
    fn test_parse_receiving_objects() {
        let parsed = parse_progress_line("Receiving objects:  75% (75/100), 1.00 MiB | 512.00 KiB/s");
        assert_eq!(parsed.phase, Some(ProgressPhase::Receiving));
        assert_eq!(parsed.percentage, Some(75));
        assert_eq!(parsed.current, Some(75));
    }

    #[test]
    fn test_parse_non_progress_line() {
        let parsed = parse_progress_line("From https://example.com/repo");
        assert_eq!(parsed.phase, None);
    }

    #[test]
    fn test_progress_events_broadcast() {
        let (tx, mut rx) = broadcast::channel(16);
        let progress = OperationProgress::new(OperationKind::Pull, Arc::new(tx));

        progress.phase(ProgressPhase::Starting, "Starting pull");
        progress.raw_output("Resolving deltas: 100% (5/5), done.");
        progress.completed("Pull completed");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.phase, ProgressPhase::Starting);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.phase, ProgressPhase::Resolving);
        assert_eq!(second.percentage, Some(100));
        let third = rx.try_recv().unwrap();
        assert_eq!(third.phase, ProgressPhase::Completed);
    }

    #[test]
    fn test_cancel_marks_flag_and_broadcasts() {
        let (tx, mut rx) = broadcast::channel(16);
        let progress = OperationProgress::new(OperationKind::Fetch, Arc::new(tx));
        let flag = progress.cancel_flag();

        assert!(!progress.is_cancelled());
        progress.cancel();
        assert!(progress.is_cancelled());
        assert!(flag.is_cancelled());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.phase, ProgressPhase::Failed);
    }
}
