//! Operation kinds and the in-flight operation multiset.
//!
//! Each kind carries its classification as static metadata so call sites
//! are checked exhaustively instead of consulting scattered string tables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The closed set of logical operations the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Status,
    Diff,
    Blame,
    Log,
    Show,
    LsTree,
    MergeBase,
    ConfigRead,
    GetObjectDetails,
    Fetch,
    Pull,
    Push,
    Sync,
    Commit,
    Stage,
    Unstage,
    Clean,
    Checkout,
    Branch,
    DeleteBranch,
    Merge,
    Reset,
    Tag,
    Stash,
    Apply,
    Init,
    Clone,
}

impl OperationKind {
    /// Read-only operations never trigger a reconciliation on completion.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            OperationKind::Status
                | OperationKind::Diff
                | OperationKind::Blame
                | OperationKind::Log
                | OperationKind::Show
                | OperationKind::LsTree
                | OperationKind::MergeBase
                | OperationKind::ConfigRead
                | OperationKind::GetObjectDetails
        )
    }

    /// Whether progress UI should be surfaced while this kind is running.
    /// Fetch and object lookups run silently but are still counted.
    pub fn shows_progress(self) -> bool {
        !matches!(
            self,
            OperationKind::Fetch | OperationKind::Show | OperationKind::GetObjectDetails
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Status => "status",
            OperationKind::Diff => "diff",
            OperationKind::Blame => "blame",
            OperationKind::Log => "log",
            OperationKind::Show => "show",
            OperationKind::LsTree => "ls-tree",
            OperationKind::MergeBase => "merge-base",
            OperationKind::ConfigRead => "config",
            OperationKind::GetObjectDetails => "object-details",
            OperationKind::Fetch => "fetch",
            OperationKind::Pull => "pull",
            OperationKind::Push => "push",
            OperationKind::Sync => "sync",
            OperationKind::Commit => "commit",
            OperationKind::Stage => "stage",
            OperationKind::Unstage => "unstage",
            OperationKind::Clean => "clean",
            OperationKind::Checkout => "checkout",
            OperationKind::Branch => "branch",
            OperationKind::DeleteBranch => "delete-branch",
            OperationKind::Merge => "merge",
            OperationKind::Reset => "reset",
            OperationKind::Tag => "tag",
            OperationKind::Stash => "stash",
            OperationKind::Apply => "apply",
            OperationKind::Init => "init",
            OperationKind::Clone => "clone",
        };
        write!(f, "{}", name)
    }
}

/// Multiset of operations currently in flight for one repository.
#[derive(Debug, Default)]
pub struct RunningOperations {
    counts: HashMap<OperationKind, u32>,
}

impl RunningOperations {
    /// Records the start of an operation.
    pub fn start(&mut self, kind: OperationKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    /// Records the end of an operation.
    pub fn finish(&mut self, kind: OperationKind) {
        if let Some(count) = self.counts.get_mut(&kind) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&kind);
            }
        }
    }

    /// True while at least one operation of this kind is in flight.
    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.counts.get(&kind).copied().unwrap_or(0) > 0
    }

    /// The engine is idle (for auto-refresh purposes) iff no mutating
    /// operation is in flight.
    pub fn is_idle(&self) -> bool {
        self.counts.keys().all(|kind| kind.is_read_only())
    }

    /// True while any in-flight operation should surface progress.
    pub fn shows_progress(&self) -> bool {
        self.counts.keys().any(|kind| kind.shows_progress())
    }

    /// Total number of in-flight operations.
    pub fn len(&self) -> usize {
        self.counts.values().map(|c| *c as usize).sum()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_classification() {
        assert!(OperationKind::Status.is_read_only());
        assert!(OperationKind::Log.is_read_only());
        assert!(OperationKind::GetObjectDetails.is_read_only());
        assert!(!OperationKind::Commit.is_read_only());
        assert!(!OperationKind::Fetch.is_read_only());
        assert!(!OperationKind::Stash.is_read_only());
    }

    #[test]
    fn test_progress_classification() {
        assert!(!OperationKind::Fetch.shows_progress());
        assert!(!OperationKind::Show.shows_progress());
        assert!(!OperationKind::GetObjectDetails.shows_progress());
        assert!(OperationKind::Pull.shows_progress());
        assert!(OperationKind::Commit.shows_progress());
    }

    #[test]
    fn test_multiset_counting() {
        let mut ops = RunningOperations::default();
        assert!(ops.is_empty());

        ops.start(OperationKind::Fetch);
        ops.start(OperationKind::Fetch);
        ops.start(OperationKind::Status);
        assert_eq!(ops.len(), 3);
        assert!(ops.is_running(OperationKind::Fetch));

        ops.finish(OperationKind::Fetch);
        assert!(ops.is_running(OperationKind::Fetch));
        ops.finish(OperationKind::Fetch);
        assert!(!ops.is_running(OperationKind::Fetch));
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn test_idle_ignores_read_only() {
        let mut ops = RunningOperations::default();
        ops.start(OperationKind::Status);
        ops.start(OperationKind::Log);
        assert!(ops.is_idle());

        ops.start(OperationKind::Pull);
        assert!(!ops.is_idle());
        ops.finish(OperationKind::Pull);
        assert!(ops.is_idle());
    }

    #[test]
    fn test_progress_excluded_kinds_still_counted() {
        let mut ops = RunningOperations::default();
        ops.start(OperationKind::Fetch);
        assert_eq!(ops.len(), 1);
        assert!(!ops.shows_progress());

        ops.start(OperationKind::Push);
        assert!(ops.shows_progress());
    }

    #[test]
    fn test_operation_kind_display() {
        assert_eq!(OperationKind::Fetch.to_string(), "fetch");
        assert_eq!(OperationKind::DeleteBranch.to_string(), "delete-branch");
    }
}
