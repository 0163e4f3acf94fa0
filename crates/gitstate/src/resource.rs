//! The reconciled, consumer-facing view of changed paths, and the
//! repository snapshot aggregate.

use serde::{Deserialize, Serialize};

use crate::git::types::{Commit, Head, Ref, Remote, StashEntry, Submodule};

/// Partition of changed paths by origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceGroupKind {
    /// Paths with merge conflicts.
    Merge,
    /// Paths staged in the index.
    Index,
    /// Paths modified in the working tree.
    WorkingTree,
    /// Untracked paths, when configured as a separate group.
    Untracked,
}

/// Classified status of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusType {
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    Untracked,
    Ignored,
    IntentToAdd,
    // Merge conflict variants.
    BothDeleted,
    AddedByUs,
    DeletedByThem,
    AddedByThem,
    DeletedByUs,
    BothAdded,
    BothModified,
}

impl StatusType {
    /// True for the merge-conflict variants.
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            StatusType::BothDeleted
                | StatusType::AddedByUs
                | StatusType::DeletedByThem
                | StatusType::AddedByThem
                | StatusType::DeletedByUs
                | StatusType::BothAdded
                | StatusType::BothModified
        )
    }
}

/// One reconciled changed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// The group this resource belongs to.
    pub group: ResourceGroupKind,
    /// Classified status.
    pub status: StatusType,
    /// Affected path. For renames this is the original path.
    pub path: String,
    /// Rename target, present for renames and copies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_target: Option<String>,
}

/// The four resource groups of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroups {
    /// Merge conflicts.
    pub merge: Vec<Resource>,
    /// Staged changes.
    pub index: Vec<Resource>,
    /// Working-tree changes.
    pub working_tree: Vec<Resource>,
    /// Untracked files, populated only in the separate untracked mode.
    pub untracked: Vec<Resource>,
}

impl ResourceGroups {
    /// Total resources across all four groups.
    pub fn len(&self) -> usize {
        self.merge.len() + self.index.len() + self.working_tree.len() + self.untracked.len()
    }

    /// True when every group is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate state of one repository.
///
/// Always rebuilt atomically from a single batch of queries, never patched
/// field-by-field, and replaced wholesale on every reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySnapshot {
    /// The checked-out reference.
    pub head: Head,
    /// All known refs, replaced wholesale each reconciliation.
    pub refs: Vec<Ref>,
    /// Configured remotes.
    pub remotes: Vec<Remote>,
    /// Declared submodules.
    pub submodules: Vec<Submodule>,
    /// Stash entries.
    pub stashes: Vec<StashEntry>,
    /// The commit an interrupted rebase stopped at, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebase_commit: Option<Commit>,
    /// The four resource groups.
    pub groups: ResourceGroups,
    /// True when the status enumeration hit the configured result cap;
    /// the snapshot then holds exactly the capped entry count.
    pub hit_limit: bool,
    /// Scalar badge count under the configured counting policy.
    pub badge_count: usize,
}
