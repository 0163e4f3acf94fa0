//! Rebuilds the resource model from a fresh batch of read-only queries.
//!
//! The mapping here is pure: raw two-character status codes go in,
//! partitioned resources come out. Query execution lives on
//! [`crate::repository::Repository`]; assembling a snapshot from one
//! coherent batch keeps every snapshot internally consistent.

use crate::config::{BadgePolicy, EngineConfig, UntrackedMode};
use crate::git::parse::StatusList;
use crate::git::types::{Commit, Head, RawStatusEntry, Ref, Remote, StashEntry, Submodule};
use crate::resource::{
    RepositorySnapshot, Resource, ResourceGroupKind, ResourceGroups, StatusType,
};

/// One coherent batch of query results, gathered before assembly so the
/// snapshot is never patched field-by-field from partial results.
#[derive(Debug, Clone, Default)]
pub struct QueryBatch {
    pub head: Head,
    pub refs: Vec<Ref>,
    pub remotes: Vec<Remote>,
    pub submodules: Vec<Submodule>,
    pub stashes: Vec<StashEntry>,
    pub rebase_commit: Option<Commit>,
    pub status: StatusList,
}

/// Maps a two-character code pair to a merge-conflict status, if it is one
/// of the conflict pairs.
pub fn conflict_status(index: char, worktree: char) -> Option<StatusType> {
    match (index, worktree) {
        ('D', 'D') => Some(StatusType::BothDeleted),
        ('A', 'U') => Some(StatusType::AddedByUs),
        ('U', 'D') => Some(StatusType::DeletedByThem),
        ('U', 'A') => Some(StatusType::AddedByThem),
        ('D', 'U') => Some(StatusType::DeletedByUs),
        ('A', 'A') => Some(StatusType::BothAdded),
        ('U', 'U') => Some(StatusType::BothModified),
        _ => None,
    }
}

/// Maps an index-column code to a status type, `None` when the column is
/// unchanged.
pub fn index_status(code: char) -> Option<StatusType> {
    match code {
        'M' | 'T' => Some(StatusType::Modified),
        'A' => Some(StatusType::Added),
        'D' => Some(StatusType::Deleted),
        'R' => Some(StatusType::Renamed),
        'C' => Some(StatusType::Copied),
        _ => None,
    }
}

/// Maps a worktree-column code to a status type, `None` when the column is
/// unchanged.
pub fn worktree_status(code: char) -> Option<StatusType> {
    match code {
        'M' | 'T' => Some(StatusType::Modified),
        'D' => Some(StatusType::Deleted),
        'A' => Some(StatusType::IntentToAdd),
        'R' => Some(StatusType::Renamed),
        'C' => Some(StatusType::Copied),
        _ => None,
    }
}

fn resource(
    group: ResourceGroupKind,
    status: StatusType,
    entry: &RawStatusEntry,
) -> Resource {
    match &entry.rename_source {
        Some(source) => Resource {
            group,
            status,
            path: source.clone(),
            rename_target: Some(entry.path.clone()),
        },
        None => Resource {
            group,
            status,
            path: entry.path.clone(),
            rename_target: None,
        },
    }
}

/// Partitions raw status entries into the four resource groups.
///
/// Precedence: conflict pairs always win and land in the merge group;
/// `??`/`!!` are routed by the untracked mode; otherwise the index and
/// worktree columns are mapped independently, so a partially staged path
/// appears in both the index and working-tree groups.
pub fn build_resource_groups(
    entries: &[RawStatusEntry],
    untracked_mode: UntrackedMode,
) -> ResourceGroups {
    let mut groups = ResourceGroups::default();

    for entry in entries {
        if let Some(status) = conflict_status(entry.index_code, entry.worktree_code) {
            groups
                .merge
                .push(resource(ResourceGroupKind::Merge, status, entry));
            continue;
        }

        if (entry.index_code == '?' && entry.worktree_code == '?')
            || (entry.index_code == '!' && entry.worktree_code == '!')
        {
            let status = if entry.index_code == '?' {
                StatusType::Untracked
            } else {
                StatusType::Ignored
            };
            match untracked_mode {
                UntrackedMode::Mixed => groups
                    .working_tree
                    .push(resource(ResourceGroupKind::WorkingTree, status, entry)),
                UntrackedMode::Separate => groups
                    .untracked
                    .push(resource(ResourceGroupKind::Untracked, status, entry)),
                UntrackedMode::Hidden => {}
            }
            continue;
        }

        if let Some(status) = index_status(entry.index_code) {
            groups
                .index
                .push(resource(ResourceGroupKind::Index, status, entry));
        }
        if let Some(status) = worktree_status(entry.worktree_code) {
            groups
                .working_tree
                .push(resource(ResourceGroupKind::WorkingTree, status, entry));
        }
    }

    groups
}

/// Computes the badge count from the three primary groups.
pub fn badge_count(groups: &ResourceGroups, policy: BadgePolicy) -> usize {
    let primary = groups
        .merge
        .iter()
        .chain(groups.index.iter())
        .chain(groups.working_tree.iter());

    match policy {
        BadgePolicy::Off => 0,
        BadgePolicy::All => primary.count(),
        BadgePolicy::Tracked => primary
            .filter(|r| !matches!(r.status, StatusType::Untracked | StatusType::Ignored))
            .count(),
    }
}

/// Assembles a snapshot from one coherent query batch.
pub fn assemble_snapshot(batch: QueryBatch, config: &EngineConfig) -> RepositorySnapshot {
    let groups = build_resource_groups(&batch.status.entries, config.untracked_mode);
    let badge_count = badge_count(&groups, config.badge_policy);

    RepositorySnapshot {
        head: batch.head,
        refs: batch.refs,
        remotes: batch.remotes,
        submodules: batch.submodules,
        stashes: batch.stashes,
        rebase_commit: batch.rebase_commit,
        groups,
        hit_limit: batch.status.hit_limit,
        badge_count,
    }
}
