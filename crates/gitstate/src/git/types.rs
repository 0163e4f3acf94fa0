//! Pure data types describing git repository state.

use serde::{Deserialize, Serialize};

/// The kind of a named ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// A branch under `refs/heads/`.
    Head,
    /// A branch under `refs/remotes/<remote>/`.
    RemoteHead,
    /// A tag under `refs/tags/`.
    Tag,
}

/// A named pointer into the commit graph.
///
/// The ref set is replaced wholesale on every reconciliation; consumers
/// must diff by value, not by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ref {
    /// Ref kind.
    pub kind: RefKind,
    /// Short name, e.g. `main` or `origin/main`.
    pub name: String,
    /// Target commit id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Owning remote name, set only for remote branches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

/// The remote branch a local branch tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRef {
    /// Remote name, e.g. `origin`.
    pub remote: String,
    /// Branch name on the remote, e.g. `main`.
    pub name: String,
}

impl UpstreamRef {
    /// Display name in `remote/branch` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.remote, self.name)
    }
}

/// The currently checked-out reference.
///
/// Mutated wholesale on every reconciliation, never field-by-field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Head {
    /// Symbolic name; `None` when HEAD is detached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Commit id; `None` on a fresh repository without commits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Tracked upstream, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamRef>,
    /// Commits ahead of the upstream; computed only when an upstream exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ahead: Option<u32>,
    /// Commits behind the upstream; computed only when an upstream exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behind: Option<u32>,
}

/// A configured remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remote {
    /// Remote name.
    pub name: String,
    /// URL used for fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_url: Option<String>,
    /// URL used for pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_url: Option<String>,
}

impl Remote {
    /// A remote without a push URL cannot be pushed to.
    pub fn is_read_only(&self) -> bool {
        self.push_url.is_none()
    }
}

/// A submodule declared in the `.gitmodules` file at the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submodule {
    /// Section name.
    pub name: String,
    /// Path relative to the repository root.
    pub path: String,
    /// Clone URL.
    pub url: String,
}

/// Commit metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// Full object hash.
    pub hash: String,
    /// Author email.
    pub author_email: String,
    /// Parent hashes, in order.
    pub parents: Vec<String>,
    /// Full commit message.
    pub message: String,
}

/// An entry in the stash list.
///
/// The index is positional, not a stable id — entries shift when one is
/// popped or dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashEntry {
    /// Position in the stash list.
    pub index: usize,
    /// Free-text description.
    pub description: String,
}

/// A raw entry from the NUL-delimited status stream.
///
/// The atomic unit produced by the status parser, before reconciliation
/// into resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatusEntry {
    /// Index-column status code.
    pub index_code: char,
    /// Worktree-column status code.
    pub worktree_code: char,
    /// Affected path.
    pub path: String,
    /// Original path, present for renames and copies.
    pub rename_source: Option<String>,
}

/// A row from a tree or index listing (`ls-tree` / `ls-files --stage`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    /// File mode, e.g. `100644`.
    pub mode: String,
    /// Object id.
    pub object: String,
    /// Object size for tree listings, stage number for index listings.
    pub size_or_stage: String,
    /// Path.
    pub path: String,
}
